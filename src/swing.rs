use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::{
    pipeline::{
        GraphicOverlay, PoseGraphic,
        processor::{ProcessError, ResultHandler},
    },
    pose::{LandmarkType, Pose},
    types::Frame,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwingPhase {
    #[default]
    NotEngaged,
    Ready,
    BackSwing,
    DownSwing,
    FollowThrough,
}

#[derive(Clone, Debug, Default)]
pub struct SwingPhaseData {
    pub started: Option<Instant>,
    pub ended: Option<Instant>,
    poses: Vec<Pose>,
}

impl SwingPhaseData {
    pub fn add_pose(&mut self, pose: Pose) {
        self.poses.push(pose);
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.ended?.saturating_duration_since(self.started?))
    }
}

#[derive(Clone, Debug, Default)]
pub struct FullSwing {
    pub back_swing: SwingPhaseData,
    pub down_swing: SwingPhaseData,
    pub follow_through: SwingPhaseData,
}

#[derive(Clone, Debug)]
pub enum SwingEvent {
    /// The golfer settled at address.
    Ready,
    PhaseChanged(SwingPhase),
    Finished(FullSwing),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwingTrackerConfig {
    /// Every drawable landmark must be in frame with a likelihood above this.
    pub in_frame_threshold: f32,
    /// Consecutive steady frames needed at address.
    pub resting_frames: u32,
    /// Starting tolerance, in image pixels, for "hands are steady".
    pub initial_max_jiggle: f32,
    /// Minimum hand travel, in image pixels, that counts as a direction change.
    pub change_buffer: f32,
    /// How long the follow-through is recorded before the swing is reported.
    pub finish_delay: Duration,
}

impl Default for SwingTrackerConfig {
    fn default() -> Self {
        Self {
            in_frame_threshold: 0.5,
            resting_frames: 10,
            initial_max_jiggle: 1.5,
            change_buffer: 5.0,
            finish_delay: Duration::from_millis(1_500),
        }
    }
}

/// Follows the hands through a golf swing, one pose at a time.
///
/// Image y grows downward, so "lowest" hands have the largest y.
pub struct SwingTracker {
    config: SwingTrackerConfig,
    events: Sender<SwingEvent>,
    phase: SwingPhase,
    previous_phase: SwingPhase,
    resting_counter: u32,
    lowest_hand_y: f32,
    highest_hand_y: f32,
    previous_hand: (f32, f32),
    max_jiggle: f32,
    swing: Option<FullSwing>,
    finish_at: Option<Instant>,
}

impl SwingTracker {
    pub fn new(config: SwingTrackerConfig, events: Sender<SwingEvent>) -> Self {
        Self {
            config,
            events,
            phase: SwingPhase::NotEngaged,
            previous_phase: SwingPhase::NotEngaged,
            resting_counter: config.resting_frames,
            lowest_hand_y: f32::NEG_INFINITY,
            highest_hand_y: f32::INFINITY,
            previous_hand: (0.0, 0.0),
            max_jiggle: config.initial_max_jiggle,
            swing: None,
            finish_at: None,
        }
    }

    pub fn phase(&self) -> SwingPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.swing = None;
        self.finish_at = None;
        self.lowest_hand_y = f32::NEG_INFINITY;
        self.highest_hand_y = f32::INFINITY;
        self.phase = SwingPhase::NotEngaged;
        self.previous_phase = SwingPhase::NotEngaged;
        self.previous_hand = (0.0, 0.0);
        self.resting_counter = self.config.resting_frames;
    }

    fn emit(&self, event: SwingEvent) {
        if self.events.send(event).is_err() {
            log::debug!("nobody is listening for swing events");
        }
    }

    /// Reports the swing once the follow-through has been recorded long enough.
    pub fn finish_if_due(&mut self, now: Instant) {
        let Some(finish_at) = self.finish_at else {
            return;
        };
        if now < finish_at {
            return;
        }

        if let Some(mut swing) = self.swing.take() {
            swing.follow_through.ended = Some(now);
            log::info!(
                "swing finished: {} back swing poses, {} down swing poses",
                swing.back_swing.poses().len(),
                swing.down_swing.poses().len()
            );
            self.emit(SwingEvent::Finished(swing));
        }
        self.reset();
    }

    /// Advances the phase machine with one fully visible pose.
    pub fn observe(&mut self, pose: &Pose, at: Instant) {
        let (Some(left_wrist), Some(right_wrist), Some(left_hip), Some(right_hip)) = (
            pose.position(LandmarkType::LeftWrist),
            pose.position(LandmarkType::RightWrist),
            pose.position(LandmarkType::LeftHip),
            pose.position(LandmarkType::RightHip),
        ) else {
            self.reset();
            return;
        };

        let hand = (
            (left_wrist.0 + right_wrist.0) / 2.0,
            (left_wrist.1 + right_wrist.1) / 2.0,
        );
        let hip_y = (left_hip.1 + right_hip.1) / 2.0;

        self.phase = self.next_phase(hand, hip_y);
        log::trace!(
            "hands {hand:?} previous {:?} hips {hip_y} lowest {} phase {:?}",
            self.previous_hand,
            self.lowest_hand_y,
            self.phase
        );

        match self.phase {
            SwingPhase::Ready => {
                let jiggle = (self.previous_hand.1 - hand.1).abs();
                self.max_jiggle = self.max_jiggle.max(jiggle);
                self.lowest_hand_y = self.lowest_hand_y.max(hand.1);
            }
            SwingPhase::BackSwing => {
                self.highest_hand_y = self.highest_hand_y.min(hand.1);
                if let Some(swing) = self.swing.as_mut() {
                    swing.back_swing.add_pose(pose.clone());
                }
            }
            SwingPhase::DownSwing => {
                if let Some(swing) = self.swing.as_mut() {
                    swing.down_swing.add_pose(pose.clone());
                }
            }
            SwingPhase::FollowThrough => {
                if let Some(swing) = self.swing.as_mut() {
                    swing.follow_through.add_pose(pose.clone());
                }
            }
            SwingPhase::NotEngaged => {}
        }

        self.previous_hand = hand;

        if self.phase == self.previous_phase {
            return;
        }

        match self.phase {
            SwingPhase::Ready => {
                self.swing = Some(FullSwing::default());
                self.emit(SwingEvent::Ready);
            }
            SwingPhase::BackSwing => {
                if let Some(swing) = self.swing.as_mut() {
                    swing.back_swing.started = Some(at);
                }
                self.emit(SwingEvent::PhaseChanged(SwingPhase::BackSwing));
            }
            SwingPhase::DownSwing => {
                if let Some(swing) = self.swing.as_mut() {
                    swing.back_swing.ended = Some(at);
                    swing.down_swing.started = Some(at);
                }
                self.emit(SwingEvent::PhaseChanged(SwingPhase::DownSwing));
            }
            SwingPhase::FollowThrough => {
                if let Some(swing) = self.swing.as_mut() {
                    swing.down_swing.ended = Some(at);
                    swing.follow_through.started = Some(at);
                }
                self.finish_at = Some(at + self.config.finish_delay);
                self.emit(SwingEvent::PhaseChanged(SwingPhase::FollowThrough));
            }
            SwingPhase::NotEngaged => {}
        }

        self.previous_phase = self.phase;
    }

    fn next_phase(&mut self, hand: (f32, f32), hip_y: f32) -> SwingPhase {
        if self.is_ready(hand, hip_y) {
            SwingPhase::Ready
        } else if self.is_back_swing_started(hand.1) {
            SwingPhase::BackSwing
        } else if self.is_down_swing_started(hand.1) {
            SwingPhase::DownSwing
        } else if self.is_follow_through_started(hand.1) {
            SwingPhase::FollowThrough
        } else {
            self.phase
        }
    }

    fn is_ready(&mut self, hand: (f32, f32), hip_y: f32) -> bool {
        let resting = (hand.0 - self.previous_hand.0).abs() <= self.max_jiggle
            && (hand.1 - self.previous_hand.1).abs() <= self.max_jiggle
            && hand.1 >= hip_y
            && self.phase == SwingPhase::NotEngaged;

        if resting {
            self.resting_counter = self.resting_counter.saturating_sub(1);
        } else {
            self.resting_counter = self.config.resting_frames;
        }

        resting && self.resting_counter == 0
    }

    fn is_back_swing_started(&self, hand_y: f32) -> bool {
        if (hand_y - self.lowest_hand_y).abs() < self.config.change_buffer {
            return false;
        }
        hand_y < self.lowest_hand_y && self.phase == SwingPhase::Ready
    }

    fn is_down_swing_started(&self, hand_y: f32) -> bool {
        if (hand_y - self.highest_hand_y).abs() < self.config.change_buffer {
            return false;
        }
        hand_y > self.highest_hand_y && self.phase == SwingPhase::BackSwing
    }

    fn is_follow_through_started(&self, hand_y: f32) -> bool {
        let rising_again = hand_y - self.previous_hand.1 <= 0.0;
        rising_again && self.phase == SwingPhase::DownSwing
    }
}

impl ResultHandler<Pose> for SwingTracker {
    fn on_result(&mut self, pose: Pose, overlay: &GraphicOverlay, image: &Frame) {
        self.finish_if_due(image.timestamp);

        if pose.is_empty() {
            return;
        }

        // Only track when the whole body is visible.
        if !pose.drawable_points_in_frame(self.config.in_frame_threshold) {
            self.reset();
            return;
        }

        self.observe(&pose, image.timestamp);
        overlay.add(PoseGraphic::new(pose));
    }

    fn on_error(&mut self, error: &ProcessError) {
        log::error!("pose detection failed: {error}");
    }
}
