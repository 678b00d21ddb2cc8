//! Back swing metrics computed from the first (address) and last (top of the
//! back swing) poses of a recorded phase.
//!
//! Lengths are converted to inches by comparing the golfer's pixel height,
//! estimated from the left side of the body, with their real height.

use std::time::Duration;

use thiserror::Error;

use crate::{
    pose::{LandmarkType, Pose},
    swing::SwingPhaseData,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

/// The golfer's real proportions, in inches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyMeasurements {
    pub height: f32,
    pub hip_width: f32,
    pub shoulder_width: f32,
    pub handedness: Handedness,
}

impl Default for BodyMeasurements {
    fn default() -> Self {
        Self {
            height: 74.0,
            hip_width: 15.4,
            shoulder_width: 18.1,
            handedness: Handedness::Right,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("the swing phase recorded no poses")]
    EmptyPhase,
    #[error("pose has no position for {0:?}")]
    MissingLandmark(LandmarkType),
    #[error("pose is too small to measure (height {0} px)")]
    DegeneratePose(f32),
}

/// Angles are in degrees, distances in inches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackSwingReport {
    pub duration: Option<Duration>,
    /// How far the hips rotated between address and the top.
    pub hip_turn: f32,
    /// Angle of the shoulder line from horizontal at the top.
    pub shoulder_tilt: f32,
    /// Lateral travel of the trail hip from address to the top; positive is
    /// toward larger image x.
    pub hip_sway: f32,
    /// Lean of the trail-side spine from vertical at address.
    pub spine_tilt: f32,
    /// Lean of each femur from vertical at address.
    pub left_knee_bend: f32,
    pub right_knee_bend: f32,
}

pub fn analyze_back_swing(
    phase: &SwingPhaseData,
    body: &BodyMeasurements,
) -> Result<BackSwingReport, AnalysisError> {
    let (Some(address), Some(top)) = (phase.poses().first(), phase.poses().last()) else {
        return Err(AnalysisError::EmptyPhase);
    };

    let pixel_height = pose_height(address)?;
    if pixel_height <= f32::EPSILON {
        return Err(AnalysisError::DegeneratePose(pixel_height));
    }
    let pixels_per_inch = pixel_height / body.height;
    let hip_width_px = body.hip_width * pixels_per_inch;

    let (trail_hip, trail_shoulder) = match body.handedness {
        Handedness::Right => (LandmarkType::RightHip, LandmarkType::RightShoulder),
        Handedness::Left => (LandmarkType::LeftHip, LandmarkType::LeftShoulder),
    };

    let hip_turn = (hip_angle(address, hip_width_px)? - hip_angle(top, hip_width_px)?).abs();

    let left_shoulder = point(top, LandmarkType::LeftShoulder)?;
    let right_shoulder = point(top, LandmarkType::RightShoulder)?;
    let shoulder_tilt = (right_shoulder.1 - left_shoulder.1)
        .abs()
        .atan2((right_shoulder.0 - left_shoulder.0).abs())
        .to_degrees();

    let hip_sway = (point(top, trail_hip)?.0 - point(address, trail_hip)?.0) / pixels_per_inch;

    let spine_tilt = lean_from_vertical(point(address, trail_hip)?, point(address, trail_shoulder)?);
    let left_knee_bend = lean_from_vertical(
        point(address, LandmarkType::LeftHip)?,
        point(address, LandmarkType::LeftKnee)?,
    );
    let right_knee_bend = lean_from_vertical(
        point(address, LandmarkType::RightHip)?,
        point(address, LandmarkType::RightKnee)?,
    );

    let report = BackSwingReport {
        duration: phase.duration(),
        hip_turn,
        shoulder_tilt,
        hip_sway,
        spine_tilt,
        left_knee_bend,
        right_knee_bend,
    };
    log::debug!("back swing report: {report:?}");
    Ok(report)
}

fn point(pose: &Pose, kind: LandmarkType) -> Result<(f32, f32), AnalysisError> {
    pose.position(kind).ok_or(AnalysisError::MissingLandmark(kind))
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Ankle to eye along the left side, plus the eye to crown estimate.
fn pose_height(pose: &Pose) -> Result<f32, AnalysisError> {
    let ankle = point(pose, LandmarkType::LeftAnkle)?;
    let knee = point(pose, LandmarkType::LeftKnee)?;
    let hip = point(pose, LandmarkType::LeftHip)?;
    let shoulder = point(pose, LandmarkType::LeftShoulder)?;
    let nose = point(pose, LandmarkType::Nose)?;
    let eye = point(pose, LandmarkType::LeftEye)?;

    Ok(distance(ankle, knee)
        + distance(knee, hip)
        + distance(hip, shoulder)
        + (shoulder.1 - nose.1).abs()
        + (nose.1 - eye.1).abs() * 4.0)
}

/// Hip rotation away from the camera, from how much the hip line is foreshortened.
fn hip_angle(pose: &Pose, hip_width_px: f32) -> Result<f32, AnalysisError> {
    let projected = distance(
        point(pose, LandmarkType::RightHip)?,
        point(pose, LandmarkType::LeftHip)?,
    );
    Ok(acos_degrees(projected / hip_width_px))
}

fn lean_from_vertical(base: (f32, f32), tip: (f32, f32)) -> f32 {
    let length = distance(base, tip);
    if length <= f32::EPSILON {
        return 0.0;
    }
    acos_degrees((base.1 - tip.1).abs() / length)
}

fn acos_degrees(ratio: f32) -> f32 {
    ratio.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use approx::assert_relative_eq;

    use super::*;
    use crate::pose::Landmark;

    fn pose(points: &[(LandmarkType, f32, f32)]) -> Pose {
        Pose::new(
            points
                .iter()
                .map(|&(kind, x, y)| Landmark::new(kind, x, y, 0.99))
                .collect(),
        )
    }

    /// Left side is upright and 190 px tall.
    fn address_pose() -> Pose {
        let twenty = 20f32.to_radians();
        let thirty = 30f32.to_radians();
        pose(&[
            (LandmarkType::LeftAnkle, 80.0, 300.0),
            (LandmarkType::LeftKnee, 80.0, 250.0),
            (LandmarkType::LeftHip, 80.0, 200.0),
            (LandmarkType::LeftShoulder, 80.0, 150.0),
            (LandmarkType::Nose, 90.0, 130.0),
            (LandmarkType::LeftEye, 88.0, 125.0),
            (LandmarkType::RightHip, 100.0, 200.0),
            (
                LandmarkType::RightKnee,
                100.0 + 50.0 * twenty.sin(),
                200.0 + 50.0 * twenty.cos(),
            ),
            (
                LandmarkType::RightShoulder,
                100.0 + 50.0 * thirty.sin(),
                200.0 - 50.0 * thirty.cos(),
            ),
        ])
    }

    fn top_pose() -> Pose {
        pose(&[
            (LandmarkType::LeftHip, 85.0, 200.0),
            (LandmarkType::RightHip, 95.0, 200.0),
            (LandmarkType::LeftShoulder, 80.0, 150.0),
            (LandmarkType::RightShoulder, 120.0, 110.0),
        ])
    }

    fn body() -> BodyMeasurements {
        // One pixel per inch for the poses above.
        BodyMeasurements {
            height: 190.0,
            hip_width: 20.0,
            ..BodyMeasurements::default()
        }
    }

    fn phase(poses: Vec<Pose>) -> SwingPhaseData {
        let mut phase = SwingPhaseData::default();
        for pose in poses {
            phase.add_pose(pose);
        }
        phase
    }

    #[test]
    fn measures_address_and_top_of_back_swing() {
        let start = Instant::now();
        let mut data = phase(vec![address_pose(), top_pose()]);
        data.started = Some(start);
        data.ended = Some(start + Duration::from_millis(800));

        let report = analyze_back_swing(&data, &body()).expect("report");

        assert_eq!(report.duration, Some(Duration::from_millis(800)));
        assert_relative_eq!(report.hip_turn, 60.0, epsilon = 1e-3);
        assert_relative_eq!(report.shoulder_tilt, 45.0, epsilon = 1e-3);
        assert_relative_eq!(report.hip_sway, -5.0, epsilon = 1e-3);
        assert_relative_eq!(report.spine_tilt, 30.0, epsilon = 1e-3);
        assert_relative_eq!(report.left_knee_bend, 0.0, epsilon = 1e-3);
        assert_relative_eq!(report.right_knee_bend, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn real_proportions_scale_the_sway() {
        let data = phase(vec![address_pose(), top_pose()]);
        let tall = BodyMeasurements {
            height: 95.0,
            hip_width: 10.0,
            ..BodyMeasurements::default()
        };

        let report = analyze_back_swing(&data, &tall).expect("report");

        // Two pixels per inch now, so the hip line is just as wide in pixels.
        assert_relative_eq!(report.hip_sway, -2.5, epsilon = 1e-3);
        assert_relative_eq!(report.hip_turn, 60.0, epsilon = 1e-3);
        assert_eq!(report.duration, None);
    }

    #[test]
    fn stretched_hips_clamp_instead_of_producing_nan() {
        let mut wide_top = top_pose().landmarks().to_vec();
        for landmark in &mut wide_top {
            if landmark.kind == LandmarkType::RightHip {
                landmark.position = Some((140.0, 200.0));
            }
        }
        let data = phase(vec![address_pose(), Pose::new(wide_top)]);

        let report = analyze_back_swing(&data, &body()).expect("report");
        assert!(report.hip_turn.is_finite());
        assert_relative_eq!(report.hip_turn, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn left_handed_golfers_use_the_left_side() {
        let data = phase(vec![address_pose(), top_pose()]);
        let lefty = BodyMeasurements {
            handedness: Handedness::Left,
            ..body()
        };

        let report = analyze_back_swing(&data, &lefty).expect("report");
        assert_relative_eq!(report.spine_tilt, 0.0, epsilon = 1e-3);
        assert_relative_eq!(report.hip_sway, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn rejects_unusable_input() {
        assert_eq!(
            analyze_back_swing(&SwingPhaseData::default(), &body()),
            Err(AnalysisError::EmptyPhase)
        );

        let ankle_only = pose(&[(LandmarkType::LeftAnkle, 0.0, 0.0)]);
        assert_eq!(
            analyze_back_swing(&phase(vec![ankle_only]), &body()),
            Err(AnalysisError::MissingLandmark(LandmarkType::LeftKnee))
        );
    }
}
