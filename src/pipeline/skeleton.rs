use super::{
    canvas::{Canvas, Color, GREEN, WHITE, YELLOW},
    overlay::{Graphic, ViewTransform},
};
use crate::pose::{LandmarkType::{self, *}, Pose};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodySide {
    Left,
    Right,
    /// Shoulder and hip lines crossing the body.
    Center,
}

impl BodySide {
    pub fn color(&self) -> Color {
        match self {
            BodySide::Left => GREEN,
            BodySide::Right => YELLOW,
            BodySide::Center => WHITE,
        }
    }
}

pub const CONNECTIONS: &[(LandmarkType, LandmarkType, BodySide)] = &[
    (LeftShoulder, RightShoulder, BodySide::Center),
    (LeftHip, RightHip, BodySide::Center),
    (LeftShoulder, LeftElbow, BodySide::Left),
    (LeftElbow, LeftWrist, BodySide::Left),
    (LeftShoulder, LeftHip, BodySide::Left),
    (LeftHip, LeftKnee, BodySide::Left),
    (LeftKnee, LeftAnkle, BodySide::Left),
    (LeftAnkle, LeftHeel, BodySide::Left),
    (LeftHeel, LeftFootIndex, BodySide::Left),
    (RightShoulder, RightElbow, BodySide::Right),
    (RightElbow, RightWrist, BodySide::Right),
    (RightShoulder, RightHip, BodySide::Right),
    (RightHip, RightKnee, BodySide::Right),
    (RightKnee, RightAnkle, BodySide::Right),
    (RightAnkle, RightHeel, BodySide::Right),
    (RightHeel, RightFootIndex, BodySide::Right),
];

pub const DOT_RADIUS: f32 = 8.0;
pub const SKELETON_LINE_THICKNESS: f32 = 4.0;
const POINT_COLOR: Color = WHITE;

/// Draws the body skeleton. Segments or points touching a landmark without a
/// position are skipped.
pub fn render_pose(canvas: &mut dyn Canvas, transform: &ViewTransform, pose: &Pose) {
    if pose.is_empty() {
        return;
    }

    for landmark in pose.landmarks() {
        if !landmark.kind.is_drawable() {
            continue;
        }
        if let Some(position) = landmark.position {
            canvas.draw_circle(
                transform.translate(position),
                DOT_RADIUS,
                POINT_COLOR,
            );
        }
    }

    for &(a, b, side) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (pose.position(a), pose.position(b)) {
            canvas.draw_line(
                transform.translate(pa),
                transform.translate(pb),
                SKELETON_LINE_THICKNESS,
                side.color(),
            );
        }
    }
}

pub struct PoseGraphic {
    pose: Pose,
}

impl PoseGraphic {
    pub fn new(pose: Pose) -> Self {
        Self { pose }
    }
}

impl Graphic for PoseGraphic {
    fn draw(&self, canvas: &mut dyn Canvas, transform: &ViewTransform) {
        render_pose(canvas, transform, &self.pose);
    }
}
