/// Body keypoints reported by the pose detector, in detector index order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LandmarkType {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    LeftMouth,
    RightMouth,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl LandmarkType {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkType; Self::COUNT] = [
        LandmarkType::Nose,
        LandmarkType::LeftEyeInner,
        LandmarkType::LeftEye,
        LandmarkType::LeftEyeOuter,
        LandmarkType::RightEyeInner,
        LandmarkType::RightEye,
        LandmarkType::RightEyeOuter,
        LandmarkType::LeftEar,
        LandmarkType::RightEar,
        LandmarkType::LeftMouth,
        LandmarkType::RightMouth,
        LandmarkType::LeftShoulder,
        LandmarkType::RightShoulder,
        LandmarkType::LeftElbow,
        LandmarkType::RightElbow,
        LandmarkType::LeftWrist,
        LandmarkType::RightWrist,
        LandmarkType::LeftPinky,
        LandmarkType::RightPinky,
        LandmarkType::LeftIndex,
        LandmarkType::RightIndex,
        LandmarkType::LeftThumb,
        LandmarkType::RightThumb,
        LandmarkType::LeftHip,
        LandmarkType::RightHip,
        LandmarkType::LeftKnee,
        LandmarkType::RightKnee,
        LandmarkType::LeftAnkle,
        LandmarkType::RightAnkle,
        LandmarkType::LeftHeel,
        LandmarkType::RightHeel,
        LandmarkType::LeftFootIndex,
        LandmarkType::RightFootIndex,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_drawable(&self) -> bool {
        DRAWABLE_POINTS.contains(self)
    }
}

/// Landmarks that get a dot in the overlay and that must be in frame before a
/// swing is tracked.
pub const DRAWABLE_POINTS: &[LandmarkType] = &[
    LandmarkType::LeftShoulder,
    LandmarkType::RightShoulder,
    LandmarkType::LeftElbow,
    LandmarkType::RightElbow,
    LandmarkType::LeftWrist,
    LandmarkType::RightWrist,
    LandmarkType::LeftHip,
    LandmarkType::RightHip,
    LandmarkType::LeftKnee,
    LandmarkType::RightKnee,
    LandmarkType::LeftAnkle,
    LandmarkType::RightAnkle,
    LandmarkType::RightEye,
    LandmarkType::LeftEye,
    LandmarkType::Nose,
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub kind: LandmarkType,
    /// Position in source image pixels; `None` when the detector could not place it.
    pub position: Option<(f32, f32)>,
    pub in_frame_likelihood: f32,
}

impl Landmark {
    pub fn new(kind: LandmarkType, x: f32, y: f32, in_frame_likelihood: f32) -> Self {
        Self {
            kind,
            position: Some((x, y)),
            in_frame_likelihood,
        }
    }

    pub fn absent(kind: LandmarkType) -> Self {
        Self {
            kind,
            position: None,
            in_frame_likelihood: 0.0,
        }
    }
}

/// Landmarks of one detected body in one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    landmarks: Vec<Landmark>,
}

impl Pose {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn landmark(&self, kind: LandmarkType) -> Option<&Landmark> {
        self.landmarks.iter().find(|landmark| landmark.kind == kind)
    }

    pub fn position(&self, kind: LandmarkType) -> Option<(f32, f32)> {
        self.landmark(kind).and_then(|landmark| landmark.position)
    }

    /// Whether every drawable landmark is present with a likelihood above `threshold`.
    pub fn drawable_points_in_frame(&self, threshold: f32) -> bool {
        self.landmarks
            .iter()
            .filter(|landmark| landmark.kind.is_drawable())
            .all(|landmark| landmark.in_frame_likelihood > threshold)
    }
}
