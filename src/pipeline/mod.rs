pub mod camera;
pub mod canvas;
pub mod notify;
pub mod overlay;
pub mod processor;
pub mod rgba_converter;
pub mod skeleton;
pub mod stats;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraStream, available_cameras, start_camera_stream};
pub use camera::{FrameGate, MAX_OUTSTANDING_FRAMES};
pub use canvas::{Canvas, RgbaCanvas};
pub use notify::{ChannelNotifier, LogNotifier, Notifier};
pub use overlay::{Graphic, GraphicOverlay, InferenceInfoGraphic, ViewTransform};
pub use processor::{
    Detector, FnDetector, FnHandler, ProcessError, ProcessorConfig, ResultHandler,
    VisionProcessor,
};
pub use skeleton::{PoseGraphic, render_pose};
pub use stats::{FpsCounter, LatencyStats, StatsSnapshot};
