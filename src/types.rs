use std::{fmt, time::Instant};

/// Detector input: an upright RGBA image.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Nv21,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
    Rgba,
}

/// Clockwise rotation that turns the sensor image upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Accepts any multiple of 90, including negative values.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub format: PixelFormat,
}

impl FrameMetadata {
    /// Size of the image once rotated upright.
    pub fn upright_size(&self) -> (u32, u32) {
        if self.rotation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// A frame as delivered by the camera.
///
/// The camera must be told when a frame is no longer needed, otherwise it
/// stops delivering new ones. The release callback runs exactly once: either
/// through [`CameraFrame::release`] or when the frame is dropped.
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub metadata: FrameMetadata,
    pub timestamp: Instant,
    release: Option<ReleaseFn>,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, metadata: FrameMetadata) -> Self {
        Self {
            data,
            metadata,
            timestamp: Instant::now(),
            release: None,
        }
    }

    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFrame")
            .field("len", &self.data.len())
            .field("metadata", &self.metadata)
            .field("timestamp", &self.timestamp)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn metadata() -> FrameMetadata {
        FrameMetadata {
            width: 2,
            height: 1,
            rotation: Rotation::Deg90,
            format: PixelFormat::Gray,
        }
    }

    #[test]
    fn release_runs_once_when_called_explicitly() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let frame = CameraFrame::new(vec![0, 0], metadata()).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        frame.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_an_unreleased_frame_releases_it() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        {
            let _frame = CameraFrame::new(vec![0, 0], metadata()).with_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rotation_normalizes_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(metadata().upright_size(), (1, 2));
    }
}
