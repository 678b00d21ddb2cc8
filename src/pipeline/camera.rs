use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::types::{CameraFrame, FrameMetadata};

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraDevice, CameraStream, available_cameras, start_camera_stream};

/// Frames the camera may have handed out without getting them back.
pub const MAX_OUTSTANDING_FRAMES: usize = 2;

/// Limits how many frames are out at once. Each frame returns its slot when
/// released; while all slots are taken the camera drops what it captures.
#[derive(Clone, Debug)]
pub struct FrameGate {
    outstanding: Arc<AtomicUsize>,
    limit: usize,
}

impl FrameGate {
    pub fn new(limit: usize) -> Self {
        Self {
            outstanding: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    pub fn try_acquire(&self, data: Vec<u8>, metadata: FrameMetadata) -> Option<CameraFrame> {
        let limit = self.limit;
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;

        let outstanding = self.outstanding.clone();
        Some(CameraFrame::new(data, metadata).with_release(move || {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new(MAX_OUTSTANDING_FRAMES)
    }
}

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Instant,
    };

    use anyhow::{Result, anyhow};
    use crossbeam_channel::Sender;
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType,
        },
    };

    use super::FrameGate;
    use crate::types::{CameraFrame, FrameMetadata, PixelFormat, Rotation};

    // Prefer pixel formats that are widely supported on macOS (the built-in cameras
    // often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub label: String,
    }

    #[derive(Debug)]
    pub struct CameraStream {
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl CameraStream {
        pub fn stop(mut self) {
            self.shutdown();
        }

        pub fn is_finished(&self) -> bool {
            self.handle
                .as_ref()
                .map_or(true, |handle| handle.is_finished())
        }

        fn shutdown(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    impl Drop for CameraStream {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .map(|info| CameraDevice {
                index: info.index().clone(),
                label: format_camera_label(&info),
            })
            .collect())
    }

    fn format_camera_label(info: &CameraInfo) -> String {
        info.human_name()
    }

    fn build_camera(index: CameraIndex) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    fn pixel_format(format: FrameFormat) -> PixelFormat {
        match format {
            FrameFormat::NV12 => PixelFormat::Nv12,
            FrameFormat::YUYV => PixelFormat::Yuyv,
            FrameFormat::MJPEG => PixelFormat::Mjpeg,
            FrameFormat::RAWRGB => PixelFormat::Rgb,
            FrameFormat::RAWBGR => PixelFormat::Bgr,
            FrameFormat::GRAY => PixelFormat::Gray,
        }
    }

    /// Captures raw frames on a background thread. Frames carry `rotation` as
    /// metadata and hold a [`FrameGate`] slot until released.
    pub fn start_camera_stream(
        index: CameraIndex,
        rotation: Rotation,
        gate: FrameGate,
        frame_tx: Sender<CameraFrame>,
    ) -> Result<CameraStream> {
        // Fail fast before spawning the capture thread.
        build_camera(index.clone())?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to open camera: {err:?}");
                    return;
                }
            };

            while !stop_flag.load(Ordering::Relaxed) {
                let frame_start = Instant::now();
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!(
                            "camera frame read failed (after {:?}): {err:?}",
                            frame_start.elapsed()
                        );
                        continue;
                    }
                };

                let resolution = buffer.resolution();
                let metadata = FrameMetadata {
                    width: resolution.width_x,
                    height: resolution.height_y,
                    rotation,
                    format: pixel_format(buffer.source_frame_format()),
                };

                let Some(frame) = gate.try_acquire(buffer.buffer().to_vec(), metadata) else {
                    log::trace!("all frames are still out, dropping capture");
                    continue;
                };

                if frame_tx.send(frame).is_err() {
                    log::info!("frame receiver closed, stopping camera");
                    break;
                }
            }
        });

        Ok(CameraStream {
            stop,
            handle: Some(handle),
        })
    }
}
