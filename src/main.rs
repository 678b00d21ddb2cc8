use std::{io::BufRead, thread};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use swing_vision::{
    settings::{self, EnvPreferences},
    types::Rotation,
};

struct Options {
    camera_index: u32,
    rotation: Rotation,
    live_viewport: bool,
    /// Latest preview is written here once per second when set.
    snapshot_path: Option<String>,
}

impl Options {
    fn from_env(prefs: &EnvPreferences) -> Result<Self> {
        let camera_index = match prefs.get_string("camera_index") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid camera index {raw:?}"))?,
            None => 0,
        };

        let rotation = match prefs.get_string("rotation") {
            Some(raw) => raw
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(Rotation::from_degrees)
                .ok_or_else(|| anyhow!("rotation must be 0, 90, 180 or 270, got {raw:?}"))?,
            None => Rotation::default(),
        };

        Ok(Self {
            camera_index,
            rotation,
            live_viewport: settings::is_camera_live_viewport_enabled(prefs),
            snapshot_path: prefs.get_string("snapshot").filter(|path| !path.is_empty()),
        })
    }
}

/// Fires once a `q` line is read or `input` closes.
#[cfg_attr(not(feature = "camera-nokhwa"), allow(dead_code))]
fn spawn_quit_watcher<R>(input: R) -> Result<Receiver<()>>
where
    R: BufRead + Send + 'static,
{
    let (quit_tx, quit_rx) = bounded(1);
    thread::Builder::new()
        .name("quit-watcher".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => break,
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("stopped reading input: {err}");
                        break;
                    }
                }
            }
            let _ = quit_tx.send(());
        })
        .context("failed to spawn quit watcher")?;
    Ok(quit_rx)
}

fn main() -> Result<()> {
    env_logger::init();

    let options = Options::from_env(&EnvPreferences::new())?;
    log::info!(
        "camera {} rotation {}° live viewport {}",
        options.camera_index,
        options.rotation.degrees(),
        options.live_viewport
    );

    run(options)
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run(_options: Options) -> Result<()> {
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}

#[cfg(feature = "camera-nokhwa")]
fn run(options: Options) -> Result<()> {
    use std::time::Duration;

    use crossbeam_channel::{select, tick, unbounded};
    use image::RgbaImage;
    use nokhwa::utils::CameraIndex;
    use swing_vision::{
        analyzer::{self, BodyMeasurements},
        pipeline::{
            FnDetector, FrameGate, GraphicOverlay, LogNotifier, MAX_OUTSTANDING_FRAMES,
            ProcessorConfig, ViewTransform, VisionProcessor, start_camera_stream,
        },
        pose::Pose,
        swing::{SwingEvent, SwingTracker, SwingTrackerConfig},
        types::Frame,
    };

    use self::preview::PreviewHandler;

    let (frame_tx, frame_rx) = bounded(MAX_OUTSTANDING_FRAMES);
    let (swing_tx, swing_rx) = unbounded();
    let (preview_tx, preview_rx) = bounded::<RgbaImage>(1);

    let handler = PreviewHandler::new(
        SwingTracker::new(SwingTrackerConfig::default(), swing_tx),
        options.live_viewport,
        preview_tx,
    );

    // Pose models plug in here; without one every frame yields an empty pose.
    let detector = FnDetector(|_: &Frame| -> Result<Pose> { Ok(Pose::default()) });

    let processor =
        VisionProcessor::new(detector, handler, LogNotifier, ProcessorConfig::default())?;
    let overlay = GraphicOverlay::new(ViewTransform::identity(0));

    let stream = start_camera_stream(
        CameraIndex::Index(options.camera_index),
        options.rotation,
        FrameGate::default(),
        frame_tx,
    )?;

    let quit_rx = spawn_quit_watcher(std::io::BufReader::new(std::io::stdin()))?;
    log::info!("type q or close stdin to stop");

    let body = BodyMeasurements::default();
    let ticker = tick(Duration::from_secs(1));
    let mut latest_preview = None;

    loop {
        select! {
            recv(frame_rx) -> frame => match frame {
                Ok(frame) => processor.process_frame(frame, &overlay),
                Err(_) => {
                    log::info!("camera stream ended");
                    break;
                }
            },
            recv(quit_rx) -> _ => {
                log::info!("stopping");
                break;
            },
            recv(swing_rx) -> event => {
                if let Ok(SwingEvent::Finished(swing)) = event {
                    match analyzer::analyze_back_swing(&swing.back_swing, &body) {
                        Ok(report) => log::info!("back swing: {report:?}"),
                        Err(err) => log::warn!("could not analyze back swing: {err}"),
                    }
                }
            },
            recv(preview_rx) -> image => {
                if let Ok(image) = image {
                    latest_preview = Some(image);
                }
            },
            recv(ticker) -> _ => {
                let stats = processor.stats();
                log::info!(
                    "fps {} last latency {:?} ms avg {:.1} ms over {} runs",
                    stats.fps,
                    stats.last_latency_ms,
                    stats.latency.average_ms().unwrap_or_default(),
                    stats.latency.num_runs
                );

                if let (Some(path), Some(image)) = (&options.snapshot_path, latest_preview.take()) {
                    if let Err(err) = image.save(path) {
                        log::warn!("failed to write preview to {path}: {err}");
                    }
                }
            },
        }
    }

    processor.stop();
    // Unblocks a capture thread waiting on a full channel before joining it.
    drop(frame_rx);
    stream.stop();
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
mod preview {
    use crossbeam_channel::Sender;
    use image::RgbaImage;
    use swing_vision::{
        pipeline::{GraphicOverlay, ProcessError, ResultHandler, RgbaCanvas},
        types::Frame,
    };

    const BLACK: [u8; 4] = [0, 0, 0, 255];

    /// Composites the overlay after the wrapped handler has drawn into it.
    pub struct PreviewHandler<H> {
        inner: H,
        live_viewport: bool,
        preview_tx: Sender<RgbaImage>,
    }

    impl<H> PreviewHandler<H> {
        pub fn new(inner: H, live_viewport: bool, preview_tx: Sender<RgbaImage>) -> Self {
            Self {
                inner,
                live_viewport,
                preview_tx,
            }
        }
    }

    impl<T, H: ResultHandler<T>> ResultHandler<T> for PreviewHandler<H> {
        fn on_result(&mut self, result: T, overlay: &GraphicOverlay, image: &Frame) {
            self.inner.on_result(result, overlay, image);

            let mut rgba = if self.live_viewport {
                image.rgba.clone()
            } else {
                BLACK.repeat(image.rgba.len() / 4)
            };
            overlay.draw(&mut RgbaCanvas::new(&mut rgba, image.width, image.height));

            if let Some(preview) = RgbaImage::from_raw(image.width, image.height, rgba) {
                // Keep whatever the main loop has not picked up yet.
                let _ = self.preview_tx.try_send(preview);
            }
        }

        fn on_error(&mut self, error: &ProcessError) {
            self.inner.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, time::Duration};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn quit_fires_on_q_line() {
        let quit_rx = spawn_quit_watcher(Cursor::new("hello\n Q \nignored\n")).unwrap();
        assert_eq!(quit_rx.recv_timeout(WAIT), Ok(()));
    }

    #[test]
    fn quit_fires_when_input_closes() {
        let quit_rx = spawn_quit_watcher(Cursor::new("")).unwrap();
        assert_eq!(quit_rx.recv_timeout(WAIT), Ok(()));
    }
}
