//! Feeds camera frames to a detector, one at a time, and routes the outcome to
//! a result handler on a dedicated completion thread.
//!
//! Only one frame is ever inside the detector. A frame arriving while the
//! detector is busy becomes the pending "latest" frame and replaces (and
//! releases) any older pending one, so the detector always picks up the newest
//! frame next and nothing queues up behind it.

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use thiserror::Error;

use super::{
    notify::Notifier,
    overlay::{GraphicOverlay, InferenceInfoGraphic},
    rgba_converter,
    stats::{FpsCounter, LatencyStats, StatsSnapshot},
};
use crate::types::{CameraFrame, Frame};

/// The external vision model. Runs on the processor's detector thread.
pub trait Detector: Send + 'static {
    type Output: Send + 'static;

    fn detect(&mut self, image: &Frame) -> Result<Self::Output>;

    /// Called once when the detector thread exits.
    fn close(&mut self) {}
}

/// Adapts a closure into a [`Detector`].
pub struct FnDetector<F>(pub F);

impl<F, T> Detector for FnDetector<F>
where
    F: FnMut(&Frame) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn detect(&mut self, image: &Frame) -> Result<T> {
        (self.0)(image)
    }
}

/// Consumes detector outcomes. Always called on the completion thread.
pub trait ResultHandler<T>: Send + 'static {
    /// The overlay has already been cleared and carries the inference info graphic.
    fn on_result(&mut self, result: T, overlay: &GraphicOverlay, image: &Frame);

    fn on_error(&mut self, error: &ProcessError);
}

/// Adapts a pair of closures into a [`ResultHandler`].
pub struct FnHandler<R, E> {
    on_result: R,
    on_error: E,
}

impl<R, E> FnHandler<R, E> {
    pub fn new(on_result: R, on_error: E) -> Self {
        Self {
            on_result,
            on_error,
        }
    }
}

impl<T, R, E> ResultHandler<T> for FnHandler<R, E>
where
    R: FnMut(T, &GraphicOverlay, &Frame) + Send + 'static,
    E: FnMut(&ProcessError) + Send + 'static,
{
    fn on_result(&mut self, result: T, overlay: &GraphicOverlay, image: &Frame) {
        (self.on_result)(result, overlay, image)
    }

    fn on_error(&mut self, error: &ProcessError) {
        (self.on_error)(error)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("frame conversion failed: {0:#}")]
    Conversion(anyhow::Error),
    #[error("{0:#}")]
    Detection(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub fps_interval: Duration,
    pub show_fps: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            fps_interval: Duration::from_secs(1),
            show_fps: true,
        }
    }
}

/// A frame with everything needed to finish it; buffer and metadata travel together.
struct PendingFrame {
    frame: CameraFrame,
    overlay: GraphicOverlay,
    started: Instant,
}

#[derive(Default)]
struct FrameSlots {
    latest: Option<PendingFrame>,
    processing: bool,
}

#[derive(Default)]
struct Shared {
    shutdown: AtomicBool,
    slots: Mutex<FrameSlots>,
    stats: Mutex<StatsSnapshot>,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn lock_slots(&self) -> MutexGuard<'_, FrameSlots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_stats(&self) -> MutexGuard<'_, StatsSnapshot> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the processor shut down and hands back the pending frame, if any.
    /// Returns `None` for the frame and `false` when already shut down.
    fn shut_down(&self) -> (bool, Option<PendingFrame>) {
        let mut slots = self.lock_slots();
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return (false, None);
        }
        (true, slots.latest.take())
    }

    /// Hands the detector its next frame, or marks it idle.
    fn next_pending(&self) -> Option<PendingFrame> {
        let mut slots = self.lock_slots();
        let next = if self.is_shutdown() {
            None
        } else {
            slots.latest.take()
        };
        if next.is_none() {
            slots.processing = false;
        }
        next
    }
}

/// Shuts the processor down if the completion thread unwinds, so frames stop
/// reaching a detector whose results nobody handles.
struct ShutdownOnPanic(Arc<Shared>);

impl Drop for ShutdownOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("completion thread panicked, shutting the processor down");
            let (_, stale) = self.0.shut_down();
            drop(stale);
        }
    }
}

enum Completion<T> {
    Success {
        output: T,
        image: Frame,
        pending: PendingFrame,
    },
    Failure {
        error: ProcessError,
        pending: PendingFrame,
    },
}

pub struct VisionProcessor {
    shared: Arc<Shared>,
    job_tx: Sender<PendingFrame>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    completion_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl VisionProcessor {
    pub fn new<D, H, N>(detector: D, handler: H, notifier: N, config: ProcessorConfig) -> Result<Self>
    where
        D: Detector,
        H: ResultHandler<D::Output>,
        N: Notifier,
    {
        let shared = Arc::new(Shared::default());
        let (job_tx, job_rx) = bounded::<PendingFrame>(1);
        let (completion_tx, completion_rx) = bounded::<Completion<D::Output>>(1);
        // Never carries a message; dropping the sender is the stop signal.
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let completion_handle = thread::Builder::new()
            .name("vision-completion".into())
            .spawn({
                let shared = shared.clone();
                let shutdown_rx = shutdown_rx.clone();
                move || {
                    let _guard = ShutdownOnPanic(shared.clone());
                    CompletionContext::new(handler, notifier, shared, config)
                        .run(completion_rx, shutdown_rx)
                }
            })
            .context("failed to spawn completion thread")?;

        // The detector thread is detached: a hung detector call must not block `stop`.
        thread::Builder::new()
            .name("vision-detector".into())
            .spawn({
                let shared = shared.clone();
                move || run_detector(detector, shared, job_rx, shutdown_rx, completion_tx)
            })
            .context("failed to spawn detector thread")?;

        log::info!("vision processor started");

        Ok(Self {
            shared,
            job_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            completion_handle: Mutex::new(Some(completion_handle)),
        })
    }

    /// Queues `frame` for detection without blocking. The frame is released
    /// once its result has been handled, when a newer frame supersedes it, or
    /// immediately if the processor is stopped.
    pub fn process_frame(&self, frame: CameraFrame, overlay: &GraphicOverlay) {
        let pending = PendingFrame {
            frame,
            overlay: overlay.clone(),
            started: Instant::now(),
        };

        let (dispatch, released) = {
            let mut slots = self.shared.lock_slots();
            if self.shared.is_shutdown() {
                (None, Some(pending))
            } else if slots.processing {
                (None, slots.latest.replace(pending))
            } else {
                slots.processing = true;
                (Some(pending), None)
            }
        };

        if let Some(stale) = released {
            log::trace!("releasing frame without detection");
            stale.frame.release();
        }

        if let Some(pending) = dispatch {
            if let Err(err) = self.job_tx.send(pending) {
                log::warn!("detector thread is gone, dropping frame");
                self.shared.lock_slots().processing = false;
                err.into_inner().frame.release();
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        *self.shared.lock_stats()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Shuts the processor down for good. Pending frames are released, the FPS
    /// timer stops, and no result or error handler runs after this returns.
    /// A detection already in flight is not interrupted; its frame is released
    /// when it finishes.
    pub fn stop(&self) {
        let (_, stale) = self.shared.shut_down();
        drop(stale);

        // The processor may already be shut down by a dead completion thread;
        // the first `stop` still signals, joins and resets.
        let signalled = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        if !signalled {
            return;
        }

        let handle = self
            .completion_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("completion thread ended with a panic");
            }
        }

        self.shared.lock_stats().latency.reset();
        log::info!("vision processor stopped");
    }
}

impl Drop for VisionProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_detector<D: Detector>(
    mut detector: D,
    shared: Arc<Shared>,
    job_rx: Receiver<PendingFrame>,
    shutdown_rx: Receiver<()>,
    completion_tx: Sender<Completion<D::Output>>,
) {
    'jobs: loop {
        let first = select! {
            recv(job_rx) -> job => match job {
                Ok(pending) => pending,
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        };

        let mut next = Some(first);
        while let Some(pending) = next.take() {
            let completion = detect_one(&mut detector, pending);
            // Dropping a completion that could not be sent releases its frame.
            if completion_tx.send(completion).is_err() {
                let (first_to_stop, stale) = shared.shut_down();
                drop(stale);
                if first_to_stop {
                    log::error!("completion thread is gone, shutting the processor down");
                } else {
                    log::debug!("completion thread stopped, discarding detection");
                }
                break 'jobs;
            }
            next = shared.next_pending();
        }
    }

    detector.close();
    log::info!("detector thread exiting");
}

fn detect_one<D: Detector>(detector: &mut D, pending: PendingFrame) -> Completion<D::Output> {
    let image = match rgba_converter::convert_camera_frame(&pending.frame) {
        Ok(image) => image,
        Err(err) => {
            return Completion::Failure {
                error: ProcessError::Conversion(err),
                pending,
            };
        }
    };

    match detector.detect(&image) {
        Ok(output) => Completion::Success {
            output,
            image,
            pending,
        },
        Err(err) => Completion::Failure {
            error: ProcessError::Detection(err),
            pending,
        },
    }
}

/// State owned by the completion thread. Counters are only touched here.
struct CompletionContext<H> {
    handler: H,
    notifier: Box<dyn Notifier>,
    shared: Arc<Shared>,
    config: ProcessorConfig,
    latency: LatencyStats,
    fps: FpsCounter,
}

impl<H> CompletionContext<H> {
    fn new<N: Notifier>(handler: H, notifier: N, shared: Arc<Shared>, config: ProcessorConfig) -> Self {
        Self {
            handler,
            notifier: Box::new(notifier),
            shared,
            config,
            latency: LatencyStats::default(),
            fps: FpsCounter::default(),
        }
    }

    fn run<T>(mut self, completion_rx: Receiver<Completion<T>>, shutdown_rx: Receiver<()>)
    where
        H: ResultHandler<T>,
    {
        let fps_timer = tick(self.config.fps_interval);

        loop {
            select! {
                recv(completion_rx) -> completion => match completion {
                    Ok(completion) => self.handle(completion),
                    Err(_) => break,
                },
                recv(fps_timer) -> _ => {
                    self.fps.tick();
                    self.publish(None);
                },
                recv(shutdown_rx) -> _ => break,
            }
        }

        self.latency.reset();
        self.publish(None);
        log::info!("completion thread exiting");
    }

    fn handle<T>(&mut self, completion: Completion<T>)
    where
        H: ResultHandler<T>,
    {
        if self.shared.is_shutdown() {
            return;
        }

        match completion {
            Completion::Success {
                output,
                image,
                pending,
            } => {
                let latency_ms = self.latency.record(pending.started.elapsed());
                self.fps.frame_processed();

                let overlay = &pending.overlay;
                overlay.clear();
                overlay.add(InferenceInfoGraphic {
                    image_size: (image.width, image.height),
                    latency_ms,
                    fps: self.config.show_fps.then(|| self.fps.fps()),
                });
                self.handler.on_result(output, overlay, &image);
                overlay.post_invalidate();

                self.publish(Some(latency_ms));
                pending.frame.release();
            }
            Completion::Failure { error, pending } => {
                pending.overlay.clear();
                pending.overlay.post_invalidate();

                let message = format!("Failed to process. Error: {error}");
                log::debug!("{message}");
                self.notifier.notify(&message);
                self.handler.on_error(&error);

                pending.frame.release();
            }
        }
    }

    fn publish(&self, last_latency_ms: Option<u64>) {
        let mut snapshot = self.shared.lock_stats();
        snapshot.latency = self.latency;
        snapshot.fps = self.fps.fps();
        if last_latency_ms.is_some() {
            snapshot.last_latency_ms = last_latency_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use anyhow::anyhow;
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::{
        pipeline::{
            canvas::recording::{DrawOp, RecordingCanvas},
            notify::{ChannelNotifier, LogNotifier},
            overlay::ViewTransform,
        },
        types::{FrameMetadata, PixelFormat, Rotation},
    };

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    #[derive(Debug, PartialEq)]
    enum Event {
        Result(u8),
        Error(String),
    }

    /// Detector that reports which frame it got and then waits for the test
    /// to decide the outcome.
    struct GatedDetector {
        started_tx: Sender<u8>,
        gate_rx: Receiver<Result<u8, String>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Detector for GatedDetector {
        type Output = u8;

        fn detect(&mut self, image: &Frame) -> Result<u8> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _ = self.started_tx.send(image.rgba[0]);
            let outcome = self
                .gate_rx
                .recv()
                .map_err(|_| anyhow!("gate closed"))
                .and_then(|outcome| outcome.map_err(|msg| anyhow!(msg)));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    struct Harness {
        processor: VisionProcessor,
        overlay: GraphicOverlay,
        started_rx: Receiver<u8>,
        gate_tx: Sender<Result<u8, String>>,
        events_rx: Receiver<Event>,
        notes_rx: Receiver<String>,
        released_rx: Receiver<u8>,
        released_tx: Sender<u8>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            let (started_tx, started_rx) = unbounded();
            let (gate_tx, gate_rx) = unbounded();
            let (events_tx, events_rx) = unbounded();
            let (notes_tx, notes_rx) = unbounded();
            let (released_tx, released_rx) = unbounded();
            let max_in_flight = Arc::new(AtomicUsize::new(0));

            let detector = GatedDetector {
                started_tx,
                gate_rx,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: max_in_flight.clone(),
            };
            let errors_tx = events_tx.clone();
            let handler = FnHandler::new(
                move |id: u8, _overlay: &GraphicOverlay, _image: &Frame| {
                    let _ = events_tx.send(Event::Result(id));
                },
                move |err: &ProcessError| {
                    let _ = errors_tx.send(Event::Error(err.to_string()));
                },
            );
            let processor = VisionProcessor::new(
                detector,
                handler,
                ChannelNotifier::new(notes_tx),
                ProcessorConfig::default(),
            )
            .expect("processor starts");

            Self {
                processor,
                overlay: GraphicOverlay::new(ViewTransform::identity(2)),
                started_rx,
                gate_tx,
                events_rx,
                notes_rx,
                released_rx,
                released_tx,
                max_in_flight,
            }
        }

        /// 2x2 grayscale frame filled with `id`; reports `id` when released.
        fn frame(&self, id: u8) -> CameraFrame {
            gray_frame(id, &self.released_tx)
        }

        fn submit(&self, id: u8) {
            self.processor.process_frame(self.frame(id), &self.overlay);
        }

        fn assert_no_more_releases(&self) {
            assert!(self.released_rx.recv_timeout(QUIET).is_err());
        }
    }

    #[test]
    fn success_draws_info_calls_handler_and_releases_once() {
        let h = Harness::new();
        h.submit(1);
        assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(1));
        h.gate_tx.send(Ok(1)).unwrap();

        assert_eq!(h.events_rx.recv_timeout(WAIT), Ok(Event::Result(1)));
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(1));
        h.assert_no_more_releases();

        assert_eq!(h.overlay.len(), 1);
        assert_eq!(h.overlay.invalidation_count(), 1);
        assert_eq!(h.processor.stats().latency.num_runs, 1);
    }

    #[test]
    fn failure_clears_overlay_notifies_and_releases_once() {
        let h = Harness::new();
        h.overlay.add(InferenceInfoGraphic {
            image_size: (2, 2),
            latency_ms: 1,
            fps: None,
        });

        h.submit(7);
        assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(7));
        h.gate_tx.send(Err("model crashed".into())).unwrap();

        assert_eq!(
            h.events_rx.recv_timeout(WAIT),
            Ok(Event::Error("model crashed".into()))
        );
        let note = h.notes_rx.recv_timeout(WAIT).unwrap();
        assert!(note.contains("model crashed"), "{note}");
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(7));
        h.assert_no_more_releases();

        assert!(h.overlay.is_empty());
        assert_eq!(h.overlay.invalidation_count(), 1);
        assert_eq!(h.processor.stats().latency.num_runs, 0);
    }

    #[test]
    fn newer_frames_replace_pending_ones_and_never_overlap() {
        let h = Harness::new();
        h.submit(1);
        assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(1));

        h.submit(2);
        h.submit(3);
        // Frame 2 never reached the detector.
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(2));

        h.gate_tx.send(Ok(1)).unwrap();
        assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(3));
        h.gate_tx.send(Ok(3)).unwrap();

        assert_eq!(h.events_rx.recv_timeout(WAIT), Ok(Event::Result(1)));
        assert_eq!(h.events_rx.recv_timeout(WAIT), Ok(Event::Result(3)));
        let mut released = vec![
            h.released_rx.recv_timeout(WAIT).unwrap(),
            h.released_rx.recv_timeout(WAIT).unwrap(),
        ];
        released.sort();
        assert_eq!(released, vec![1, 3]);
        h.assert_no_more_releases();

        assert!(h.started_rx.try_recv().is_err());
        assert_eq!(h.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.processor.stats().latency.num_runs, 2);
    }

    #[test]
    fn stop_discards_in_flight_results_and_releases_later_frames() {
        let h = Harness::new();
        h.submit(1);
        assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(1));
        h.submit(2);

        h.processor.stop();
        assert!(h.processor.is_shutdown());
        // The pending frame goes back to the camera right away.
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(2));

        h.gate_tx.send(Ok(1)).unwrap();
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(1));
        assert!(h.events_rx.recv_timeout(QUIET).is_err());

        h.submit(3);
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(3));
        assert!(h.started_rx.recv_timeout(QUIET).is_err());
        h.assert_no_more_releases();

        assert_eq!(h.overlay.invalidation_count(), 0);
        assert_eq!(h.processor.stats().latency.num_runs, 0);
    }

    #[test]
    fn stats_accumulate_over_runs_and_reset_on_stop() {
        let h = Harness::new();
        for id in 1..=3 {
            h.submit(id);
            assert_eq!(h.started_rx.recv_timeout(WAIT), Ok(id));
            h.gate_tx.send(Ok(id)).unwrap();
            assert_eq!(h.events_rx.recv_timeout(WAIT), Ok(Event::Result(id)));
            assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(id));
        }

        let stats = h.processor.stats().latency;
        assert_eq!(stats.num_runs, 3);
        assert!(stats.min_run_ms <= stats.max_run_ms);
        assert!(stats.total_run_ms >= stats.max_run_ms);

        h.processor.stop();
        assert_eq!(h.processor.stats().latency, LatencyStats::default());
    }

    /// Reads the per-frame latency back from the info graphic.
    fn drawn_latency_ms(overlay: &GraphicOverlay) -> Option<u64> {
        let mut canvas = RecordingCanvas::default();
        overlay.draw(&mut canvas);
        canvas.ops.iter().find_map(|op| match op {
            DrawOp::Text(text) => text
                .split("Frame latency: ")
                .nth(1)?
                .trim_end_matches(" ms")
                .parse()
                .ok(),
            _ => None,
        })
    }

    fn gray_frame(id: u8, released_tx: &Sender<u8>) -> CameraFrame {
        let released_tx = released_tx.clone();
        CameraFrame::new(
            vec![id; 4],
            FrameMetadata {
                width: 2,
                height: 2,
                rotation: Rotation::Deg0,
                format: PixelFormat::Gray,
            },
        )
        .with_release(move || {
            let _ = released_tx.send(id);
        })
    }

    #[test]
    fn stats_follow_detector_durations() {
        let (latency_tx, latency_rx) = unbounded();
        let handler = FnHandler::new(
            move |_: u8, overlay: &GraphicOverlay, _: &Frame| {
                let _ = latency_tx.send(drawn_latency_ms(overlay));
            },
            |_: &ProcessError| {},
        );
        // Frame `id` keeps the detector busy for `id * 10` ms.
        let detector = FnDetector(|image: &Frame| -> Result<u8> {
            let id = image.rgba[0];
            thread::sleep(Duration::from_millis(u64::from(id) * 10));
            Ok(id)
        });
        let processor =
            VisionProcessor::new(detector, handler, LogNotifier, ProcessorConfig::default())
                .expect("processor starts");
        let overlay = GraphicOverlay::new(ViewTransform::identity(2));
        let (released_tx, released_rx) = unbounded();

        let mut latencies = Vec::new();
        for id in [2u8, 6, 4] {
            processor.process_frame(gray_frame(id, &released_tx), &overlay);
            let latency = latency_rx.recv_timeout(WAIT).unwrap().expect("latency drawn");
            assert!(latency >= u64::from(id) * 10, "{latency} ms for frame {id}");
            latencies.push(latency);
            assert_eq!(released_rx.recv_timeout(WAIT), Ok(id));
        }

        let stats = processor.stats();
        assert_eq!(stats.latency.num_runs, 3);
        assert_eq!(stats.latency.total_run_ms, latencies.iter().sum::<u64>());
        assert_eq!(Some(stats.latency.min_run_ms), latencies.iter().min().copied());
        assert_eq!(Some(stats.latency.max_run_ms), latencies.iter().max().copied());
        assert_eq!(stats.last_latency_ms, Some(latencies[2]));
    }

    #[test]
    fn panicking_handler_shuts_the_processor_down() {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = FnDetector({
            let calls = calls.clone();
            move |image: &Frame| -> Result<u8> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(image.rgba[0])
            }
        });
        let handler = FnHandler::new(
            |id: u8, _: &GraphicOverlay, _: &Frame| {
                if id == 1 {
                    panic!("handler bug on frame {id}");
                }
            },
            |_: &ProcessError| {},
        );
        let processor =
            VisionProcessor::new(detector, handler, LogNotifier, ProcessorConfig::default())
                .expect("processor starts");
        let overlay = GraphicOverlay::new(ViewTransform::identity(2));
        let (released_tx, released_rx) = unbounded();

        processor.process_frame(gray_frame(1, &released_tx), &overlay);
        // Unwinding still returns the frame.
        assert_eq!(released_rx.recv_timeout(WAIT), Ok(1));

        let deadline = Instant::now() + WAIT;
        while !processor.is_shutdown() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(processor.is_shutdown());

        processor.process_frame(gray_frame(2, &released_tx), &overlay);
        assert_eq!(released_rx.recv_timeout(WAIT), Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        processor.stop();
        assert_eq!(processor.stats().latency, LatencyStats::default());
    }

    #[test]
    fn unconvertible_frames_fail_without_reaching_the_detector() {
        let h = Harness::new();
        let released_tx = h.released_tx.clone();
        let broken = CameraFrame::new(
            vec![0; 3],
            FrameMetadata {
                width: 4,
                height: 4,
                rotation: Rotation::Deg0,
                format: PixelFormat::Rgb,
            },
        )
        .with_release(move || {
            let _ = released_tx.send(9);
        });

        h.processor.process_frame(broken, &h.overlay);

        match h.events_rx.recv_timeout(WAIT) {
            Ok(Event::Error(msg)) => assert!(msg.contains("conversion"), "{msg}"),
            other => panic!("expected a conversion error, got {other:?}"),
        }
        assert_eq!(h.released_rx.recv_timeout(WAIT), Ok(9));
        assert!(h.started_rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn fps_drops_to_zero_after_an_idle_interval() {
        let (events_tx, events_rx) = unbounded();
        let handler = FnHandler::new(
            move |_: (), _: &GraphicOverlay, _: &Frame| {
                let _ = events_tx.send(());
            },
            |_: &ProcessError| {},
        );
        let config = ProcessorConfig {
            fps_interval: Duration::from_millis(400),
            show_fps: true,
        };
        let processor = VisionProcessor::new(
            FnDetector(|_: &Frame| -> Result<()> { Ok(()) }),
            handler,
            LogNotifier,
            config,
        )
        .expect("processor starts");
        let overlay = GraphicOverlay::new(ViewTransform::identity(2));
        let frame = || {
            CameraFrame::new(
                vec![0; 4],
                FrameMetadata {
                    width: 2,
                    height: 2,
                    rotation: Rotation::Deg0,
                    format: PixelFormat::Gray,
                },
            )
        };

        for _ in 0..3 {
            processor.process_frame(frame(), &overlay);
            events_rx.recv_timeout(WAIT).unwrap();
        }
        // At least one whole interval passes without frames.
        thread::sleep(config.fps_interval * 2 + Duration::from_millis(200));
        assert_eq!(processor.stats().fps, 0);
        assert_eq!(processor.stats().latency.num_runs, 3);
    }
}
