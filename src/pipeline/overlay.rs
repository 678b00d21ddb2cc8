use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};

use crossbeam_channel::{Receiver, Sender, bounded};

use super::canvas::{Canvas, WHITE};

/// Maps source image coordinates into display coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub view_width: f32,
    /// Front cameras are shown mirrored.
    pub mirror: bool,
}

impl ViewTransform {
    pub fn identity(view_width: u32) -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            view_width: view_width as f32,
            mirror: false,
        }
    }

    /// Scales the image to fill the view, cropping the overflowing axis evenly.
    pub fn fill(image: (u32, u32), view: (u32, u32), mirror: bool) -> Self {
        let (image_w, image_h) = (image.0.max(1) as f32, image.1.max(1) as f32);
        let (view_w, view_h) = (view.0 as f32, view.1 as f32);
        let scale = (view_w / image_w).max(view_h / image_h);

        Self {
            scale,
            offset_x: (image_w * scale - view_w) / 2.0,
            offset_y: (image_h * scale - view_h) / 2.0,
            view_width: view_w,
            mirror,
        }
    }

    pub fn scale(&self, length: f32) -> f32 {
        length * self.scale
    }

    pub fn translate_x(&self, x: f32) -> f32 {
        let translated = self.scale(x) - self.offset_x;
        if self.mirror {
            self.view_width - translated
        } else {
            translated
        }
    }

    pub fn translate_y(&self, y: f32) -> f32 {
        self.scale(y) - self.offset_y
    }

    pub fn translate(&self, point: (f32, f32)) -> (f32, f32) {
        (self.translate_x(point.0), self.translate_y(point.1))
    }
}

/// Something that can be drawn on top of the camera preview.
pub trait Graphic: Send {
    fn draw(&self, canvas: &mut dyn Canvas, transform: &ViewTransform);
}

struct OverlayState {
    graphics: Vec<Box<dyn Graphic>>,
    transform: ViewTransform,
}

/// Display surface shared between the frame processor and whatever paints the preview.
///
/// Cloning yields another handle to the same surface.
#[derive(Clone)]
pub struct GraphicOverlay {
    state: Arc<Mutex<OverlayState>>,
    invalidations: Arc<AtomicU64>,
    redraw_tx: Option<Sender<()>>,
}

impl GraphicOverlay {
    pub fn new(transform: ViewTransform) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState {
                graphics: Vec::new(),
                transform,
            })),
            invalidations: Arc::new(AtomicU64::new(0)),
            redraw_tx: None,
        }
    }

    /// Like [`GraphicOverlay::new`], plus a receiver that wakes up on redraw requests.
    /// Pending requests coalesce into one.
    pub fn with_redraw_channel(transform: ViewTransform) -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(1);
        let mut overlay = Self::new(transform);
        overlay.redraw_tx = Some(tx);
        (overlay, rx)
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn clear(&self) {
        self.lock().graphics.clear();
    }

    pub fn add<G: Graphic + 'static>(&self, graphic: G) {
        self.lock().graphics.push(Box::new(graphic));
    }

    pub fn post_invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = &self.redraw_tx {
            let _ = tx.try_send(());
        }
    }

    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().graphics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transform(&self) -> ViewTransform {
        self.lock().transform
    }

    pub fn set_transform(&self, transform: ViewTransform) {
        self.lock().transform = transform;
    }

    pub fn translate_x(&self, x: f32) -> f32 {
        self.transform().translate_x(x)
    }

    pub fn translate_y(&self, y: f32) -> f32 {
        self.transform().translate_y(y)
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        let state = self.lock();
        for graphic in &state.graphics {
            graphic.draw(canvas, &state.transform);
        }
    }
}

const INFO_TEXT_X: f32 = 8.0;
const INFO_TEXT_Y: f32 = 14.0;
const INFO_LINE_HEIGHT: f32 = 12.0;

/// Latency and frame rate shown in the top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceInfoGraphic {
    pub image_size: (u32, u32),
    pub latency_ms: u64,
    pub fps: Option<u32>,
}

impl InferenceInfoGraphic {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "InputImage size: {}x{}",
            self.image_size.0, self.image_size.1
        )];
        if let Some(fps) = self.fps {
            lines.push(format!("FPS: {fps}, Frame latency: {} ms", self.latency_ms));
        } else {
            lines.push(format!("Frame latency: {} ms", self.latency_ms));
        }
        lines
    }
}

impl Graphic for InferenceInfoGraphic {
    fn draw(&self, canvas: &mut dyn Canvas, _transform: &ViewTransform) {
        for (row, line) in self.lines().iter().enumerate() {
            let y = INFO_TEXT_Y + row as f32 * INFO_LINE_HEIGHT;
            canvas.draw_text(line, (INFO_TEXT_X, y), WHITE);
        }
    }
}
