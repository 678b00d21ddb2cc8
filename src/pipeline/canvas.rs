use std::convert::Infallible;

use embedded_graphics::{
    Pixel,
    mono_font::{MonoTextStyle, ascii::FONT_6X10},
    pixelcolor::Rgb888,
    prelude::*,
    text::Text,
};

/// RGBA color.
pub type Color = [u8; 4];

pub const WHITE: Color = [255, 255, 255, 255];
pub const GREEN: Color = [0, 255, 0, 255];
pub const YELLOW: Color = [255, 255, 0, 255];

/// Drawing primitives used by overlay graphics. Coordinates are view space.
pub trait Canvas {
    fn draw_circle(&mut self, center: (f32, f32), radius: f32, color: Color);
    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Color);
    /// `origin` is the left end of the text baseline.
    fn draw_text(&mut self, text: &str, origin: (f32, f32), color: Color);
}

/// Software canvas over a tightly packed RGBA buffer.
pub struct RgbaCanvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> RgbaCanvas<'a> {
    pub fn new(buffer: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            buffer,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl RgbaCanvas<'_> {
    /// Any circle or stroke this wide already covers the whole canvas.
    fn max_extent(&self) -> f32 {
        (self.width + self.height) as f32
    }
}

impl Canvas for RgbaCanvas<'_> {
    fn draw_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        if !(center.0.is_finite() && center.1.is_finite() && radius.is_finite()) {
            return;
        }
        let radius = radius.clamp(0.0, self.max_extent());
        let (w, h) = (self.width as f32, self.height as f32);
        if center.0 + radius < 0.0
            || center.1 + radius < 0.0
            || center.0 - radius >= w
            || center.1 - radius >= h
        {
            return;
        }

        let (cx, cy) = (center.0 as i32, center.1 as i32);
        let radius = radius.round() as i32;
        let (x_min, x_max) = ((cx - radius).max(0), (cx + radius).min(self.width as i32 - 1));
        let (y_min, y_max) = ((cy - radius).max(0), (cy + radius).min(self.height as i32 - 1));
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= radius * radius {
                    put_pixel_safe(self.buffer, self.width, self.height, x, y, color);
                }
            }
        }
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Color) {
        if self.width == 0 || self.height == 0 || !thickness.is_finite() {
            return;
        }
        let thickness = thickness.clamp(1.0, self.max_extent());
        let radius = ((thickness.round() as i32).max(1) - 1) / 2;

        // Rasterize only the part that can touch the canvas.
        let pad = (radius + 1) as f32;
        let Some((from, to)) = clip_segment(
            from,
            to,
            (-pad, -pad),
            (self.width as f32 + pad, self.height as f32 + pad),
        ) else {
            return;
        };

        let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
        let (x1, y1) = (to.0 as i32, to.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            put_pixel_safe(self.buffer, self.width, self.height, x0, y0, color);
            if radius > 0 {
                for ox in -radius..=radius {
                    for oy in -radius..=radius {
                        if ox == 0 && oy == 0 {
                            continue;
                        }
                        if ox.abs() + oy.abs() <= radius {
                            put_pixel_safe(
                                self.buffer,
                                self.width,
                                self.height,
                                x0 + ox,
                                y0 + oy,
                                color,
                            );
                        }
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn draw_text(&mut self, text: &str, origin: (f32, f32), color: Color) {
        let style = MonoTextStyle::new(&FONT_6X10, Rgb888::new(color[0], color[1], color[2]));
        let position = Point::new(origin.0 as i32, origin.1 as i32);
        match Text::new(text, position, style).draw(self) {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

impl OriginDimensions for RgbaCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for RgbaCanvas<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            put_pixel_safe(
                self.buffer,
                self.width,
                self.height,
                point.x,
                point.y,
                [color.r(), color.g(), color.b(), 255],
            );
        }
        Ok(())
    }
}

/// Liang-Barsky clip of a segment to the box `min..=max`. `None` when the
/// segment misses the box or has a non-finite endpoint.
fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (x0, y0) = (f64::from(from.0), f64::from(from.1));
    let (dx, dy) = (f64::from(to.0) - x0, f64::from(to.1) - y0);
    let (min_x, min_y) = (f64::from(min.0), f64::from(min.1));
    let (max_x, max_y) = (f64::from(max.0), f64::from(max.1));

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, x0 - min_x),
        (dx, max_x - x0),
        (-dy, y0 - min_y),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    let at = |t: f64| {
        (
            (x0 + t * dx).clamp(min_x, max_x) as f32,
            (y0 + t * dy).clamp(min_y, max_y) as f32,
        )
    };
    Some((at(t0), at(t1)))
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}
