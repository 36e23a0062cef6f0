//! The raster surface every capture route draws onto.

use resvg::tiny_skia::Pixmap;

use super::paint::{PaintCommand, Painter};
use crate::style::Color;
use crate::{Error, Result};

/// A `ceil(width*scale) x ceil(height*scale)` pixel surface (at least 1x1)
/// plus the logical size it represents.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixmap: Pixmap,
    logical_width: f32,
    logical_height: f32,
    scale: f32,
}

impl PixelBuffer {
    /// Device dimensions for a logical region.
    pub fn dimensions_for(width: f32, height: f32, scale: f32) -> (u32, u32) {
        let side = |v: f32| {
            let px = (v.max(0.0) * scale).ceil();
            if px.is_finite() {
                (px as u32).max(1)
            } else {
                1
            }
        };
        (side(width), side(height))
    }

    /// A transparent buffer.
    pub fn new(width: f32, height: f32, scale: f32) -> Result<Self> {
        let (w, h) = Self::dimensions_for(width, height, scale);
        let pixmap = Pixmap::new(w, h).ok_or_else(|| Error::Render(format!("cannot allocate {w}x{h} pixel buffer")))?;
        Ok(Self {
            pixmap,
            logical_width: width.max(0.0),
            logical_height: height.max(0.0),
            scale,
        })
    }

    /// A buffer pre-filled with `background`; `None` leaves it transparent.
    pub fn with_background(width: f32, height: f32, scale: f32, background: Option<Color>) -> Result<Self> {
        let mut buffer = Self::new(width, height, scale)?;
        if let Some(color) = background {
            buffer.pixmap.fill(color.to_skia());
        }
        Ok(buffer)
    }

    /// Device width in pixels
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Device height in pixels
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn logical_width(&self) -> f32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> f32 {
        self.logical_height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Paints commands given in logical coordinates.
    pub fn paint(&mut self, commands: &[PaintCommand]) {
        let scale = self.scale;
        Painter::new(&mut self.pixmap, scale).execute(commands);
    }

    /// Straight-alpha color of a device pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let p = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::rgba(p.red(), p.green(), p.blue(), p.alpha() as f32 / 255.0))
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Straight-alpha RGBA bytes, row-major.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_round_up_and_clamp() {
        assert_eq!(PixelBuffer::dimensions_for(200.0, 100.0, 1.0), (200, 100));
        assert_eq!(PixelBuffer::dimensions_for(100.5, 33.3, 2.0), (201, 67));
        assert_eq!(PixelBuffer::dimensions_for(0.0, 0.0, 3.0), (1, 1));
        assert_eq!(PixelBuffer::dimensions_for(-5.0, 10.0, 1.5), (1, 15));
    }

    #[test]
    fn background_fill() {
        let buffer = PixelBuffer::with_background(4.0, 2.0, 1.0, Some(Color::rgb(10, 20, 30))).unwrap();
        assert_eq!(buffer.pixel(3, 1), Some(Color::rgb(10, 20, 30)));
        let clear = PixelBuffer::with_background(4.0, 2.0, 1.0, None).unwrap();
        assert_eq!(clear.pixel(0, 0).unwrap().a, 0.0);
        assert_eq!(clear.to_rgba().len(), 4 * 2 * 4);
    }
}
