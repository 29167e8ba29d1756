//! surface — the drawing seam the overlay renders through
//!
//! The registry and the graphics only ever talk to the `Surface` trait, so
//! the same overlay code can target a real frame buffer, a GPU canvas, or a
//! recording stub in tests.  `FrameSurface` is the concrete CPU
//! implementation over packed RGB24, drawing with `imageproc`.

use ab_glyph::{FontRef, PxScale};
use anyhow::{bail, Context, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::rect::Rect;

use crate::geometry::Region;

/// A packed RGB24 row-major frame, the render target of a single pass.
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    /// Allocate a black frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width * height * 3) as usize],
            width,
            height,
        }
    }
}

/// Drawing primitives a graphic may issue during a render pass.
///
/// Coordinates are view-space pixels; colors are packed RGB.  Implementations
/// must clip out-of-bounds geometry and treat degenerate (empty) regions as a
/// no-op rather than an error.
pub trait Surface {
    /// Stroke the outline of `region`.
    fn draw_rect(&mut self, region: Region, color: [u8; 3], stroke_width: f32) -> Result<()>;

    /// Fill `region` solid.
    fn fill_rect(&mut self, region: Region, color: [u8; 3]) -> Result<()>;

    /// Draw `text` with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: [u8; 3]) -> Result<()>;

    /// Composite `image` with its top-left corner at `(x, y)`.
    fn draw_image(&mut self, image: &RgbImage, x: f32, y: f32) -> Result<()>;
}

/// CPU surface over a borrowed `RgbFrame`.
///
/// Text rendering needs a font; when none is supplied, `draw_text` is a
/// silent no-op so headless callers can still render boxes and bands.
pub struct FrameSurface<'a> {
    frame: &'a mut RgbFrame,
    font: Option<FontRef<'a>>,
}

impl<'a> FrameSurface<'a> {
    pub fn new(frame: &'a mut RgbFrame) -> Self {
        Self { frame, font: None }
    }

    pub fn with_font(frame: &'a mut RgbFrame, font: FontRef<'a>) -> Self {
        Self {
            frame,
            font: Some(font),
        }
    }

    /// Run `f` against the frame's pixels viewed as an `RgbImage`.
    ///
    /// Builds the image from the existing buffer — no clone; pixels are
    /// written back in-place afterwards.
    fn with_canvas<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut RgbImage),
    {
        let expected = (self.frame.width * self.frame.height * 3) as usize;
        if self.frame.data.len() != expected {
            bail!(
                "frame buffer length {} does not match {}x{} RGB24",
                self.frame.data.len(),
                self.frame.width,
                self.frame.height
            );
        }
        let mut img: RgbImage = ImageBuffer::from_raw(
            self.frame.width,
            self.frame.height,
            std::mem::take(&mut self.frame.data),
        )
        .context("frame buffer rejected by image")?;
        f(&mut img);
        self.frame.data = img.into_raw();
        Ok(())
    }

    /// Clip a view-space region to the frame, `None` when nothing remains.
    fn clipped(&self, region: Region) -> Option<Rect> {
        let left = region.left.max(0.0) as i32;
        let top = region.top.max(0.0) as i32;
        let right = region.right.min(self.frame.width as f32) as i32;
        let bottom = region.bottom.min(self.frame.height as f32) as i32;
        let w = right - left;
        let h = bottom - top;
        if w < 1 || h < 1 {
            return None;
        }
        Some(Rect::at(left, top).of_size(w as u32, h as u32))
    }
}

impl Surface for FrameSurface<'_> {
    fn draw_rect(&mut self, region: Region, color: [u8; 3], stroke_width: f32) -> Result<()> {
        let Some(rect) = self.clipped(region) else {
            return Ok(());
        };
        let strokes = (stroke_width.round() as i32).max(1);
        self.with_canvas(|img| {
            for inset in 0..strokes {
                let w = rect.width() as i32 - 2 * inset;
                let h = rect.height() as i32 - 2 * inset;
                if w < 1 || h < 1 {
                    break;
                }
                let ring = Rect::at(rect.left() + inset, rect.top() + inset)
                    .of_size(w as u32, h as u32);
                imageproc::drawing::draw_hollow_rect_mut(img, ring, Rgb(color));
            }
        })
    }

    fn fill_rect(&mut self, region: Region, color: [u8; 3]) -> Result<()> {
        let Some(rect) = self.clipped(region) else {
            return Ok(());
        };
        self.with_canvas(|img| {
            imageproc::drawing::draw_filled_rect_mut(img, rect, Rgb(color));
        })
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: [u8; 3]) -> Result<()> {
        let Some(font) = self.font.clone() else {
            return Ok(());
        };
        self.with_canvas(|img| {
            imageproc::drawing::draw_text_mut(
                img,
                Rgb(color),
                x as i32,
                y as i32,
                PxScale::from(size),
                &font,
                text,
            );
        })
    }

    fn draw_image(&mut self, image: &RgbImage, x: f32, y: f32) -> Result<()> {
        self.with_canvas(|img| {
            image::imageops::overlay(img, image, x as i64, y as i64);
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! A surface that records draw calls instead of rasterizing them, for
    //! asserting on the rendering contract without pixel comparisons.

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum DrawOp {
        Rect { region: Region, color: [u8; 3] },
        Fill { region: Region, color: [u8; 3] },
        Text { text: String, x: f32, y: f32 },
        Image { x: f32, y: f32 },
    }

    #[derive(Default)]
    pub struct RecordingSurface {
        pub ops: Vec<DrawOp>,
    }

    impl RecordingSurface {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Surface for RecordingSurface {
        fn draw_rect(&mut self, region: Region, color: [u8; 3], _stroke_width: f32) -> Result<()> {
            self.ops.push(DrawOp::Rect { region, color });
            Ok(())
        }

        fn fill_rect(&mut self, region: Region, color: [u8; 3]) -> Result<()> {
            self.ops.push(DrawOp::Fill { region, color });
            Ok(())
        }

        fn draw_text(&mut self, text: &str, x: f32, y: f32, _size: f32, _color: [u8; 3]) -> Result<()> {
            self.ops.push(DrawOp::Text {
                text: text.to_string(),
                x,
                y,
            });
            Ok(())
        }

        fn draw_image(&mut self, _image: &RgbImage, x: f32, y: f32) -> Result<()> {
            self.ops.push(DrawOp::Image { x, y });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_writes_pixels() {
        let mut frame = RgbFrame::black(8, 8);
        let mut surface = FrameSurface::new(&mut frame);
        surface
            .fill_rect(Region::new(2.0, 2.0, 6.0, 6.0), [0, 255, 0])
            .unwrap();
        // Center pixel (4, 4): offset = (4 * 8 + 4) * 3
        let offset = (4 * 8 + 4) * 3;
        assert_eq!(&frame.data[offset..offset + 3], &[0, 255, 0]);
        // Outside the rect stays black.
        assert_eq!(&frame.data[0..3], &[0, 0, 0]);
    }

    #[test]
    fn out_of_bounds_region_is_skipped() {
        let mut frame = RgbFrame::black(8, 8);
        let mut surface = FrameSurface::new(&mut frame);
        surface
            .fill_rect(Region::new(-50.0, -50.0, -10.0, -10.0), [255, 0, 0])
            .unwrap();
        surface
            .draw_rect(Region::new(100.0, 100.0, 200.0, 200.0), [255, 0, 0], 5.0)
            .unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn partially_clipped_region_is_clamped() {
        let mut frame = RgbFrame::black(8, 8);
        let mut surface = FrameSurface::new(&mut frame);
        surface
            .fill_rect(Region::new(-4.0, -4.0, 4.0, 4.0), [255, 255, 255])
            .unwrap();
        assert_eq!(&frame.data[0..3], &[255, 255, 255]);
        let outside = (5 * 8 + 5) * 3;
        assert_eq!(&frame.data[outside..outside + 3], &[0, 0, 0]);
    }

    #[test]
    fn draw_text_without_font_is_noop() {
        let mut frame = RgbFrame::black(8, 8);
        let mut surface = FrameSurface::new(&mut frame);
        surface
            .draw_text("FRE955", 0.0, 0.0, 40.0, [255, 255, 255])
            .unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn mismatched_buffer_is_an_error() {
        let mut frame = RgbFrame {
            data: vec![0u8; 10],
            width: 8,
            height: 8,
        };
        let mut surface = FrameSurface::new(&mut frame);
        let err = surface.fill_rect(Region::new(0.0, 0.0, 4.0, 4.0), [1, 2, 3]);
        assert!(err.is_err());
    }
}
