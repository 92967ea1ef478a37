//! Text drawing primitive for replacement text.
//!
//! The compositor only knows [`TextPainter`]. The MuPDF implementation
//! draws with the engine's built-in Times-Roman, a fixed serif substitute
//! that makes no attempt to match the document's own fonts.

use mupdf::{ColorParams, Colorspace, Device, Font, Matrix, Pixmap};

use super::raster::{CoverageMask, PageRaster};
use super::types::Rgb;

pub const SUBSTITUTE_FONT: &str = "Times-Roman";

/// Portion of the pixel size reserved above the baseline
const ASCENT_EM: f64 = 1.0;
/// Portion of the pixel size reserved below the baseline
const DESCENT_EM: f64 = 0.35;

/// One line of text to draw, in pixel space
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun<'a> {
    pub text: &'a str,
    /// Left edge of the first glyph
    pub origin_x: f64,
    pub baseline_y: f64,
    /// Em size in pixels
    pub pixel_size: f64,
    pub color: Rgb,
}

#[derive(Debug, thiserror::Error)]
pub enum PaintFault {
    #[error("text engine: {0}")]
    Engine(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl PaintFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Draws a single left-aligned line onto a raster.
///
/// Glyphs falling outside the raster are clipped.
pub trait TextPainter {
    fn draw_line(&mut self, raster: &mut PageRaster, run: &TextRun<'_>) -> Result<(), PaintFault>;
}

/// Renders runs with MuPDF into a line-sized coverage mask and blends the
/// mask into the page raster.
///
/// The font is loaded on first use, so a painter for a zero-edit run never
/// touches the font machinery.
#[derive(Default)]
pub struct MupdfTextPainter {
    font: Option<Font>,
}

impl MupdfTextPainter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn font(&mut self) -> Result<&Font, PaintFault> {
        if self.font.is_none() {
            self.font = Some(Font::new(SUBSTITUTE_FONT)?);
        }
        self.font
            .as_ref()
            .ok_or_else(|| PaintFault::generic("substitute font unavailable"))
    }
}

/// Advance width of `text` in ems
fn advance(font: &Font, text: &str) -> Result<f64, PaintFault> {
    let mut total = 0.0f64;
    for ch in text.chars() {
        let glyph = font.encode_character(ch as i32)?;
        total += f64::from(font.advance_glyph(glyph)?);
    }
    Ok(total)
}

impl TextPainter for MupdfTextPainter {
    fn draw_line(&mut self, raster: &mut PageRaster, run: &TextRun<'_>) -> Result<(), PaintFault> {
        if run.text.trim().is_empty() || run.pixel_size <= 0.0 {
            return Ok(());
        }

        let size = run.pixel_size;
        let font = self.font()?;
        let advance = advance(font, run.text)? * size;

        // Line box in raster pixels, clipped to the canvas
        let left = run.origin_x.floor().max(0.0);
        let top = (run.baseline_y - size * ASCENT_EM).floor().max(0.0);
        let right = (run.origin_x + advance + size * 0.5)
            .ceil()
            .min(f64::from(raster.width()));
        let bottom = (run.baseline_y + size * DESCENT_EM)
            .ceil()
            .min(f64::from(raster.height()));
        if left >= right || top >= bottom {
            return Ok(());
        }

        let box_width = (right - left) as i32;
        let box_height = (bottom - top) as i32;

        let gray = Colorspace::device_gray();
        let mut coverage = Pixmap::new_with_w_h(&gray, box_width, box_height, false)?;
        coverage.clear()?;

        {
            let device = Device::from_pixmap(&coverage)?;
            let baseline = (run.baseline_y - top) as f32;
            let mut pen_x = run.origin_x - left;

            for ch in run.text.chars() {
                let glyph = font.encode_character(ch as i32)?;
                // Y-down device space: flip the glyph matrix so glyphs stand upright
                let trm = Matrix::new(
                    size as f32,
                    0.0,
                    0.0,
                    -(size as f32),
                    pen_x as f32,
                    baseline,
                );
                // Blank glyphs such as spaces have no outline
                if let Some(outline) = font.outline_glyph_with_ctm(glyph, &trm)? {
                    device.fill_path(
                        &outline,
                        false,
                        &Matrix::IDENTITY,
                        &gray,
                        &[1.0],
                        1.0,
                        ColorParams::default(),
                    )?;
                }
                pen_x += f64::from(font.advance_glyph(glyph)?) * size;
            }
        }

        if coverage.n() != 1 {
            return Err(PaintFault::generic(format!(
                "unexpected coverage format: {} channels",
                coverage.n()
            )));
        }

        let mask = CoverageMask {
            samples: coverage.samples(),
            width: coverage.width(),
            height: coverage.height(),
            stride: coverage.stride() as usize,
        };
        raster.blend_coverage(left as i64, top as i64, &mask, run.color);
        Ok(())
    }
}
