//! Edit compositing: mask the original region, then letter the new text.

use log::{debug, trace};

use super::error::{EditError, Result};
use super::raster::PageRaster;
use super::text::{TextPainter, TextRun};
use super::transform::rect_to_pixel;
use super::types::{PixelRect, Rgb, TextEdit};

/// Mask padding in points, scaled to pixels per page.
///
/// Covers anti-aliased glyph edges of the original content.
pub const MASK_PADDING_PT: f64 = 2.0;

/// Extra leading between replacement lines, in points
pub const LINE_LEADING_PT: f64 = 2.0;

/// Where an edit paints, in pixel space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EditLayout {
    /// Unpadded target rectangle
    pub target: PixelRect,
    /// Padded rectangle filled with white
    pub mask: PixelRect,
    pub text_x: f64,
    pub first_baseline: f64,
    pub line_advance: f64,
    pub pixel_size: f64,
}

impl EditLayout {
    #[must_use]
    pub fn compute(edit: &TextEdit, page_height: f64, scale: f64) -> Self {
        let target = rect_to_pixel(&edit.pdf_rect, page_height, scale);
        let padding = MASK_PADDING_PT * scale;
        let inset = padding / 2.0;

        Self {
            target,
            mask: target.pad(padding),
            text_x: target.x + inset,
            first_baseline: target.bottom() - inset,
            line_advance: (edit.font_size + LINE_LEADING_PT) * scale,
            pixel_size: edit.font_size * scale,
        }
    }

    /// Baseline of line `index` (0-based)
    #[must_use]
    pub fn baseline(&self, index: usize) -> f64 {
        self.first_baseline + self.line_advance * index as f64
    }
}

/// Apply `edits` to one page's raster in submission order.
///
/// Takes the raster by value and hands the edited buffer back; all edits
/// land on the same buffer with nothing encoded in between. Overlapping
/// edits stack, so the last submitted one is what remains visible.
pub fn composite(
    mut raster: PageRaster,
    page_height: f64,
    scale: f64,
    edits: &[&TextEdit],
    painter: &mut dyn TextPainter,
) -> Result<PageRaster> {
    for edit in edits {
        let layout = EditLayout::compute(edit, page_height, scale);
        trace!(
            "Page {}: replacing {:?} in {:?}",
            edit.page_number, edit.original_text, layout.mask
        );

        if let Some(bounds) = layout.mask.snap(raster.width(), raster.height()) {
            raster.fill_rect(bounds, Rgb::WHITE);
        } else {
            debug!(
                "Page {}: edit rectangle {:?} lies outside the canvas",
                edit.page_number, edit.pdf_rect
            );
        }

        for (index, line) in edit.lines().enumerate() {
            let run = TextRun {
                text: line,
                origin_x: layout.text_x,
                baseline_y: layout.baseline(index),
                pixel_size: layout.pixel_size,
                color: edit.text_color,
            };
            painter
                .draw_line(&mut raster, &run)
                .map_err(|fault| EditError::TextRendering {
                    page: edit.page_number,
                    detail: fault.to_string(),
                })?;
        }
    }

    Ok(raster)
}
