//! Coordinate space mapping between PDF user space and raster pixels.
//!
//! PDF user space has its origin at the bottom-left of the page, Y pointing
//! up, measured in points. A rendered raster has its origin at the top-left,
//! Y pointing down, measured in pixels. `scale` is pixels per point.
//!
//! No rounding happens here; callers snap to the pixel grid when painting.

use super::types::{PdfRect, PixelRect};

/// Map a PDF-space point to pixel space
#[must_use]
pub fn to_pixel(pdf_x: f64, pdf_y: f64, page_height: f64, scale: f64) -> (f64, f64) {
    (pdf_x * scale, (page_height - pdf_y) * scale)
}

/// Map a pixel-space point back to PDF space
#[must_use]
pub fn to_pdf(pixel_x: f64, pixel_y: f64, page_height: f64, scale: f64) -> (f64, f64) {
    (pixel_x / scale, page_height - pixel_y / scale)
}

/// Map a PDF-space rectangle to pixel space.
///
/// The rectangle's top edge in PDF space (`y + height`) becomes the top edge
/// in pixel space, so the result starts at `(page_height - y - height) * scale`.
#[must_use]
pub fn rect_to_pixel(rect: &PdfRect, page_height: f64, scale: f64) -> PixelRect {
    let (left, top) = to_pixel(rect.x, rect.y + rect.height, page_height, scale);
    PixelRect::new(left, top, rect.width * scale, rect.height * scale)
}

/// Map a pixel-space rectangle back to PDF space
#[must_use]
pub fn rect_to_pdf(rect: &PixelRect, page_height: f64, scale: f64) -> PdfRect {
    let (x, y) = to_pdf(rect.x, rect.bottom(), page_height, scale);
    PdfRect::new(x, y, rect.width / scale, rect.height / scale)
}
