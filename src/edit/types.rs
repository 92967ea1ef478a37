//! Core types for visual text edits

use serde::{Deserialize, Serialize};

use super::error::{EditError, Result};

/// Physical page size in PDF points (1/72 inch)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both sides finite and strictly positive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Rectangle in PDF user space: origin bottom-left, Y up, units in points.
///
/// `y` is the distance of the rectangle's bottom edge from the page's
/// bottom edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Rectangle in pixel space: origin top-left, Y down.
///
/// Coordinates stay fractional until [`PixelRect::snap`] aligns them to
/// the pixel grid of a concrete canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grow the rectangle by `amount` pixels on every side
    #[must_use]
    pub fn pad(&self, amount: f64) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + amount * 2.0,
            height: self.height + amount * 2.0,
        }
    }

    /// Snap outward to whole pixels and clip to a `width` x `height` canvas.
    ///
    /// Near edges are floored and far edges ceiled, so every pixel the
    /// rectangle touches is covered. Returns `None` when nothing is left
    /// after clipping.
    #[must_use]
    pub fn snap(&self, width: u32, height: u32) -> Option<PixelBounds> {
        let max_x = f64::from(width);
        let max_y = f64::from(height);

        let x0 = self.x.floor().clamp(0.0, max_x);
        let y0 = self.y.floor().clamp(0.0, max_y);
        let x1 = self.right().ceil().clamp(0.0, max_x);
        let y1 = self.bottom().ceil().clamp(0.0, max_y);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        Some(PixelBounds {
            x0: x0 as u32,
            y0: y0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }
}

/// Integer pixel bounds, half-open: `x0..x1`, `y0..y1`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// 8-bit RGB colour.
///
/// Deserializes from `[r, g, b]`, `{ r, g, b }` or `"#rrggbb"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RgbRepr", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RgbRepr {
    Triple([u8; 3]),
    Fields { r: u8, g: u8, b: u8 },
    Hex(String),
}

impl TryFrom<RgbRepr> for Rgb {
    type Error = String;

    fn try_from(repr: RgbRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            RgbRepr::Triple([r, g, b]) | RgbRepr::Fields { r, g, b } => Ok(Self::new(r, g, b)),
            RgbRepr::Hex(hex) => Self::from_hex(&hex).ok_or_else(|| format!("invalid colour {hex:?}")),
        }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(color: Rgb) -> Self {
        [color.r, color.g, color.b]
    }
}

/// One requested text replacement.
///
/// Immutable once handed to the pipeline; the pipeline only ever borrows
/// edits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextEdit {
    /// 1-based page number
    pub page_number: u32,
    /// Region to mask, in PDF user space
    pub pdf_rect: PdfRect,
    /// Text the region used to show; informational only
    #[serde(default)]
    pub original_text: String,
    /// Replacement text, one drawn line per `\n`
    pub new_text: String,
    /// Substitute typeface size in points
    pub font_size: f64,
    #[serde(default)]
    pub text_color: Rgb,
}

impl TextEdit {
    /// Lines of the replacement text in drawing order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.new_text.lines()
    }

    /// Check the edit against a document of `page_count` pages.
    ///
    /// `index` is the edit's position in the submitted list and only used
    /// for error reporting.
    pub fn validate(&self, index: usize, page_count: usize) -> Result<()> {
        let page = self.page_number as usize;
        if page == 0 || page > page_count {
            return Err(EditError::PageOutOfRange {
                page: self.page_number,
                page_count,
            });
        }

        let rect = &self.pdf_rect;
        let finite = [rect.x, rect.y, rect.width, rect.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(EditError::InvalidEdit {
                index,
                reason: format!(
                    "rectangle {}x{} at ({}, {}) must have a positive, finite size",
                    rect.width, rect.height, rect.x, rect.y
                ),
            });
        }

        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(EditError::InvalidEdit {
                index,
                reason: format!("font size {} must be positive", self.font_size),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(page_number: u32) -> TextEdit {
        TextEdit {
            page_number,
            pdf_rect: PdfRect::new(100.0, 700.0, 200.0, 50.0),
            original_text: "Hi".to_string(),
            new_text: "Hello\nWorld".to_string(),
            font_size: 12.0,
            text_color: Rgb::BLACK,
        }
    }

    #[test]
    fn snap_covers_touched_pixels() {
        let rect = PixelRect::new(1.2, 2.7, 3.0, 1.0);
        let bounds = rect.snap(100, 100).unwrap();
        assert_eq!(bounds, PixelBounds { x0: 1, y0: 2, x1: 5, y1: 4 });
    }

    #[test]
    fn snap_clips_to_canvas() {
        let rect = PixelRect::new(-5.0, 8.0, 20.0, 20.0);
        let bounds = rect.snap(10, 12).unwrap();
        assert_eq!(bounds, PixelBounds { x0: 0, y0: 8, x1: 10, y1: 12 });
    }

    #[test]
    fn snap_outside_canvas_is_none() {
        assert!(PixelRect::new(50.0, 0.0, 5.0, 5.0).snap(10, 10).is_none());
        assert!(PixelRect::new(0.0, -9.0, 5.0, 4.0).snap(10, 10).is_none());
    }

    #[test]
    fn pad_grows_every_side() {
        let padded = PixelRect::new(10.0, 10.0, 4.0, 2.0).pad(1.5);
        assert_eq!(padded, PixelRect::new(8.5, 8.5, 7.0, 5.0));
    }

    #[test]
    fn rgb_accepts_all_forms() {
        let triple: Rgb = serde_json::from_str("[1, 2, 3]").unwrap();
        let fields: Rgb = serde_json::from_str(r#"{"r": 1, "g": 2, "b": 3}"#).unwrap();
        let hex: Rgb = serde_json::from_str(r##""#010203""##).unwrap();
        assert_eq!(triple, Rgb::new(1, 2, 3));
        assert_eq!(fields, triple);
        assert_eq!(hex, triple);
        assert!(serde_json::from_str::<Rgb>(r##""#12345""##).is_err());
    }

    #[test]
    fn edit_defaults_colour_and_original_text() {
        let json = r#"{
            "page_number": 2,
            "pdf_rect": {"x": 1, "y": 2, "width": 3, "height": 4},
            "new_text": "x",
            "font_size": 10
        }"#;
        let edit: TextEdit = serde_json::from_str(json).unwrap();
        assert_eq!(edit.text_color, Rgb::BLACK);
        assert!(edit.original_text.is_empty());
    }

    #[test]
    fn lines_split_on_newlines() {
        let lines: Vec<_> = edit(1).lines().collect();
        assert_eq!(lines, vec!["Hello", "World"]);
    }

    #[test]
    fn validate_rejects_page_out_of_range() {
        assert!(matches!(
            edit(0).validate(0, 3),
            Err(EditError::PageOutOfRange { page: 0, .. })
        ));
        assert!(matches!(
            edit(4).validate(0, 3),
            Err(EditError::PageOutOfRange { page: 4, page_count: 3 })
        ));
        assert!(edit(3).validate(0, 3).is_ok());
    }

    #[test]
    fn validate_rejects_degenerate_geometry() {
        let mut flat = edit(1);
        flat.pdf_rect.height = 0.0;
        assert!(matches!(
            flat.validate(7, 1),
            Err(EditError::InvalidEdit { index: 7, .. })
        ));

        let mut tiny_font = edit(1);
        tiny_font.font_size = -1.0;
        assert!(matches!(
            tiny_font.validate(0, 1),
            Err(EditError::InvalidEdit { .. })
        ));
    }
}
