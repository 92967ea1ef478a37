pub mod test_helpers {
    use crate::edit::error::{EditError, Result};
    use crate::edit::plan::ResolutionPlan;
    use crate::edit::raster::{PageRaster, RasterResidency};
    use crate::edit::source::SourceDocument;
    use crate::edit::text::{PaintFault, TextPainter, TextRun};
    use crate::edit::transform::rect_to_pixel;
    use crate::edit::types::{PageSize, PdfRect, PixelRect, Rgb, TextEdit};

    /// Glyph box width relative to the pixel size
    const BLOCK_ADVANCE_EM: f64 = 0.5;
    /// Glyph box height above the baseline relative to the pixel size
    const BLOCK_ASCENT_EM: f64 = 0.7;

    /// A line the [`BlockPainter`] was asked to draw
    #[derive(Clone, Debug, PartialEq)]
    pub struct RecordedRun {
        pub text: String,
        pub origin_x: f64,
        pub baseline_y: f64,
        pub pixel_size: f64,
        pub color: Rgb,
    }

    /// Painter that draws every glyph as a solid block and records the runs.
    ///
    /// Deterministic stand-in for a font renderer.
    #[derive(Debug, Default)]
    pub struct BlockPainter {
        pub runs: Vec<RecordedRun>,
    }

    impl TextPainter for BlockPainter {
        fn draw_line(&mut self, raster: &mut PageRaster, run: &TextRun<'_>) -> std::result::Result<(), PaintFault> {
            self.runs.push(RecordedRun {
                text: run.text.to_string(),
                origin_x: run.origin_x,
                baseline_y: run.baseline_y,
                pixel_size: run.pixel_size,
                color: run.color,
            });

            let glyphs = run.text.chars().count() as f64;
            let block = PixelRect::new(
                run.origin_x,
                run.baseline_y - run.pixel_size * BLOCK_ASCENT_EM,
                glyphs * run.pixel_size * BLOCK_ADVANCE_EM,
                run.pixel_size * BLOCK_ASCENT_EM,
            );
            if let Some(bounds) = block.snap(raster.width(), raster.height()) {
                raster.fill_rect(bounds, run.color);
            }
            Ok(())
        }
    }

    /// Painter that refuses every run
    #[derive(Debug, Default)]
    pub struct FailingPainter;

    impl TextPainter for FailingPainter {
        fn draw_line(&mut self, _raster: &mut PageRaster, run: &TextRun<'_>) -> std::result::Result<(), PaintFault> {
            Err(PaintFault::generic(format!("cannot draw {:?}", run.text)))
        }
    }

    /// In-memory document of blank pages.
    ///
    /// Records every rasterization request and can be told to fail on a
    /// page or to refuse large canvases.
    #[derive(Debug, Default)]
    pub struct FakeSource {
        pub pages: Vec<PageSize>,
        /// 0-based page whose rasterization fails
        pub fail_on: Option<usize>,
        /// Largest canvas, in pixels, that can be allocated
        pub max_pixels: Option<u64>,
        /// Pre-existing content painted onto pages: (0-based page, rect, colour)
        pub ink: Vec<(usize, PdfRect, Rgb)>,
        /// Plans received, in call order
        pub rasterized: Vec<ResolutionPlan>,
        /// When set, the live raster count observed at each rasterize call
        pub residency: Option<RasterResidency>,
        pub live_at_rasterize: Vec<usize>,
    }

    impl FakeSource {
        pub fn new(pages: Vec<PageSize>) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }

        pub fn uniform(count: usize, size: PageSize) -> Self {
            Self::new(vec![size; count])
        }

        pub fn with_ink(mut self, page_index: usize, rect: PdfRect, color: Rgb) -> Self {
            self.ink.push((page_index, rect, color));
            self
        }

        pub fn observe(mut self, residency: &RasterResidency) -> Self {
            self.residency = Some(residency.clone());
            self
        }
    }

    impl SourceDocument for FakeSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&mut self, index: usize) -> Result<PageSize> {
            self.pages
                .get(index)
                .copied()
                .ok_or_else(|| EditError::rasterization(index as u32 + 1, "no such page"))
        }

        fn rasterize(&mut self, index: usize, plan: &ResolutionPlan) -> Result<PageRaster> {
            let page = index as u32 + 1;
            self.rasterized.push(*plan);
            if let Some(residency) = &self.residency {
                self.live_at_rasterize.push(residency.live());
            }

            if self.fail_on == Some(index) {
                return Err(EditError::rasterization(page, "simulated engine failure"));
            }
            let pixels = u64::from(plan.canvas_width) * u64::from(plan.canvas_height);
            if self.max_pixels.is_some_and(|max| pixels > max) {
                return Err(EditError::ResourceExhausted {
                    page,
                    width: plan.canvas_width,
                    height: plan.canvas_height,
                });
            }

            let size = self.page_size(index)?;
            let mut raster = PageRaster::new_white(plan.canvas_width, plan.canvas_height).map_err(|e| {
                EditError::ResourceExhausted {
                    page,
                    width: e.width,
                    height: e.height,
                }
            })?;
            for (_, rect, color) in self.ink.iter().filter(|(p, _, _)| *p == index) {
                let area = rect_to_pixel(rect, size.height, plan.effective_scale);
                if let Some(bounds) = area.snap(raster.width(), raster.height()) {
                    raster.fill_rect(bounds, *color);
                }
            }
            Ok(raster)
        }
    }

    /// Edit with a 10 pt black replacement
    pub fn text_edit(page_number: u32, rect: PdfRect, new_text: &str) -> TextEdit {
        TextEdit {
            page_number,
            pdf_rect: rect,
            original_text: String::new(),
            new_text: new_text.to_string(),
            font_size: 10.0,
            text_color: Rgb::BLACK,
        }
    }
}
