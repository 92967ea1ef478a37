//! Source document access: page geometry and rasterization

use std::path::{Path, PathBuf};

use log::{debug, trace};
use mupdf::{Colorspace, Device, Document, Matrix, Page, Pixmap};

use super::error::{EditError, Result};
use super::plan::ResolutionPlan;
use super::raster::{PageRaster, RgbSamples};
use super::types::PageSize;

/// Read-only view of the document being edited.
///
/// Page indices are 0-based here; errors carry 1-based page numbers.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Physical page size in points
    fn page_size(&mut self, index: usize) -> Result<PageSize>;

    /// Render a page onto a white canvas of exactly the planned size.
    ///
    /// The returned raster is the only page-sized buffer the call leaves
    /// behind; failing to allocate it is `ResourceExhausted`.
    fn rasterize(&mut self, index: usize, plan: &ResolutionPlan) -> Result<PageRaster>;
}

/// Source document backed by MuPDF
pub struct MupdfSource {
    path: PathBuf,
    doc: Document,
    page_count: usize,
}

impl MupdfSource {
    pub fn open(path: &Path) -> Result<Self> {
        let open_failed = |detail: String| EditError::Open {
            path: path.to_path_buf(),
            detail,
        };

        let doc = Document::open(&path.to_string_lossy()).map_err(|e| open_failed(e.to_string()))?;
        let page_count = doc.page_count().map_err(|e| open_failed(e.to_string()))?;
        let page_count = usize::try_from(page_count)
            .map_err(|_| open_failed(format!("bad page count {page_count}")))?;

        debug!("Opened {path:?} with {page_count} pages");

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            page_count,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_page(&self, index: usize) -> Result<Page> {
        let page_number = page_number(index);
        if index >= self.page_count {
            return Err(EditError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count,
            });
        }
        let index = i32::try_from(index).map_err(|e| EditError::rasterization(page_number, e))?;
        self.doc
            .load_page(index)
            .map_err(|e| EditError::rasterization(page_number, e))
    }
}

impl SourceDocument for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&mut self, index: usize) -> Result<PageSize> {
        let page = self.load_page(index)?;
        let bounds = page
            .bounds()
            .map_err(|e| EditError::rasterization(page_number(index), e))?;

        Ok(PageSize::new(
            f64::from(bounds.x1 - bounds.x0),
            f64::from(bounds.y1 - bounds.y0),
        ))
    }

    fn rasterize(&mut self, index: usize, plan: &ResolutionPlan) -> Result<PageRaster> {
        let page_number = page_number(index);

        // The canvas is the only page-sized buffer; claim it before the
        // engine does any work
        let mut raster =
            PageRaster::new_white(plan.canvas_width, plan.canvas_height).map_err(|e| {
                EditError::ResourceExhausted {
                    page: page_number,
                    width: e.width,
                    height: e.height,
                }
            })?;

        let page = self.load_page(index)?;
        let bounds = page
            .bounds()
            .map_err(|e| EditError::rasterization(page_number, e))?;

        let scale = plan.effective_scale as f32;
        // Page origin to canvas origin, then scale
        let transform = Matrix::new(
            scale,
            0.0,
            0.0,
            scale,
            -bounds.x0 * scale,
            -bounds.y0 * scale,
        );
        let width = i32::try_from(plan.canvas_width)
            .map_err(|e| EditError::rasterization(page_number, e))?;
        let bands = BandRenderer {
            page: &page,
            transform,
            rgb: Colorspace::device_rgb(),
            width,
        };

        let mut band_top = 0u32;
        while band_top < plan.canvas_height {
            let band_height = BAND_ROWS.min(plan.canvas_height - band_top);
            bands
                .render(band_top, band_height, &mut raster)
                .map_err(|fault| match fault {
                    BandFault::Allocation(e) => {
                        debug!("Page {page_number}: band pixmap allocation failed: {e}");
                        EditError::ResourceExhausted {
                            page: page_number,
                            width: plan.canvas_width,
                            height: band_height,
                        }
                    }
                    BandFault::Render(e) => EditError::rasterization(page_number, e),
                })?;
            band_top += band_height;
        }

        trace!(
            "Page {page_number}: rendered {}x{} in {} bands",
            plan.canvas_width,
            plan.canvas_height,
            plan.canvas_height.div_ceil(BAND_ROWS)
        );
        Ok(raster)
    }
}

/// Rows rendered per engine pass; bounds the engine's scratch pixmap
const BAND_ROWS: u32 = 256;

#[derive(Debug)]
enum BandFault {
    /// The engine could not allocate the band's pixmap
    Allocation(mupdf::error::Error),
    Render(String),
}

/// Renders one page into a canvas a few rows at a time
struct BandRenderer<'a> {
    page: &'a Page,
    transform: Matrix,
    rgb: Colorspace,
    width: i32,
}

impl BandRenderer<'_> {
    /// Render canvas rows `top..top + rows` and copy them into `raster`.
    ///
    /// The scratch pixmap sits at device origin `(0, top)`, so the engine
    /// clips the page to exactly this band.
    fn render(
        &self,
        top: u32,
        rows: u32,
        raster: &mut PageRaster,
    ) -> std::result::Result<(), BandFault> {
        let band_top = i32::try_from(top).map_err(|e| BandFault::Render(e.to_string()))?;
        let band_rows = i32::try_from(rows).map_err(|e| BandFault::Render(e.to_string()))?;

        let mut band = Pixmap::new(&self.rgb, 0, band_top, self.width, band_rows, false)
            .map_err(BandFault::Allocation)?;
        band.clear_with(255).map_err(|e| BandFault::Render(e.to_string()))?;
        {
            let device = Device::from_pixmap(&band).map_err(|e| BandFault::Render(e.to_string()))?;
            self.page
                .run(&device, &self.transform)
                .map_err(|e| BandFault::Render(e.to_string()))?;
        }

        let channels = band.n() as usize;
        if channels < 3 {
            return Err(BandFault::Render(format!(
                "unsupported pixmap format: {channels} channels"
            )));
        }
        raster.copy_from_rgb(
            top,
            &RgbSamples {
                samples: band.samples(),
                width: band.width(),
                height: band.height(),
                stride: band.stride() as usize,
                channels,
            },
        );
        Ok(())
    }
}

fn page_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}
