//! Non-destructive visual text edits on PDF pages.
//!
//! Every page is rendered to a raster, edited regions are masked and
//! re-lettered, and the pages are reassembled into a new image-only PDF.
//! The source file is never written to.

pub mod assemble;
pub mod compositor;
pub mod edits_file;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod raster;
pub mod source;
pub mod text;
pub mod transform;
pub mod types;

pub use edits_file::load_edits;
pub use error::{EditError, Result};
pub use pipeline::{
    AllocationPolicy, Pipeline, PipelineOptions, RunReport, Stage, apply_edits, page_dimensions,
    raster_copy,
};
pub use plan::{PlannerConfig, ResolutionPlan, ResolutionPlanner};
pub use raster::{CoverageMask, PageRaster, RasterResidency, RgbSamples};
pub use source::{MupdfSource, SourceDocument};
pub use text::{MupdfTextPainter, TextPainter, TextRun};
pub use types::{PageSize, PdfRect, PixelRect, Rgb, TextEdit};
