pub mod edit;
pub mod filename;
pub mod panic_handler;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use edit::{
    EditError, PageSize, PdfRect, PipelineOptions, Rgb, RunReport, TextEdit, apply_edits,
    load_edits, page_dimensions, raster_copy,
};
