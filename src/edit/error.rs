//! Errors surfaced by the edit pipeline

use std::path::PathBuf;

/// Terminal failure of a pipeline run.
///
/// Page numbers are 1-based wherever they appear.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("page {page} has invalid geometry {width}x{height} pt")]
    InvalidPageGeometry { page: u32, width: f64, height: f64 },

    #[error("failed to rasterize page {page}: {detail}")]
    RasterizationFailed { page: u32, detail: String },

    #[error("failed to encode page {page}")]
    EncodingFailed {
        page: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot allocate a {width}x{height} raster for page {page}")]
    ResourceExhausted { page: u32, width: u32, height: u32 },

    #[error("edit targets page {page} but the document has {page_count} pages")]
    PageOutOfRange { page: u32, page_count: usize },

    #[error("edit #{index} is invalid: {reason}")]
    InvalidEdit { index: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to draw replacement text on page {page}: {detail}")]
    TextRendering { page: u32, detail: String },

    #[error("failed to open {path:?}: {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("failed to read edit list {path:?}: {detail}")]
    EditList { path: PathBuf, detail: String },

    #[error("output directory {0:?} does not exist")]
    OutputDirMissing(PathBuf),

    #[error("invalid output file name {0:?}")]
    InvalidOutputName(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl EditError {
    /// Page the failure is attributed to, if any
    #[must_use]
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::InvalidPageGeometry { page, .. }
            | Self::RasterizationFailed { page, .. }
            | Self::EncodingFailed { page, .. }
            | Self::ResourceExhausted { page, .. }
            | Self::PageOutOfRange { page, .. }
            | Self::TextRendering { page, .. } => Some(*page),
            _ => None,
        }
    }

    pub(crate) fn rasterization(page: u32, detail: impl ToString) -> Self {
        Self::RasterizationFailed {
            page,
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
