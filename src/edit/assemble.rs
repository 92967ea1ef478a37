//! Page reassembly: composited rasters back into PDF pages.
//!
//! Each output page is a single full-bleed image whose MediaBox is the
//! source page's physical size, so viewers show it at the original scale no
//! matter how many pixels the raster had.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::{debug, info};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use tempfile::NamedTempFile;

use super::error::{EditError, Result};
use super::raster::PageRaster;
use super::types::PageSize;

const IMAGE_NAME: &[u8] = b"Im0";

/// Lossless, zlib-compressed RGB pixels of one page
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    /// FlateDecode stream data
    pub data: Vec<u8>,
}

/// Compress the raster's RGB channels. Alpha is opaque and dropped.
pub fn encode_page(raster: &PageRaster) -> std::io::Result<EncodedImage> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    let mut row_rgb = Vec::with_capacity(raster.width() as usize * 3);

    for row in raster.rows() {
        row_rgb.clear();
        for px in row.chunks_exact(4) {
            row_rgb.extend_from_slice(&px[..3]);
        }
        encoder.write_all(&row_rgb)?;
    }

    Ok(EncodedImage {
        width: raster.width(),
        height: raster.height(),
        data: encoder.finish()?,
    })
}

/// Hands out object numbers for the output file
struct RefAllocator {
    next: i32,
}

impl RefAllocator {
    fn new(start: i32) -> Self {
        Self { next: start }
    }

    fn alloc(&mut self) -> Ref {
        let r = Ref::new(self.next);
        self.next += 1;
        r
    }
}

/// Output PDF under construction.
///
/// Pages are appended in order. [`OutputDocument::finalize`] consumes the
/// document; dropping it instead discards everything written so far.
pub struct OutputDocument {
    pdf: Pdf,
    refs: RefAllocator,
    catalog_id: Ref,
    pages_id: Ref,
    page_ids: Vec<Ref>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    #[must_use]
    pub fn new() -> Self {
        let mut refs = RefAllocator::new(1);
        let catalog_id = refs.alloc();
        let pages_id = refs.alloc();

        Self {
            pdf: Pdf::new(),
            refs,
            catalog_id,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page of exactly `size` points covered by `image`
    pub fn add_page(&mut self, size: PageSize, image: EncodedImage) {
        let page_id = self.refs.alloc();
        let image_id = self.refs.alloc();
        let content_id = self.refs.alloc();

        // Source sizes come from f32 engine geometry, so this is lossless
        let width = size.width as f32;
        let height = size.height as f32;

        let mut xobj = self.pdf.image_xobject(image_id, &image.data);
        xobj.filter(Filter::FlateDecode);
        xobj.width(image.width as i32);
        xobj.height(image.height as i32);
        xobj.color_space().device_rgb();
        xobj.bits_per_component(8);
        xobj.finish();

        // Unit square scaled to the full page, no offset
        let mut content = Content::new();
        content.save_state();
        content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
        content.x_object(Name(IMAGE_NAME));
        content.restore_state();
        let content = content.finish();
        self.pdf.stream(content_id, content.as_slice());

        let mut page = self.pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, width, height))
            .parent(self.pages_id)
            .contents(content_id);
        page.resources().x_objects().pair(Name(IMAGE_NAME), image_id);
        page.finish();

        self.page_ids.push(page_id);
    }

    /// Serialize the document with its page tree
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        let count = self.page_ids.len() as i32;
        self.pdf
            .pages(self.pages_id)
            .kids(self.page_ids.iter().copied())
            .count(count);
        self.pdf.finish()
    }

    /// Write the document to `dir/file_name`.
    ///
    /// The bytes go to a temporary file in `dir` first and are renamed into
    /// place, so the target either appears complete or not at all.
    pub fn finalize(self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        check_output_name(file_name)?;
        if !dir.is_dir() {
            return Err(EditError::OutputDirMissing(dir.to_path_buf()));
        }

        let pages = self.page_count();
        let bytes = self.finish();

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        debug!("Staged {} bytes at {:?}", bytes.len(), staged.path());

        let target = dir.join(file_name);
        staged.persist(&target).map_err(|e| EditError::Io(e.error))?;

        info!("Wrote {pages} pages to {}", target.display());
        Ok(target)
    }
}

/// The output name must be a plain file name inside the output directory
pub fn check_output_name(file_name: &str) -> Result<()> {
    let path = Path::new(file_name);
    let plain = path.file_name().is_some_and(|name| name == path.as_os_str());
    if file_name.is_empty() || !plain || file_name == "." || file_name == ".." {
        return Err(EditError::InvalidOutputName(file_name.to_string()));
    }
    Ok(())
}
