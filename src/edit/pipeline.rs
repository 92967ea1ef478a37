//! Pipeline orchestration: plan, rasterize, composite, encode and append
//! each page in order, then publish the output file.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, error, info, trace, warn};

use super::assemble::{EncodedImage, OutputDocument, check_output_name, encode_page};
use super::compositor::composite;
use super::error::{EditError, Result};
use super::plan::{PlannerConfig, ResolutionPlan, ResolutionPlanner};
use super::raster::{PageRaster, RasterResidency};
use super::source::{MupdfSource, SourceDocument};
use super::text::{MupdfTextPainter, TextPainter};
use super::types::{PageSize, TextEdit};

/// Where a run currently is. Per-page stages carry the 1-based page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Init,
    PlanResolution { page: u32 },
    Rasterize { page: u32 },
    Composite { page: u32 },
    Encode { page: u32 },
    Append { page: u32 },
    Finalize,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::PlanResolution { page } => write!(f, "plan page {page}"),
            Stage::Rasterize { page } => write!(f, "rasterize page {page}"),
            Stage::Composite { page } => write!(f, "composite page {page}"),
            Stage::Encode { page } => write!(f, "encode page {page}"),
            Stage::Append { page } => write!(f, "append page {page}"),
            Stage::Finalize => write!(f, "finalize"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

/// What to do when a page raster cannot be allocated
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AllocationPolicy {
    /// Abort the run with `ResourceExhausted`
    #[default]
    FailFast,
    /// Re-plan the page at half the density, never going below `min_density`
    Downgrade { min_density: f64 },
}

#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub planner: PlannerConfig,
    pub allocation: AllocationPolicy,
    /// Save every composited page as PNG here before encoding
    pub dump_dir: Option<PathBuf>,
}

/// Summary of a successful run
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub output: PathBuf,
    pub pages: usize,
    pub edits_applied: usize,
    /// Pages whose canvas was shrunk by the dimension ceiling
    pub reduced_pages: Vec<u32>,
    /// Pages re-planned at a lower density after an allocation failure
    pub downgraded_pages: Vec<u32>,
    pub peak_resident_rasters: usize,
}

/// One page, ready to append
struct PageOutput {
    size: PageSize,
    image: EncodedImage,
    reduced: bool,
    downgraded: bool,
}

/// Single-use edit pipeline over any [`SourceDocument`]
pub struct Pipeline {
    options: PipelineOptions,
    residency: RasterResidency,
    stage: Stage,
}

impl Pipeline {
    #[must_use]
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            residency: RasterResidency::new(),
            stage: Stage::Init,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Counters of the page rasters this pipeline holds
    #[must_use]
    pub fn residency(&self) -> &RasterResidency {
        &self.residency
    }

    /// Run every page of `source` through the pipeline and write the result
    /// to `out_dir/file_name`.
    ///
    /// On error nothing is written to `out_dir`.
    pub fn run(
        &mut self,
        source: &mut dyn SourceDocument,
        painter: &mut dyn TextPainter,
        edits: &[TextEdit],
        out_dir: &Path,
        file_name: &str,
    ) -> Result<RunReport> {
        let result = self.run_pages(source, painter, edits, out_dir, file_name);
        match &result {
            Ok(report) => {
                self.enter(Stage::Done);
                info!(
                    "Edited {} pages ({} edits) into {}",
                    report.pages,
                    report.edits_applied,
                    report.output.display()
                );
            }
            Err(e) => {
                error!("Pipeline failed during {}: {e}", self.stage);
                self.enter(Stage::Failed);
            }
        }
        result
    }

    fn run_pages(
        &mut self,
        source: &mut dyn SourceDocument,
        painter: &mut dyn TextPainter,
        edits: &[TextEdit],
        out_dir: &Path,
        file_name: &str,
    ) -> Result<RunReport> {
        self.enter(Stage::Init);
        let planner = ResolutionPlanner::new(self.options.planner)?;
        if let AllocationPolicy::Downgrade { min_density } = self.options.allocation {
            if !(min_density.is_finite() && min_density > 0.0) {
                return Err(EditError::InvalidConfig(format!(
                    "minimum density must be positive, got {min_density}"
                )));
            }
        }

        // Reject bad targets before any page work
        check_output_name(file_name)?;
        if !out_dir.is_dir() {
            return Err(EditError::OutputDirMissing(out_dir.to_path_buf()));
        }

        let page_count = source.page_count();
        let by_page = group_by_page(edits, page_count)?;
        debug!("{page_count} pages, {} edits", edits.len());

        let mut output = OutputDocument::new();
        let mut reduced_pages = Vec::new();
        let mut downgraded_pages = Vec::new();

        for (index, page_edits) in by_page.iter().enumerate() {
            let page = page_number(index);
            let done = self.process_page(source, painter, &planner, index, page_edits)?;

            self.enter(Stage::Append { page });
            if done.reduced {
                reduced_pages.push(page);
            }
            if done.downgraded {
                downgraded_pages.push(page);
            }
            output.add_page(done.size, done.image);
        }

        self.enter(Stage::Finalize);
        let pages = output.page_count();
        let path = output.finalize(out_dir, file_name)?;

        Ok(RunReport {
            output: path,
            pages,
            edits_applied: edits.len(),
            reduced_pages,
            downgraded_pages,
            peak_resident_rasters: self.residency.peak(),
        })
    }

    fn process_page(
        &mut self,
        source: &mut dyn SourceDocument,
        painter: &mut dyn TextPainter,
        planner: &ResolutionPlanner,
        index: usize,
        edits: &[&TextEdit],
    ) -> Result<PageOutput> {
        let page = page_number(index);

        self.enter(Stage::PlanResolution { page });
        let size = source.page_size(index)?;
        let (plan, raster, downgraded) = self.rasterize(source, planner, index, size)?;
        let raster = self.residency.track(raster);
        if plan.reduced {
            debug!(
                "Page {page}: canvas reduced to {}x{} (scale {:.3})",
                plan.canvas_width, plan.canvas_height, plan.effective_scale
            );
        }

        self.enter(Stage::Composite { page });
        let raster = composite(raster, size.height, plan.effective_scale, edits, painter)?;
        self.dump(page, &raster);

        self.enter(Stage::Encode { page });
        let image = encode_page(&raster).map_err(|source| EditError::EncodingFailed { page, source })?;
        drop(raster);

        Ok(PageOutput {
            size,
            image,
            reduced: plan.reduced,
            downgraded,
        })
    }

    /// Rasterize one page, re-planning at lower densities when the policy
    /// allows it
    fn rasterize(
        &mut self,
        source: &mut dyn SourceDocument,
        planner: &ResolutionPlanner,
        index: usize,
        size: PageSize,
    ) -> Result<(ResolutionPlan, PageRaster, bool)> {
        let page = page_number(index);
        let mut planner = planner.clone();
        let mut downgraded = false;

        loop {
            let plan = planner.plan(page, size)?;
            self.enter(Stage::Rasterize { page });

            let err = match source.rasterize(index, &plan) {
                Ok(raster) => return Ok((plan, raster, downgraded)),
                Err(err) => err,
            };

            let min_density = match self.options.allocation {
                AllocationPolicy::Downgrade { min_density } if matches!(err, EditError::ResourceExhausted { .. }) => {
                    min_density
                }
                _ => return Err(err),
            };

            let density = planner.config().target_density;
            if density <= min_density {
                return Err(err);
            }
            let next = (density / 2.0).max(min_density);
            warn!(
                "Page {page}: cannot allocate {}x{} raster at {density} dpi, retrying at {next} dpi",
                plan.canvas_width, plan.canvas_height
            );
            planner = planner.with_density(next)?;
            downgraded = true;
        }
    }

    fn dump(&self, page: u32, raster: &PageRaster) {
        let Some(dir) = &self.options.dump_dir else {
            return;
        };
        let path = dir.join(format!("page-{page:04}.png"));
        match image::save_buffer(
            &path,
            raster.samples(),
            raster.width(),
            raster.height(),
            image::ColorType::Rgba8,
        ) {
            Ok(()) => debug!("Saved raster dump {}", path.display()),
            Err(e) => warn!("Failed to save raster dump {}: {e}", path.display()),
        }
    }

    fn enter(&mut self, stage: Stage) {
        trace!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }
}

/// Validate `edits` and bucket them per page, keeping submission order
/// within each page
fn group_by_page(edits: &[TextEdit], page_count: usize) -> Result<Vec<Vec<&TextEdit>>> {
    let mut by_page: Vec<Vec<&TextEdit>> = vec![Vec::new(); page_count];
    for (index, edit) in edits.iter().enumerate() {
        edit.validate(index, page_count)?;
        by_page[edit.page_number as usize - 1].push(edit);
    }
    Ok(by_page)
}

fn page_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Apply `edits` to the PDF at `source` and write the result to
/// `out_dir/file_name`
pub fn apply_edits(
    source: &Path,
    out_dir: &Path,
    file_name: &str,
    edits: &[TextEdit],
    options: &PipelineOptions,
) -> Result<RunReport> {
    info!("Applying {} edits to {}", edits.len(), source.display());
    let mut document = MupdfSource::open(source)?;
    let mut painter = MupdfTextPainter::new();
    Pipeline::new(options.clone()).run(&mut document, &mut painter, edits, out_dir, file_name)
}

/// Re-render every page of `source` without edits.
///
/// Exercises rasterization and reassembly on their own.
pub fn raster_copy(source: &Path, out_dir: &Path, file_name: &str, options: &PipelineOptions) -> Result<RunReport> {
    apply_edits(source, out_dir, file_name, &[], options)
}

/// Physical size of one page (1-based) in points
pub fn page_dimensions(source: &Path, page_number: u32) -> Result<PageSize> {
    let mut document = MupdfSource::open(source)?;
    let page_count = document.page_count();
    if page_number == 0 || page_number as usize > page_count {
        return Err(EditError::PageOutOfRange { page: page_number, page_count });
    }
    document.page_size(page_number as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::types::{PdfRect, Rgb};
    use crate::test_utils::test_helpers::{BlockPainter, FakeSource};
    use tempfile::TempDir;

    fn edit(page: u32) -> TextEdit {
        TextEdit {
            page_number: page,
            pdf_rect: PdfRect::new(10.0, 10.0, 50.0, 20.0),
            original_text: "old".to_string(),
            new_text: "new".to_string(),
            font_size: 10.0,
            text_color: Rgb::BLACK,
        }
    }

    fn small_options() -> PipelineOptions {
        PipelineOptions {
            planner: PlannerConfig {
                target_density: 72.0,
                max_dimension: 4096,
            },
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn stages_end_in_done() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(2, PageSize::new(100.0, 50.0));
        let mut pipeline = Pipeline::new(small_options());

        let report = pipeline
            .run(&mut source, &mut BlockPainter::default(), &[edit(2)], dir.path(), "out.pdf")
            .unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(report.pages, 2);
        assert_eq!(report.edits_applied, 1);
        assert!(report.reduced_pages.is_empty());
    }

    #[test]
    fn edits_are_checked_before_rasterizing() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(2, PageSize::new(100.0, 50.0));
        let mut pipeline = Pipeline::new(small_options());

        let err = pipeline
            .run(&mut source, &mut BlockPainter::default(), &[edit(3)], dir.path(), "out.pdf")
            .unwrap_err();

        assert!(matches!(err, EditError::PageOutOfRange { page: 3, page_count: 2 }));
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert!(source.rasterized.is_empty());
    }

    #[test]
    fn grouping_keeps_submission_order() {
        let mut a = edit(1);
        a.new_text = "a".into();
        let mut b = edit(2);
        b.new_text = "b".into();
        let mut c = edit(1);
        c.new_text = "c".into();
        let edits = vec![a, b, c];

        let grouped = group_by_page(&edits, 2).unwrap();
        let page_one: Vec<_> = grouped[0].iter().map(|e| e.new_text.as_str()).collect();
        assert_eq!(page_one, ["a", "c"]);
        assert_eq!(grouped[1].len(), 1);
    }

    #[test]
    fn oversized_page_is_reported_as_reduced() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(1, PageSize::new(100.0, 50.0));
        let options = PipelineOptions {
            planner: PlannerConfig {
                target_density: 72.0,
                max_dimension: 40,
            },
            ..PipelineOptions::default()
        };

        let report = Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], dir.path(), "out.pdf")
            .unwrap();

        assert_eq!(report.reduced_pages, vec![1]);
        assert_eq!(source.rasterized[0].canvas_width, 40);
        assert_eq!(source.rasterized[0].canvas_height, 20);
    }

    #[test]
    fn fail_fast_on_allocation_failure() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(1, PageSize::new(100.0, 100.0));
        source.max_pixels = Some(100);

        let err = Pipeline::new(small_options())
            .run(&mut source, &mut BlockPainter::default(), &[], dir.path(), "out.pdf")
            .unwrap_err();

        assert!(matches!(err, EditError::ResourceExhausted { page: 1, width: 100, height: 100 }));
        assert_eq!(source.rasterized.len(), 1);
    }

    #[test]
    fn downgrade_halves_density_until_it_fits() {
        let dir = TempDir::new().unwrap();
        // 72 pt page: 300 dpi is 300 px, 150 dpi is 150 px, 75 dpi is 75 px
        let mut source = FakeSource::uniform(1, PageSize::new(72.0, 72.0));
        source.max_pixels = Some(100 * 100);
        let options = PipelineOptions {
            allocation: AllocationPolicy::Downgrade { min_density: 50.0 },
            ..PipelineOptions::default()
        };

        let report = Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], dir.path(), "out.pdf")
            .unwrap();

        let widths: Vec<_> = source.rasterized.iter().map(|p| p.canvas_width).collect();
        assert_eq!(widths, [300, 150, 75]);
        assert_eq!(report.downgraded_pages, vec![1]);
    }

    #[test]
    fn downgrade_stops_at_minimum_density() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(1, PageSize::new(72.0, 72.0));
        source.max_pixels = Some(10);
        let options = PipelineOptions {
            allocation: AllocationPolicy::Downgrade { min_density: 100.0 },
            ..PipelineOptions::default()
        };

        let err = Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], dir.path(), "out.pdf")
            .unwrap_err();

        let densities: Vec<_> = source.rasterized.iter().map(|p| p.target_density).collect();
        assert_eq!(densities, [300.0, 150.0, 100.0]);
        assert!(matches!(err, EditError::ResourceExhausted { page: 1, .. }));
    }

    #[test]
    fn dumps_composited_pages_as_png() {
        let out = TempDir::new().unwrap();
        let dumps = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(2, PageSize::new(20.0, 10.0));
        let options = PipelineOptions {
            dump_dir: Some(dumps.path().to_path_buf()),
            ..small_options()
        };

        Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], out.path(), "out.pdf")
            .unwrap();

        assert!(dumps.path().join("page-0001.png").is_file());
        assert!(dumps.path().join("page-0002.png").is_file());
    }

    #[test]
    fn dump_failure_does_not_fail_the_run() {
        let out = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(1, PageSize::new(20.0, 10.0));
        let options = PipelineOptions {
            dump_dir: Some(out.path().join("missing")),
            ..small_options()
        };

        let report = Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], out.path(), "out.pdf")
            .unwrap();
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn invalid_minimum_density_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::uniform(1, PageSize::new(20.0, 10.0));
        let options = PipelineOptions {
            allocation: AllocationPolicy::Downgrade { min_density: 0.0 },
            ..PipelineOptions::default()
        };

        let err = Pipeline::new(options)
            .run(&mut source, &mut BlockPainter::default(), &[], dir.path(), "out.pdf")
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidConfig(_)));
    }
}
