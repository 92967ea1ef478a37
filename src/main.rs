use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error, info};
use simplelog::{Config, WriteLogger};

use pdf_retext::edit::{self, PipelineOptions, RunReport, SourceDocument};
use pdf_retext::filename::default_output_name;
use pdf_retext::panic_handler;
use pdf_retext::settings::{self, Settings};

const DEFAULT_LOG_FILE: &str = "pdf-retext.log";

#[derive(Parser, Debug)]
#[command(name = "pdf-retext", version, about = "Replace text in PDF pages by re-rendering them")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Render density in pixels per inch
    #[arg(long, global = true)]
    density: Option<f64>,

    /// Largest canvas side in pixels
    #[arg(long, global = true)]
    max_dimension: Option<u32>,

    /// Log file path
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log at debug level regardless of settings
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply an edit list to a PDF
    Edit {
        #[command(flatten)]
        target: Target,

        /// JSON or YAML edit list
        #[arg(long)]
        edits: PathBuf,
    },
    /// Re-render a PDF without edits
    Copy {
        #[command(flatten)]
        target: Target,
    },
    /// Print page sizes in points
    Size {
        source: PathBuf,

        /// 1-based page; all pages when omitted
        #[arg(long)]
        page: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct Target {
    source: PathBuf,

    /// Output directory (defaults to the source's directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Output file name (defaults to `<stem>-edited.pdf`)
    #[arg(long)]
    name: Option<String>,
}

impl Target {
    fn out_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| {
            self.source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        })
    }

    fn file_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_output_name(&self.source))
    }
}

fn main() {
    if let Err(e) = run() {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings = settings::load_settings(cli.config.as_deref()).context("failed to load settings")?;
    init_logging(&cli, &settings)?;
    panic_handler::initialize_panic_handler();

    info!("Starting pdf-retext {}", env!("CARGO_PKG_VERSION"));

    let options = pipeline_options(&cli, &settings);

    match &cli.command {
        Command::Edit { target, edits } => {
            let edits = edit::load_edits(edits).context("failed to load edits")?;
            let report = edit::apply_edits(
                &target.source,
                &target.out_dir(),
                &target.file_name(),
                &edits,
                &options,
            )
            .with_context(|| format!("failed to edit {}", target.source.display()))?;
            print_report(&report);
        }
        Command::Copy { target } => {
            let report = edit::raster_copy(&target.source, &target.out_dir(), &target.file_name(), &options)
                .with_context(|| format!("failed to copy {}", target.source.display()))?;
            print_report(&report);
        }
        Command::Size { source, page } => print_sizes(source, *page)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        settings.log_level_filter()
    };
    let path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

    let file = File::create(&path).with_context(|| format!("failed to create log file {}", path.display()))?;
    WriteLogger::init(level, Config::default(), file).context("failed to initialize logging")?;
    Ok(())
}

/// Settings first, command-line overrides on top
fn pipeline_options(cli: &Cli, settings: &Settings) -> PipelineOptions {
    let mut options = settings.pipeline_options();
    if let Some(density) = cli.density {
        options.planner.target_density = density;
    }
    if let Some(max_dimension) = cli.max_dimension {
        options.planner.max_dimension = max_dimension;
    }
    options
}

fn print_report(report: &RunReport) {
    println!(
        "Wrote {} ({} pages, {} edits)",
        report.output.display(),
        report.pages,
        report.edits_applied
    );
    if !report.reduced_pages.is_empty() {
        println!("Pages rendered below the requested density: {:?}", report.reduced_pages);
    }
    if !report.downgraded_pages.is_empty() {
        println!("Pages downgraded after allocation failures: {:?}", report.downgraded_pages);
    }
}

fn print_sizes(source: &Path, page: Option<u32>) -> Result<()> {
    if let Some(page) = page {
        let size = edit::page_dimensions(source, page)
            .with_context(|| format!("failed to read page {page} of {}", source.display()))?;
        println!("{} x {}", size.width, size.height);
        return Ok(());
    }

    let mut document = edit::MupdfSource::open(source)?;
    for index in 0..document.page_count() {
        let size = document.page_size(index)?;
        println!("page {}: {} x {}", index + 1, size.width, size.height);
    }
    Ok(())
}
