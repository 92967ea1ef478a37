use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::edit::error::{EditError, Result};
use crate::edit::pipeline::{AllocationPolicy, PipelineOptions};
use crate::edit::plan::{DEFAULT_MAX_DIMENSION, DEFAULT_TARGET_DENSITY, PlannerConfig};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdf-retext";

/// How the pipeline reacts when a page canvas cannot be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Abort the run
    #[default]
    FailFast,
    /// Retry the page at lower densities, down to `min_density`
    Downgrade,
}

impl AllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMode::FailFast => "fail_fast",
            AllocationMode::Downgrade => "downgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_target_density")]
    pub target_density: f64,

    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    #[serde(default)]
    pub allocation_policy: AllocationMode,

    #[serde(default = "default_min_density")]
    pub min_density: f64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for PNG dumps of composited pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_rasters: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_target_density() -> f64 {
    DEFAULT_TARGET_DENSITY
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_min_density() -> f64 {
    72.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            target_density: default_target_density(),
            max_dimension: default_max_dimension(),
            allocation_policy: AllocationMode::default(),
            min_density: default_min_density(),
            log_level: default_log_level(),
            keep_rasters: None,
        }
    }
}

impl Settings {
    /// Log level from the settings; unknown names fall back to `info`
    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let allocation = match self.allocation_policy {
            AllocationMode::FailFast => AllocationPolicy::FailFast,
            AllocationMode::Downgrade => AllocationPolicy::Downgrade {
                min_density: self.min_density,
            },
        };

        PipelineOptions {
            planner: PlannerConfig {
                target_density: self.target_density,
                max_dimension: self.max_dimension,
            },
            allocation,
            dump_dir: self.keep_rasters.clone(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `explicit`, or from the default location.
///
/// An explicit path must exist. A missing default file is created with the
/// defaults so users have something to edit.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings_from_path(path);
    }

    let Some(path) = default_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Ok(Settings::default());
    };

    if path.exists() {
        load_settings_from_path(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        Ok(settings)
    }
}

pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .map_err(|e| EditError::InvalidConfig(format!("failed to read {path:?}: {e}")))?;

    let mut settings = serde_yaml::from_str::<Settings>(&content)
        .map_err(|e| EditError::InvalidConfig(format!("failed to parse {path:?}: {e}")))?;
    debug!("Loaded settings from {path:?}");

    if settings.version < CURRENT_VERSION {
        migrate_settings(&mut settings);
        save_settings_to_file(&settings, path);
    }

    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Version 0 files predate the dimension ceiling and may carry a zero
    if settings.max_dimension == 0 {
        settings.max_dimension = default_max_dimension();
    }

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);
    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Pixels per inch used to render each page\n");
    content.push_str(&format!("target_density: {:?}\n", settings.target_density));
    content.push_str("# Largest allowed canvas side in pixels\n");
    content.push_str(&format!("max_dimension: {}\n", settings.max_dimension));
    content.push('\n');
    content.push_str(ALLOCATION_TEMPLATE);
    content.push_str(&format!(
        "allocation_policy: {}\n",
        settings.allocation_policy.as_str()
    ));
    content.push_str(&format!("min_density: {:?}\n", settings.min_density));
    content.push('\n');
    content.push_str("# off, error, warn, info, debug or trace\n");
    content.push_str(&format!("log_level: \"{}\"\n", settings.log_level));

    match &settings.keep_rasters {
        Some(dir) => {
            content.push_str("# Save every composited page as PNG here\n");
            content.push_str(&format!("keep_rasters: {:?}\n", dir.display().to_string()));
        }
        None => content.push_str("# keep_rasters: \"/tmp/pdf-retext-pages\"\n"),
    }

    content
}

const ALLOCATION_TEMPLATE: &str = r#"# When a page canvas cannot be allocated:
#   fail_fast - stop with an error (default)
#   downgrade - halve the density and retry, never below min_density
"#;
