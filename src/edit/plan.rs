//! Resolution planning: how many pixels a page gets.
//!
//! The planner turns a page's physical size into a canvas size and a scale
//! factor. A hard ceiling on either canvas side bounds the size of the one
//! page buffer the pipeline keeps resident.

use serde::{Deserialize, Serialize};

use super::error::{EditError, Result};
use super::types::PageSize;

pub const POINTS_PER_INCH: f64 = 72.0;
/// Print-grade fidelity
pub const DEFAULT_TARGET_DENSITY: f64 = 300.0;
/// A 4096x4096 RGBA buffer is 64 MiB
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Absorbs representation error so exact products such as
/// `612 * 300 / 72` are not floored one pixel short.
const SNAP_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Pixels per physical inch
    pub target_density: f64,
    /// Ceiling for either canvas side, in pixels
    pub max_dimension: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            target_density: DEFAULT_TARGET_DENSITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.target_density.is_finite() || self.target_density <= 0.0 {
            return Err(EditError::InvalidConfig(format!(
                "target density must be positive, got {}",
                self.target_density
            )));
        }
        if self.max_dimension == 0 {
            return Err(EditError::InvalidConfig(
                "max dimension must be at least one pixel".to_string(),
            ));
        }
        Ok(())
    }

    /// Pixels per point before any ceiling reduction
    #[must_use]
    pub fn base_scale(&self) -> f64 {
        self.target_density / POINTS_PER_INCH
    }
}

/// Pixel canvas for one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionPlan {
    pub target_density: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Pixels per PDF point after the ceiling was applied
    pub effective_scale: f64,
    /// True when the ceiling shrank the canvas
    pub reduced: bool,
}

impl ResolutionPlan {
    /// Bytes needed for an RGBA buffer of this canvas
    #[must_use]
    pub fn buffer_len(&self) -> Option<usize> {
        (self.canvas_width as usize)
            .checked_mul(self.canvas_height as usize)?
            .checked_mul(4)
    }
}

#[derive(Clone, Debug)]
pub struct ResolutionPlanner {
    config: PlannerConfig,
}

impl ResolutionPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Same ceiling, different density
    pub fn with_density(&self, target_density: f64) -> Result<Self> {
        Self::new(PlannerConfig {
            target_density,
            ..self.config
        })
    }

    /// Plan the canvas for `page` (1-based, for error reporting)
    pub fn plan(&self, page: u32, size: PageSize) -> Result<ResolutionPlan> {
        if !size.is_valid() {
            return Err(EditError::InvalidPageGeometry {
                page,
                width: size.width,
                height: size.height,
            });
        }

        let density = self.config.target_density;
        let max = f64::from(self.config.max_dimension);

        let mut scale = self.config.base_scale();
        let mut width = size.width * density / POINTS_PER_INCH;
        let mut height = size.height * density / POINTS_PER_INCH;

        let reduced = width > max || height > max;
        if reduced {
            let reduction = (max / width).min(max / height);
            scale *= reduction;
            // The limiting side lands on the ceiling exactly
            if width >= height {
                height *= reduction;
                width = max;
            } else {
                width *= reduction;
                height = max;
            }
        }

        Ok(ResolutionPlan {
            target_density: density,
            canvas_width: snap_down(width, self.config.max_dimension),
            canvas_height: snap_down(height, self.config.max_dimension),
            effective_scale: scale,
            reduced,
        })
    }
}

fn snap_down(value: f64, max: u32) -> u32 {
    ((value + SNAP_EPSILON).floor() as u32).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(density: f64, max_dimension: u32) -> ResolutionPlanner {
        ResolutionPlanner::new(PlannerConfig {
            target_density: density,
            max_dimension,
        })
        .unwrap()
    }

    #[test]
    fn letter_at_print_density_is_not_reduced() {
        let plan = ResolutionPlanner::new(PlannerConfig::default())
            .unwrap()
            .plan(1, PageSize::new(612.0, 792.0))
            .unwrap();

        assert_eq!((plan.canvas_width, plan.canvas_height), (2550, 3300));
        assert!(!plan.reduced);
        assert!((plan.effective_scale - 300.0 / 72.0).abs() < 1e-12);
    }

    #[test]
    fn huge_square_page_hits_ceiling() {
        let plan = planner(300.0, 4096)
            .plan(1, PageSize::new(5000.0, 5000.0))
            .unwrap();

        assert!(plan.reduced);
        assert_eq!((plan.canvas_width, plan.canvas_height), (4096, 4096));
        assert!(plan.effective_scale < 300.0 / 72.0);
        assert!((plan.effective_scale * 5000.0 - 4096.0).abs() < 1e-6);
    }

    #[test]
    fn reduction_keeps_aspect_ratio() {
        let plan = planner(144.0, 100).plan(3, PageSize::new(300.0, 150.0)).unwrap();

        assert!(plan.reduced);
        assert_eq!(plan.canvas_width, 100);
        assert_eq!(plan.canvas_height, 50);
    }

    #[test]
    fn ceiling_holds_for_many_sizes() {
        let planner = planner(300.0, 512);
        let sizes = [
            (1.0, 1.0),
            (612.0, 792.0),
            (595.28, 841.89),
            (10_000.0, 3.0),
            (3.0, 10_000.0),
            (1234.5, 1234.5),
            (14_400.0, 14_400.0),
        ];

        for (w, h) in sizes {
            let plan = planner.plan(1, PageSize::new(w, h)).unwrap();
            assert!(plan.canvas_width <= 512 && plan.canvas_height <= 512, "{w}x{h} -> {plan:?}");
            assert!(plan.effective_scale <= 300.0 / 72.0 + 1e-12);

            // Aspect ratio within one pixel of rounding
            let expected_width = f64::from(plan.canvas_height) * w / h;
            if plan.canvas_height > 1 && plan.canvas_width > 1 {
                assert!(
                    (f64::from(plan.canvas_width) - expected_width).abs() <= 1.0 + w / h,
                    "{w}x{h} -> {plan:?}"
                );
            }
        }
    }

    #[test]
    fn tiny_pages_get_at_least_one_pixel() {
        let plan = planner(1.0, 4096).plan(1, PageSize::new(1.0, 1.0)).unwrap();
        assert_eq!((plan.canvas_width, plan.canvas_height), (1, 1));
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let planner = planner(300.0, 4096);
        for size in [
            PageSize::new(0.0, 792.0),
            PageSize::new(612.0, -1.0),
            PageSize::new(f64::NAN, 10.0),
        ] {
            assert!(matches!(
                planner.plan(4, size),
                Err(EditError::InvalidPageGeometry { page: 4, .. })
            ));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(ResolutionPlanner::new(PlannerConfig {
            target_density: 0.0,
            max_dimension: 10,
        })
        .is_err());
        assert!(ResolutionPlanner::new(PlannerConfig {
            target_density: 72.0,
            max_dimension: 0,
        })
        .is_err());
    }

    #[test]
    fn with_density_keeps_ceiling() {
        let half = planner(300.0, 64).with_density(150.0).unwrap();
        assert_eq!(half.config().max_dimension, 64);
        assert_eq!(half.config().target_density, 150.0);
    }
}
