//! Run configuration for an [`crate::pack::Environment`].
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compartment::{InsideMethod, SurfaceMethod};
use crate::error::{Error, Result};
use crate::grid::GridStyle;
use crate::sampling::{HaltonOrientation, OrientationSampling, UniformRandomOrientation};

/// How a candidate pose is searched around a grid point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceMethod {
    /// Rotation plus jittered translations, tested against the grid and the index.
    #[default]
    Jitter,
}

/// Source of free rotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMethod {
    #[default]
    UniformRandom,
    /// Randomly shifted Halton sequence, bases (2, 3, 5).
    Halton,
}

impl OrientationMethod {
    /// Fresh sampler for one run.
    pub fn sampler(&self) -> Box<dyn OrientationSampling> {
        match self {
            OrientationMethod::UniformRandom => Box::new(UniformRandomOrientation::new()),
            OrientationMethod::Halton => Box::new(HaltonOrientation::new()),
        }
    }
}

/// Configuration for building and packing an environment.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Grid spacing; `None` derives it from the smallest ingredient.
    pub spacing: Option<f32>,
    pub place_method: PlaceMethod,
    /// Wrap candidates near the box faces to the opposite side.
    pub use_periodicity: bool,
    /// Log progress at info level every `progress_interval` commits.
    pub show_progress: bool,
    pub progress_interval: usize,
    /// Try to restore tags from `grid_file` before tagging.
    pub load_from_grid_file: bool,
    pub grid_file: Option<PathBuf>,
    /// Write `grid_file` after tagging from scratch.
    pub save_grid_file: bool,
    pub grid_style: GridStyle,
    pub inside_method: InsideMethod,
    pub surface_method: SurfaceMethod,
    pub orientation: OrientationMethod,
    /// Reach beyond each instance over which distances are updated.
    pub padding: Option<f32>,
    pub index_bulk_threshold: usize,
    pub index_rebuild_every: usize,
    /// Upper bound on scheduler iterations.
    pub max_iterations: Option<usize>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            spacing: None,
            place_method: PlaceMethod::Jitter,
            use_periodicity: false,
            show_progress: false,
            progress_interval: 100,
            load_from_grid_file: false,
            grid_file: None,
            save_grid_file: false,
            grid_style: GridStyle::Linspace,
            inside_method: InsideMethod::default(),
            surface_method: SurfaceMethod::default(),
            orientation: OrientationMethod::UniformRandom,
            padding: None,
            index_bulk_threshold: 1000,
            index_rebuild_every: 64,
            max_iterations: None,
        }
    }
}

impl PackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = Some(spacing);
        self
    }

    pub fn with_periodicity(mut self, enabled: bool) -> Self {
        self.use_periodicity = enabled;
        self
    }

    /// Enables progress logging every `interval` commits.
    pub fn with_progress(mut self, interval: usize) -> Self {
        self.show_progress = true;
        self.progress_interval = interval;
        self
    }

    /// Loads tags from `path` when its key matches and writes it after a rebuild.
    pub fn with_grid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.grid_file = Some(path.into());
        self.load_from_grid_file = true;
        self.save_grid_file = true;
        self
    }

    pub fn with_grid_style(mut self, style: GridStyle) -> Self {
        self.grid_style = style;
        self
    }

    pub fn with_inside_method(mut self, method: InsideMethod) -> Self {
        self.inside_method = method;
        self
    }

    pub fn with_surface_method(mut self, method: SurfaceMethod) -> Self {
        self.surface_method = method;
        self
    }

    pub fn with_orientation(mut self, orientation: OrientationMethod) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn with_index_policy(mut self, bulk_threshold: usize, rebuild_every: usize) -> Self {
        self.index_bulk_threshold = bulk_threshold;
        self.index_rebuild_every = rebuild_every;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(s) = self.spacing {
            if !s.is_finite() || s <= 0.0 {
                return Err(Error::InvalidGrid(format!(
                    "spacing must be finite and > 0, got {s}"
                )));
            }
        }
        if let Some(p) = self.padding {
            if !p.is_finite() || p < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "padding must be finite and >= 0, got {p}"
                )));
            }
        }
        if let InsideMethod::RayCast { rays } = self.inside_method {
            if rays != 1 && rays != 3 {
                return Err(Error::InvalidConfig(format!(
                    "ray cast needs 1 or 3 rays, got {rays}"
                )));
            }
        }
        if (self.load_from_grid_file || self.save_grid_file) && self.grid_file.is_none() {
            return Err(Error::InvalidConfig(
                "grid file loading or saving requested without grid_file".into(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(Error::InvalidConfig("progress_interval must be > 0".into()));
        }
        if self.index_rebuild_every == 0 {
            return Err(Error::InvalidConfig(
                "index_rebuild_every must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PackConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PackConfig::new().with_spacing(0.0).validate(),
            Err(Error::InvalidGrid(_))
        ));
        assert!(matches!(
            PackConfig::new().with_spacing(f32::NAN).validate(),
            Err(Error::InvalidGrid(_))
        ));
        assert!(PackConfig::new().with_padding(-1.0).validate().is_err());
        assert!(PackConfig::new()
            .with_inside_method(InsideMethod::RayCast { rays: 2 })
            .validate()
            .is_err());

        let mut config = PackConfig::new();
        config.load_from_grid_file = true;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(PackConfig::new()
            .with_grid_file("grid.json")
            .validate()
            .is_ok());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: PackConfig =
            serde_json::from_str(r#"{ "spacing": 4.0, "orientation": "halton" }"#).expect("json");
        assert_eq!(config.spacing, Some(4.0));
        assert_eq!(config.orientation, OrientationMethod::Halton);
        assert_eq!(config.progress_interval, 100);
    }
}
