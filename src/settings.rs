//! Engine settings
//!
//! Read from a JSON file. Every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::compositor::{CanvasSize, ZoomLimits};

const MIN_CANVAS: f64 = 16.0;
const MAX_CANVAS: f64 = 16384.0;
const MAX_PRECISION: usize = 10;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_canvas_width")]
    pub canvas_width: f64,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: f64,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,
    /// Factor applied by a single zoom-in step; zoom-out uses its inverse
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,
    /// Decimals used when collapsing hotspot coordinates into one key
    #[serde(default = "default_hotspot_precision")]
    pub hotspot_precision: usize,
    #[serde(default = "default_hotspot_icon_size")]
    pub hotspot_icon_size: f64,
    #[serde(default = "default_hotspot_icon")]
    pub hotspot_icon: String,
    #[serde(default)]
    pub asset_base_url: Option<String>,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

fn default_canvas_width() -> f64 {
    1200.0
}

fn default_canvas_height() -> f64 {
    800.0
}

fn default_min_zoom() -> f64 {
    0.2
}

fn default_max_zoom() -> f64 {
    5.0
}

fn default_zoom_step() -> f64 {
    1.2
}

fn default_hotspot_precision() -> usize {
    4
}

fn default_hotspot_icon_size() -> f64 {
    48.0
}

fn default_hotspot_icon() -> String {
    "gear.svg".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".planview/selections")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            zoom_step: default_zoom_step(),
            hotspot_precision: default_hotspot_precision(),
            hotspot_icon_size: default_hotspot_icon_size(),
            hotspot_icon: default_hotspot_icon(),
            asset_base_url: None,
            store_dir: default_store_dir(),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            info!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate_and_clamp();
        Ok(settings)
    }

    /// Clamp values to ranges the compositor can work with
    pub fn validate_and_clamp(&mut self) {
        for (name, value, fallback) in [
            ("canvas_width", &mut self.canvas_width, default_canvas_width()),
            ("canvas_height", &mut self.canvas_height, default_canvas_height()),
        ] {
            if !value.is_finite() || *value < MIN_CANVAS {
                warn!(field = name, value = *value, using = fallback, "canvas dimension too small, using default");
                *value = fallback;
            } else if *value > MAX_CANVAS {
                warn!(field = name, value = *value, max = MAX_CANVAS, "canvas dimension exceeds maximum, clamping");
                *value = MAX_CANVAS;
            }
        }

        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom && self.max_zoom.is_finite()) {
            warn!(min_zoom = self.min_zoom, max_zoom = self.max_zoom, "invalid zoom bounds, using defaults");
            self.min_zoom = default_min_zoom();
            self.max_zoom = default_max_zoom();
        }

        if !(self.zoom_step.is_finite() && self.zoom_step > 1.0) {
            warn!(zoom_step = self.zoom_step, "zoom_step must be greater than 1, using default");
            self.zoom_step = default_zoom_step();
        }

        if self.hotspot_precision > MAX_PRECISION {
            warn!(hotspot_precision = self.hotspot_precision, max = MAX_PRECISION, "hotspot_precision exceeds maximum, clamping");
            self.hotspot_precision = MAX_PRECISION;
        }

        if !(self.hotspot_icon_size.is_finite() && self.hotspot_icon_size > 0.0) {
            warn!(hotspot_icon_size = self.hotspot_icon_size, "hotspot_icon_size must be positive, using default");
            self.hotspot_icon_size = default_hotspot_icon_size();
        }
    }

    pub fn canvas(&self) -> CanvasSize {
        CanvasSize::new(self.canvas_width, self.canvas_height)
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: self.min_zoom,
            max: self.max_zoom,
        }
    }
}
