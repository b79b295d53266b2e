//! JSON configuration for the whole pipeline.

use std::{fs, path::Path};

use fieldtrack_blob::BlobParams;
use fieldtrack_core::{PreprocessParams, RansacParams};
use fieldtrack_events::{TelemetryParams, ZoneConfigError, ZoneSet};
use fieldtrack_tags::{TagConfigError, TagRoleMap};
use serde::{Deserialize, Serialize};

use crate::calibration::PlaneRect;
use crate::pipeline::SourceParams;

#[derive(thiserror::Error, Debug)]
pub enum FieldTrackIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] ::image::ImageError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("scale factor {0} must be in (0, 4]")]
    InvalidScale(f32),
    #[error("plane size {width} x {height} must be positive")]
    InvalidPlane { width: f64, height: f64 },
    #[error(transparent)]
    Tags(#[from] TagConfigError),
    #[error("blob radius bounds [{min}, {max}] are invalid")]
    InvalidRadius { min: f32, max: f32 },
    #[error("blob circularity threshold {0} must be in [0, 1]")]
    InvalidCircularity(f32),
    #[error("blob {0} color range has inverted bounds")]
    InvalidColorRange(&'static str),
    #[error(transparent)]
    Zones(#[from] ZoneConfigError),
    #[error("telemetry {name} = {value} must be finite and non-negative")]
    InvalidTelemetry { name: &'static str, value: f64 },
    #[error("telemetry topic must not be empty")]
    EmptyTopic,
}

/// Everything the pipeline and the frame loop need.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldTrackConfig {
    pub preprocess: PreprocessParams,
    pub plane: PlaneRect,
    pub tags: TagRoleMap,
    pub ransac: RansacParams,
    pub blob: BlobParams,
    pub zones: ZoneSet,
    pub telemetry: TelemetryParams,
    pub source: SourceParams,
}

impl FieldTrackConfig {
    /// Load a JSON config from disk. Missing sections take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, FieldTrackIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), FieldTrackIoError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scale = self.preprocess.scale;
        if !scale.is_finite() || scale <= 0.0 || scale > 4.0 {
            return Err(ConfigError::InvalidScale(scale));
        }
        if !self.plane.is_valid() {
            return Err(ConfigError::InvalidPlane {
                width: self.plane.width,
                height: self.plane.height,
            });
        }
        self.tags.validate()?;

        let b = &self.blob;
        if !(b.min_radius >= 0.0 && b.min_radius <= b.max_radius && b.max_radius.is_finite()) {
            return Err(ConfigError::InvalidRadius {
                min: b.min_radius,
                max: b.max_radius,
            });
        }
        if !(0.0..=1.0).contains(&b.min_circularity) {
            return Err(ConfigError::InvalidCircularity(b.min_circularity));
        }
        if !b.include.is_ordered() {
            return Err(ConfigError::InvalidColorRange("include"));
        }
        if b.exclude.is_some_and(|ex| !ex.is_ordered()) {
            return Err(ConfigError::InvalidColorRange("exclude"));
        }

        self.zones.validate()?;

        let t = &self.telemetry;
        if t.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        for (name, value) in [
            ("min_interval_s", t.min_interval_s),
            ("heading_deadband_deg", t.heading_deadband_deg),
            ("position_deadband", t.position_deadband),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTelemetry { name, value });
            }
        }
        Ok(())
    }
}
