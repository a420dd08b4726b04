//! Pipeline configuration.
//!
//! Distances are expressed in the units of the road network's CRS (metres
//! for the projected systems this crate supports).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::projection::Crs;

/// Configuration for road segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Radius used to buffer each intersection point.
    /// Default: 5.0 units
    pub intersection_buffer_units: f64,

    /// Plain segments longer than this are recursively halved.
    /// Default: 200.0 units
    pub max_line_units: f64,

    /// Radius of the catchment buffer drawn around each incident.
    /// Default: 5.0 units
    pub match_tolerance: f64,

    /// Maximum width/height of a tile used for intersection discovery.
    /// Default: 3000.0 units
    pub tile_max_units: f64,

    /// CRS of the incident coordinates.
    /// Default: EPSG:4326
    pub record_projection: Crs,

    /// Incident CSV column holding the x coordinate (longitude).
    pub record_col_x: String,

    /// Incident CSV column holding the y coordinate (latitude).
    pub record_col_y: String,

    /// Base name of the output file, without extension.
    pub output_name: String,

    /// Number of segments used to approximate a quarter circle when buffering.
    /// Default: 16
    pub buffer_quadrant_segments: u32,

    /// Size of the intersection worker pool. `None` uses every core.
    pub worker_threads: Option<usize>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            intersection_buffer_units: 5.0,
            max_line_units: 200.0,
            match_tolerance: 5.0,
            tile_max_units: 3000.0,
            record_projection: Crs::WGS84,
            record_col_x: "lon".to_string(),
            record_col_y: "lat".to_string(),
            output_name: "combined_segments".to_string(),
            buffer_quadrant_segments: 16,
            worker_threads: None,
        }
    }
}

impl SegmentConfig {
    /// Default configuration overlaid with any of the supported environment
    /// variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SegmentError::io(path, e))?;
        let config: SegmentConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INTERSECTION_BUFFER_UNITS") {
            self.intersection_buffer_units = parse_number("INTERSECTION_BUFFER_UNITS", &v)?;
        }
        if let Some(v) = lookup("MAX_LINE_UNITS") {
            self.max_line_units = parse_number("MAX_LINE_UNITS", &v)?;
        }
        if let Some(v) = lookup("MATCH_TOLERANCE") {
            self.match_tolerance = parse_number("MATCH_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("TILE_MAX_UNITS") {
            self.tile_max_units = parse_number("TILE_MAX_UNITS", &v)?;
        }
        if let Some(v) = lookup("RECORD_PROJECTION") {
            self.record_projection = v.parse()?;
        }
        if let Some(v) = lookup("RECORD_COL_X") {
            self.record_col_x = v;
        }
        if let Some(v) = lookup("RECORD_COL_Y") {
            self.record_col_y = v;
        }
        if let Some(v) = lookup("COMBINED_SEGMENTS_NAME") {
            self.output_name = v;
        }
        if let Some(v) = lookup("SEGMENT_WORKER_THREADS") {
            let threads = v.trim().parse::<usize>().map_err(|_| SegmentError::ConfigError {
                message: format!("SEGMENT_WORKER_THREADS must be an integer, got '{}'", v),
            })?;
            self.worker_threads = Some(threads);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("intersection_buffer_units", self.intersection_buffer_units),
            ("max_line_units", self.max_line_units),
            ("match_tolerance", self.match_tolerance),
            ("tile_max_units", self.tile_max_units),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(SegmentError::ConfigError {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        if self.buffer_quadrant_segments == 0 {
            return Err(SegmentError::ConfigError {
                message: "buffer_quadrant_segments must be at least 1".to_string(),
            });
        }
        if self.worker_threads == Some(0) {
            return Err(SegmentError::ConfigError {
                message: "worker_threads must be at least 1".to_string(),
            });
        }
        if self.record_col_x.is_empty() || self.record_col_y.is_empty() {
            return Err(SegmentError::ConfigError {
                message: "record coordinate column names cannot be empty".to_string(),
            });
        }
        if self.output_name.is_empty() {
            return Err(SegmentError::ConfigError {
                message: "output_name cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| SegmentError::ConfigError {
        message: format!("{} must be a number, got '{}'", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = SegmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_line_units, 200.0);
        assert_eq!(config.record_projection, Crs::WGS84);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MAX_LINE_UNITS", "150"),
            ("RECORD_PROJECTION", "epsg:3857"),
            ("RECORD_COL_X", "x"),
            ("SEGMENT_WORKER_THREADS", "2"),
        ]
        .into_iter()
        .collect();

        let config = SegmentConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_line_units, 150.0);
        assert_eq!(config.record_projection, Crs::WEB_MERCATOR);
        assert_eq!(config.record_col_x, "x");
        assert_eq!(config.record_col_y, "lat");
        assert_eq!(config.worker_threads, Some(2));
    }

    #[test]
    fn test_bad_env_value() {
        let result = SegmentConfig::default().with_env_overrides(|k| {
            (k == "TILE_MAX_UNITS").then(|| "wide".to_string())
        });
        assert!(matches!(result, Err(SegmentError::ConfigError { .. })));
    }

    #[test]
    fn test_non_positive_max_length_rejected() {
        let config = SegmentConfig {
            max_line_units: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_config() {
        let config: SegmentConfig =
            serde_json::from_str(r#"{"max_line_units": 50.0, "record_projection": "EPSG:32702"}"#)
                .unwrap();
        assert_eq!(config.max_line_units, 50.0);
        assert_eq!(config.record_projection.epsg, 32702);
        assert_eq!(config.tile_max_units, 3000.0);
    }
}
