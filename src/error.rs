//! Unified error handling for the road-segmenter library.
//!
//! Every stage of the segmentation pipeline reports failures through
//! [`SegmentError`]. Only incident rows are recoverable (they are skipped and
//! counted by the record reader); everything else propagates to the caller
//! with the underlying cause attached.

use std::fmt;
use std::path::PathBuf;

/// Unified error type for segmentation operations.
#[derive(Debug)]
pub enum SegmentError {
    /// Reading or writing a file failed
    Io {
        path: Option<PathBuf>,
        source: std::io::Error,
    },
    /// Incident CSV could not be read
    Csv { source: csv::Error },
    /// Road network GeoJSON could not be parsed
    GeoJson { source: geojson::Error },
    /// JSON (de)serialization failed
    Json { source: serde_json::Error },
    /// A required column is absent from the incident CSV header
    MissingColumn { column: String },
    /// PROJ cannot build a transform for this coordinate reference system
    UnsupportedCrs { crs: String, message: String },
    /// A coordinate could not be reprojected
    Projection { x: f64, y: f64, message: String },
    /// An incident row is unreadable (undecodable or non-numeric coordinates)
    InvalidRecord { message: String },
    /// Input geometry is unusable
    InvalidGeometry { message: String },
    /// Configuration error
    ConfigError { message: String },
    /// Worker pool could not be created
    WorkerPool { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl SegmentError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SegmentError::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Whether the failure only concerns a single incident row.
    pub fn is_row_recoverable(&self) -> bool {
        matches!(
            self,
            SegmentError::Projection { .. } | SegmentError::InvalidRecord { .. }
        )
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Io { path, source } => match path {
                Some(path) => write!(f, "I/O error on '{}': {}", path.display(), source),
                None => write!(f, "I/O error: {}", source),
            },
            SegmentError::Csv { source } => write!(f, "CSV error: {}", source),
            SegmentError::GeoJson { source } => write!(f, "GeoJSON error: {}", source),
            SegmentError::Json { source } => write!(f, "JSON error: {}", source),
            SegmentError::MissingColumn { column } => {
                write!(f, "Records file has no '{}' column", column)
            }
            SegmentError::UnsupportedCrs { crs, message } => {
                write!(f, "Unsupported coordinate reference system {}: {}", crs, message)
            }
            SegmentError::Projection { x, y, message } => {
                write!(f, "Cannot reproject ({}, {}): {}", x, y, message)
            }
            SegmentError::InvalidRecord { message } => {
                write!(f, "Invalid incident row: {}", message)
            }
            SegmentError::InvalidGeometry { message } => {
                write!(f, "Invalid geometry: {}", message)
            }
            SegmentError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SegmentError::WorkerPool { message } => {
                write!(f, "Worker pool error: {}", message)
            }
            SegmentError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Io { source, .. } => Some(source),
            SegmentError::Csv { source } => Some(source),
            SegmentError::GeoJson { source } => Some(source),
            SegmentError::Json { source } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SegmentError {
    fn from(source: std::io::Error) -> Self {
        SegmentError::Io { path: None, source }
    }
}

impl From<csv::Error> for SegmentError {
    fn from(source: csv::Error) -> Self {
        SegmentError::Csv { source }
    }
}

impl From<geojson::Error> for SegmentError {
    fn from(source: geojson::Error) -> Self {
        SegmentError::GeoJson { source }
    }
}

impl From<serde_json::Error> for SegmentError {
    fn from(source: serde_json::Error) -> Self {
        SegmentError::Json { source }
    }
}

/// Result type alias for segmentation operations.
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Extension trait for converting Option to SegmentError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid geometry error.
    fn ok_or_invalid_geometry(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_geometry(self, message: &str) -> Result<T> {
        self.ok_or_else(|| SegmentError::InvalidGeometry {
            message: message.to_string(),
        })
    }
}
