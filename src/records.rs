//! # Incident Record Buffers
//!
//! Reads incident locations from CSV, reprojects each one into the road
//! network's CRS and buffers it by the match tolerance. The resulting
//! catchment polygons are only used to decide which roads are worth
//! segmenting.
//!
//! A row whose coordinates cannot be decoded, parsed or reprojected is
//! skipped and counted. Rows are read as raw bytes, so a stray non-UTF-8
//! field only costs its own row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Trim};
use geo::{BoundingRect, Coord, Polygon};
use log::{debug, info, warn};
use rstar::{RTreeObject, AABB};

use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};
use crate::geo_utils::{circle_buffer, is_finite_rect, rect_envelope};
use crate::projection::{Crs, Reprojector};

/// Circular catchment zone around one incident.
#[derive(Debug, Clone)]
pub struct IncidentBuffer {
    /// Incident location in the road CRS
    pub center: Coord<f64>,
    pub polygon: Polygon<f64>,
}

impl IncidentBuffer {
    pub fn new(center: Coord<f64>, radius: f64, quadrant_segments: u32) -> Self {
        Self {
            center,
            polygon: circle_buffer(center, radius, quadrant_segments),
        }
    }
}

impl RTreeObject for IncidentBuffer {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        match self.polygon.bounding_rect() {
            Some(rect) if is_finite_rect(&rect) => rect_envelope(&rect),
            _ => AABB::from_point([self.center.x, self.center.y]),
        }
    }
}

/// Incident buffers plus the number of rows that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct RecordBuffers {
    pub buffers: Vec<IncidentBuffer>,
    pub skipped_rows: usize,
}

impl RecordBuffers {
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Strip whitespace, quoting and `b'...'` byte-literal artifacts left by
/// upstream exports.
pub fn clean_coordinate(raw: &str) -> String {
    raw.trim().replace("b'", "").replace('\'', "").trim().to_string()
}

/// Parse a cleaned coordinate value.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    clean_coordinate(raw).parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read incident buffers from a CSV file on disk.
pub fn read_record_buffers_from_path(
    path: impl AsRef<Path>,
    road_crs: Crs,
    config: &SegmentConfig,
) -> Result<RecordBuffers> {
    let path = path.as_ref();
    info!("[RecordBuffers] Reading records CSV: {}", path.display());
    let file = File::open(path).map_err(|e| SegmentError::io(path, e))?;
    read_record_buffers(file, road_crs, config)
}

/// Read incident rows from `reader`, reproject them into `road_crs` and
/// buffer each by `config.match_tolerance`.
pub fn read_record_buffers<R: Read>(
    reader: R,
    road_crs: Crs,
    config: &SegmentConfig,
) -> Result<RecordBuffers> {
    let reprojector = Reprojector::new(config.record_projection, road_crs)?;

    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.byte_headers()?.clone();
    let x_idx = column_index(&headers, &config.record_col_x)?;
    let y_idx = column_index(&headers, &config.record_col_y)?;

    let mut result = RecordBuffers::default();
    for (row_idx, record) in csv_reader.byte_records().enumerate() {
        let record = record?;
        match row_center(&record, x_idx, y_idx, &reprojector) {
            Ok(center) => result.buffers.push(IncidentBuffer::new(
                center,
                config.match_tolerance,
                config.buffer_quadrant_segments,
            )),
            Err(e) if e.is_row_recoverable() => {
                debug!("[RecordBuffers] Skipping row {}: {}", row_idx + 1, e);
                result.skipped_rows += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if result.skipped_rows > 0 {
        warn!(
            "[RecordBuffers] Skipped {} records with unusable coordinates",
            result.skipped_rows
        );
    }
    info!("[RecordBuffers] Num record buffers: {}", result.buffers.len());
    Ok(result)
}

fn column_index(headers: &ByteRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| clean_coordinate(&String::from_utf8_lossy(h)) == column)
        .ok_or_else(|| SegmentError::MissingColumn {
            column: column.to_string(),
        })
}

/// Decode one field as UTF-8; a missing field decodes as empty.
fn field_str(record: &ByteRecord, idx: usize) -> Result<&str> {
    let raw = record.get(idx).unwrap_or_default();
    std::str::from_utf8(raw).map_err(|e| SegmentError::InvalidRecord {
        message: format!("column {} is not valid UTF-8: {}", idx, e),
    })
}

fn row_center(
    record: &ByteRecord,
    x_idx: usize,
    y_idx: usize,
    reprojector: &Reprojector,
) -> Result<Coord<f64>> {
    let raw_x = field_str(record, x_idx)?;
    let raw_y = field_str(record, y_idx)?;
    let (Some(x), Some(y)) = (parse_coordinate(raw_x), parse_coordinate(raw_y)) else {
        return Err(SegmentError::InvalidRecord {
            message: format!("unparseable coordinates ({:?}, {:?})", raw_x, raw_y),
        });
    };
    let (px, py) = reprojector.transform(x, y)?;
    Ok(Coord { x: px, y: py })
}
