//! # Segment Output
//!
//! Every segment is written as a multi-line string with six attributes:
//!
//! | field    | meaning                                          |
//! |----------|--------------------------------------------------|
//! | `id`     | sequential, in splitter order, starting at 0     |
//! | `inter`  | 1 for intersection segments, 0 for plain ones    |
//! | `length` | summed planar length of all parts                |
//! | `lines`  | number of parts (always 1 for plain segments)    |
//! | `pointx` | x of the length-weighted centroid                |
//! | `pointy` | y of the length-weighted centroid                |
//!
//! Records go to a [`SegmentSink`]. [`GeoJsonSegmentWriter`] streams them to a
//! GeoJSON `FeatureCollection` tagged with the road CRS; `Vec<SegmentRecord>`
//! collects them in memory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo::{Centroid, MultiLineString};
use geojson::{Feature, Geometry, JsonObject};
use log::{debug, info};
use serde_json::json;

use crate::error::{OptionExt, Result, SegmentError};
use crate::geo_utils::multi_line_length;
use crate::projection::Crs;
use crate::Segment;

/// How often progress is logged while writing.
const PROGRESS_INTERVAL: usize = 1000;

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub id: usize,
    pub is_intersection: bool,
    pub length: f64,
    pub line_count: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub geometry: MultiLineString<f64>,
}

impl SegmentRecord {
    /// Compute the attributes of `segment`.
    ///
    /// Fails only for a segment without any length, which the splitter never
    /// produces.
    pub fn from_segment(id: usize, segment: &Segment) -> Result<Self> {
        let geometry = segment.to_multi_line_string();
        let centroid = geometry
            .centroid()
            .ok_or_invalid_geometry(&format!("segment {} has no centroid", id))?;
        Ok(Self {
            id,
            is_intersection: segment.is_intersection(),
            length: multi_line_length(&geometry),
            line_count: segment.line_count(),
            centroid_x: centroid.x(),
            centroid_y: centroid.y(),
            geometry,
        })
    }

    /// Attribute map in output field order.
    pub fn properties(&self) -> JsonObject {
        let mut props = JsonObject::new();
        props.insert("id".to_string(), json!(self.id));
        props.insert("inter".to_string(), json!(u8::from(self.is_intersection)));
        props.insert("length".to_string(), json!(self.length));
        props.insert("lines".to_string(), json!(self.line_count));
        props.insert("pointx".to_string(), json!(self.centroid_x));
        props.insert("pointy".to_string(), json!(self.centroid_y));
        props
    }

    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(self.properties()),
            foreign_members: None,
        }
    }
}

/// Destination for segment records.
pub trait SegmentSink {
    fn write_segment(&mut self, record: SegmentRecord) -> Result<()>;

    /// Flush and close the output. Called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl SegmentSink for Vec<SegmentRecord> {
    fn write_segment(&mut self, record: SegmentRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Streams segments into a GeoJSON `FeatureCollection`.
///
/// The collection header is written on construction and the closing bracket
/// by [`SegmentSink::finish`]; a writer dropped before `finish` leaves an
/// incomplete document.
pub struct GeoJsonSegmentWriter<W: Write> {
    out: W,
    written: usize,
    finished: bool,
}

impl GeoJsonSegmentWriter<BufWriter<File>> {
    /// Create (or truncate) a GeoJSON file at `path`.
    pub fn create(path: impl AsRef<Path>, crs: Crs) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SegmentError::io(path, e))?;
        Self::new(BufWriter::new(file), crs)
    }
}

impl<W: Write> GeoJsonSegmentWriter<W> {
    pub fn new(mut out: W, crs: Crs) -> Result<Self> {
        let crs_member = json!({
            "type": "name",
            "properties": { "name": crs.urn() },
        });
        write!(
            out,
            "{{\"type\":\"FeatureCollection\",\"crs\":{},\"features\":[",
            serde_json::to_string(&crs_member)?
        )?;
        Ok(Self {
            out,
            written: 0,
            finished: false,
        })
    }

    /// Number of features written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Finish the document and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.out)
    }
}

impl<W: Write> SegmentSink for GeoJsonSegmentWriter<W> {
    fn write_segment(&mut self, record: SegmentRecord) -> Result<()> {
        if self.finished {
            return Err(SegmentError::Internal {
                message: "segment written after the collection was closed".to_string(),
            });
        }
        if self.written > 0 {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\n")?;
        serde_json::to_writer(&mut self.out, &record.to_feature())?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.out.write_all(b"\n]}\n")?;
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }
}

/// Write `segments` to `sink` in order, numbering them from 0, then finish
/// the sink. Returns the number of records written.
pub fn write_segments<S>(segments: Vec<Segment>, sink: &mut S) -> Result<usize>
where
    S: SegmentSink + ?Sized,
{
    let total = segments.len();
    info!("[SegmentWriter] Writing {} segments", total);

    for (id, segment) in segments.into_iter().enumerate() {
        sink.write_segment(SegmentRecord::from_segment(id, &segment)?)?;
        if (id + 1) % PROGRESS_INTERVAL == 0 {
            debug!("[SegmentWriter] Wrote {} of {} segments", id + 1, total);
        }
    }
    sink.finish()?;

    info!("[SegmentWriter] Wrote {} segments", total);
    Ok(total)
}
