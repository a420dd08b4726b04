//! # Road Segmenter
//!
//! Cuts a road network into short segments for crash analysis.
//!
//! The network is split into *intersection segments* (every piece of road
//! inside a junction zone, one segment per zone) and *plain segments* (the
//! stretches between junctions, no longer than a configured maximum). Only
//! roads near at least one incident record are segmented.
//!
//! ## Pipeline
//!
//! 1. [`records`]: buffer incident locations, reprojected into the road CRS
//! 2. [`roads`]: read the network and keep roads near incidents
//! 3. [`tiles`]: bucket roads into tiles to keep pairwise tests local
//! 4. [`intersections`]: find crossing points per tile
//! 5. [`buffers`]: circle and dissolve the crossing points into zones
//! 6. [`splitter`]: cut roads into intersection and plain segments
//! 7. [`writer`]: emit segments with their attributes
//!
//! [`pipeline::get_segments`] runs all of the above from files on disk.
//!
//! ## Features
//!
//! - **`parallel`** - Search tiles for intersections on a rayon pool (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::LineString;
//! use road_segmenter::{
//!     segment_roads, RecordBuffers, Road, RoadAttributes, SegmentConfig, SegmentRecord,
//! };
//! use road_segmenter::records::IncidentBuffer;
//!
//! let roads = vec![
//!     Road::new(LineString::from(vec![(-50.0, 0.0), (50.0, 0.0)]), RoadAttributes::default()),
//!     Road::new(LineString::from(vec![(0.0, -50.0), (0.0, 50.0)]), RoadAttributes::default()),
//! ];
//! let records = RecordBuffers {
//!     buffers: vec![IncidentBuffer::new(geo::Coord { x: 0.0, y: 0.0 }, 5.0, 16)],
//!     skipped_rows: 0,
//! };
//!
//! let mut out: Vec<SegmentRecord> = Vec::new();
//! let stats = segment_roads(roads, records, &SegmentConfig::default(), &mut out).unwrap();
//! assert_eq!(stats.intersection_segments, 1);
//! assert_eq!(out.len(), 5);
//! ```

use geo::{LineString, MultiLineString};
use rstar::AABB;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SegmentError};

// Runtime settings
pub mod config;
pub use config::SegmentConfig;

// Coordinate reference systems
pub mod projection;
pub use projection::{Crs, Reprojector};

// Planar geometry helpers
pub mod geo_utils;

// Disjoint sets for clustering junction buffers
pub mod union_find;

// Incident CSV -> catchment buffers
pub mod records;
pub use records::{read_record_buffers, read_record_buffers_from_path, RecordBuffers};

// Road network input and filtering
pub mod roads;
pub use roads::{filter_roads, parse_road_network, read_road_network, FilteredRoads};

// Spatial tiling
pub mod tiles;
pub use tiles::{Tile, TileGrid};

// Crossing points
pub mod intersections;
pub use intersections::{find_all_intersections, find_intersections, Crossing};

// Junction zones
pub mod buffers;
pub use buffers::build_intersection_buffers;

// Cutting roads into segments
pub mod splitter;
pub use splitter::{split_line, split_segments};

// Segment output
pub mod writer;
pub use writer::{GeoJsonSegmentWriter, SegmentRecord, SegmentSink};

// Packaging
pub mod archive;
pub use archive::create_segments_tarball;

// End-to-end orchestration
pub mod pipeline;
pub use pipeline::{get_segments, segment_roads, SegmentationStats};

// ============================================================================
// Core Types
// ============================================================================

/// Attributes of a road that decide whether it is segmented.
///
/// Mirrors the OSM tags carried by a `lines` export. Absent tags are `None`
/// (or `false` for the flags).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadAttributes {
    /// OSM `highway` value, e.g. `primary` or `footway`
    pub highway: Option<String>,
    pub bridge: bool,
    pub tunnel: bool,
    /// Coarse classification, e.g. `highway` or `railway`.
    ///
    /// The outer `Option` records whether the key exists at all; a key
    /// present with a null value is `Some(None)`.
    pub class: Option<Option<String>>,
}

/// A single road polyline in the working (metric) CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    pub geometry: LineString<f64>,
    pub attributes: RoadAttributes,
}

impl Road {
    pub fn new(geometry: LineString<f64>, attributes: RoadAttributes) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// R-tree envelope of the geometry, `None` if it has no finite extent.
    pub fn envelope(&self) -> Option<AABB<[f64; 2]>> {
        geo_utils::line_envelope(&self.geometry)
    }
}

/// One output segment.
///
/// The category is carried by the variant; writers never need to infer it
/// from the geometry type.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Every road piece inside one junction zone
    Intersection(MultiLineString<f64>),
    /// A stretch of road between junctions
    Plain(LineString<f64>),
}

impl Segment {
    pub fn is_intersection(&self) -> bool {
        matches!(self, Segment::Intersection(_))
    }

    /// Geometry as a multi-line string (a plain segment has one part).
    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        match self {
            Segment::Intersection(lines) => lines.clone(),
            Segment::Plain(line) => MultiLineString::new(vec![line.clone()]),
        }
    }

    /// Number of line parts.
    pub fn line_count(&self) -> usize {
        match self {
            Segment::Intersection(lines) => lines.0.len(),
            Segment::Plain(_) => 1,
        }
    }
}
