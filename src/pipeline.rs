//! # Segmentation Pipeline
//!
//! Runs the stages in order: filter roads against incident buffers, tile,
//! find intersections, buffer them into junction zones, split, write.
//!
//! [`segment_roads`] works on in-memory inputs and any [`SegmentSink`];
//! [`get_segments`] reads the inputs from disk and writes a GeoJSON file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use geo::MultiPoint;
use log::{error, info, warn};
use serde::Serialize;

use crate::buffers::build_intersection_buffers;
use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};
use crate::intersections::find_all_intersections;
use crate::projection::Crs;
use crate::records::{read_record_buffers_from_path, RecordBuffers};
use crate::roads::{filter_roads, read_road_network};
use crate::splitter::split_segments;
use crate::tiles::TileGrid;
use crate::writer::{write_segments, GeoJsonSegmentWriter, SegmentSink};
use crate::{Road, Segment};

/// Counters collected during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentationStats {
    pub record_buffers: usize,
    /// Incident rows skipped for unusable coordinates
    pub skipped_rows: usize,
    pub roads_read: usize,
    pub roads_kept: usize,
    /// Tiles holding more than one road
    pub tiles: usize,
    /// Intersection points summed over tiles (a point seen by two tiles
    /// counts twice)
    pub intersection_points: usize,
    pub intersection_buffers: usize,
    pub intersection_segments: usize,
    pub plain_segments: usize,
}

#[cfg(feature = "parallel")]
type WorkerPool = Option<rayon::ThreadPool>;

#[cfg(feature = "parallel")]
fn build_worker_pool(threads: Option<usize>) -> Result<WorkerPool> {
    threads
        .map(|n| {
            info!("[Pipeline] Using a pool of {} workers", n);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| SegmentError::WorkerPool {
                    message: e.to_string(),
                })
        })
        .transpose()
}

#[cfg(feature = "parallel")]
fn search_tiles(pool: &WorkerPool, roads: &[Road], grid: &TileGrid) -> Vec<MultiPoint<f64>> {
    match pool {
        Some(pool) => pool.install(|| find_all_intersections(roads, grid)),
        None => find_all_intersections(roads, grid),
    }
}

#[cfg(not(feature = "parallel"))]
type WorkerPool = ();

#[cfg(not(feature = "parallel"))]
fn build_worker_pool(threads: Option<usize>) -> Result<WorkerPool> {
    if let Some(n) = threads {
        log::debug!("[Pipeline] Ignoring worker_threads = {} without parallel support", n);
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn search_tiles(_pool: &WorkerPool, roads: &[Road], grid: &TileGrid) -> Vec<MultiPoint<f64>> {
    find_all_intersections(roads, grid)
}

/// Segment `roads` near the incidents in `records` and write the result to
/// `sink`.
///
/// Roads and incident buffers must already be in the same CRS.
pub fn segment_roads<S>(
    roads: Vec<Road>,
    records: RecordBuffers,
    config: &SegmentConfig,
    sink: &mut S,
) -> Result<SegmentationStats>
where
    S: SegmentSink + ?Sized,
{
    config.validate()?;
    let pool = build_worker_pool(config.worker_threads)?;

    let mut stats = SegmentationStats {
        record_buffers: records.len(),
        skipped_rows: records.skipped_rows,
        roads_read: roads.len(),
        ..Default::default()
    };

    let filtered = filter_roads(roads, records.buffers);
    stats.roads_kept = filtered.roads.len();

    let segments: Vec<Segment> = match filtered.bounds {
        Some(bounds) if !filtered.roads.is_empty() => {
            let grid = TileGrid::new(&filtered.roads, bounds, config.tile_max_units);
            let tile_points = search_tiles(&pool, &filtered.roads, &grid);
            drop(grid);

            stats.tiles = tile_points.len();
            stats.intersection_points = tile_points.iter().map(|mp| mp.0.len()).sum();

            info!("[Pipeline] Buffering intersections");
            let zones = build_intersection_buffers(
                tile_points,
                config.intersection_buffer_units,
                config.buffer_quadrant_segments,
            );
            stats.intersection_buffers = zones.0.len();

            split_segments(&filtered.roads, zones, config.max_line_units)
        }
        _ => {
            info!("[Pipeline] No roads left to segment");
            Vec::new()
        }
    };
    drop(filtered);

    stats.intersection_segments = segments.iter().filter(|s| s.is_intersection()).count();
    stats.plain_segments = segments.len() - stats.intersection_segments;

    write_segments(segments, sink)?;
    Ok(stats)
}

/// Run the whole pipeline from files.
///
/// Reads incidents from the CSV at `records_path` and roads from the GeoJSON
/// at `roads_path` (in EPSG:`road_srid`), and writes
/// `<output_dir>/<output_name>.geojson`. Returns the output path and the run
/// statistics. Failures are logged before being returned.
pub fn get_segments(
    roads_path: impl AsRef<Path>,
    records_path: impl AsRef<Path>,
    road_srid: u32,
    output_dir: impl AsRef<Path>,
    config: &SegmentConfig,
) -> Result<(PathBuf, SegmentationStats)> {
    let result = run_from_files(
        roads_path.as_ref(),
        records_path.as_ref(),
        road_srid,
        output_dir.as_ref(),
        config,
    );
    if let Err(e) = &result {
        error!("[Pipeline] Segmentation failed: {}", e);
    }
    result
}

fn run_from_files(
    roads_path: &Path,
    records_path: &Path,
    road_srid: u32,
    output_dir: &Path,
    config: &SegmentConfig,
) -> Result<(PathBuf, SegmentationStats)> {
    config.validate()?;
    let road_crs = Crs::from_epsg(road_srid)?;

    let records = read_record_buffers_from_path(records_path, road_crs, config)?;
    let roads = read_road_network(roads_path)?;

    fs::create_dir_all(output_dir).map_err(|e| SegmentError::io(output_dir, e))?;
    let output_path = output_dir.join(format!("{}.geojson", config.output_name));

    let stats = write_atomically(&output_path, |tmp_path| {
        let mut writer = GeoJsonSegmentWriter::create(tmp_path, road_crs)?;
        segment_roads(roads, records, config, &mut writer)
    })?;
    info!(
        "[Pipeline] Wrote {} intersection and {} plain segments to {}",
        stats.intersection_segments,
        stats.plain_segments,
        output_path.display()
    );
    Ok((output_path, stats))
}

/// Temp file written next to `path` before it is moved into place.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Run `write` against a temp file beside `path`, then rename it over `path`.
///
/// On failure the temp file is removed and any existing file at `path` is
/// left untouched.
fn write_atomically<T>(path: &Path, write: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let tmp_path = temp_path_for(path);
    let result = write(&tmp_path).and_then(|value| {
        fs::rename(&tmp_path, path).map_err(|e| SegmentError::io(path, e))?;
        Ok(value)
    });

    if result.is_err() {
        match fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[Pipeline] Could not remove {}: {}",
                tmp_path.display(),
                e
            ),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::IncidentBuffer;
    use crate::writer::SegmentRecord;
    use crate::RoadAttributes;
    use geo::{Coord, LineString};

    fn road(coords: Vec<(f64, f64)>) -> Road {
        Road::new(LineString::from(coords), RoadAttributes::default())
    }

    fn incidents(points: &[(f64, f64)]) -> RecordBuffers {
        RecordBuffers {
            buffers: points
                .iter()
                .map(|&(x, y)| IncidentBuffer::new(Coord { x, y }, 5.0, 16))
                .collect(),
            skipped_rows: 0,
        }
    }

    #[test]
    fn test_no_incidents_no_segments() {
        let mut out: Vec<SegmentRecord> = Vec::new();
        let stats = segment_roads(
            vec![road(vec![(0.0, 0.0), (10.0, 0.0)])],
            incidents(&[]),
            &SegmentConfig::default(),
            &mut out,
        )
        .unwrap();
        assert_eq!(stats.roads_read, 1);
        assert_eq!(stats.roads_kept, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_stats_for_cross() {
        let mut out: Vec<SegmentRecord> = Vec::new();
        let config = SegmentConfig {
            worker_threads: Some(2),
            ..Default::default()
        };
        let stats = segment_roads(
            vec![
                road(vec![(-50.0, 0.0), (50.0, 0.0)]),
                road(vec![(0.0, -50.0), (0.0, 50.0)]),
            ],
            incidents(&[(0.0, 0.0)]),
            &config,
            &mut out,
        )
        .unwrap();

        assert_eq!(stats.roads_kept, 2);
        assert_eq!(stats.tiles, 1);
        assert_eq!(stats.intersection_points, 1);
        assert_eq!(stats.intersection_buffers, 1);
        assert_eq!(stats.intersection_segments, 1);
        assert_eq!(stats.plain_segments, 4);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_write_atomically_replaces_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.geojson");
        fs::write(&path, "old").unwrap();

        let value = write_atomically(&path, |tmp| {
            assert_ne!(tmp, path.as_path());
            fs::write(tmp, "new")?;
            Ok(7)
        })
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_failed_write_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.geojson");
        let existing = dir.path().join("existing.geojson");
        fs::write(&existing, "old").unwrap();

        for path in [&fresh, &existing] {
            let result: Result<()> = write_atomically(path, |tmp| {
                fs::write(tmp, "{\"type\":\"FeatureCollection\",\"features\":[")?;
                Err(SegmentError::Internal {
                    message: "segmentation failed".to_string(),
                })
            });
            assert!(result.is_err());
            assert!(!temp_path_for(path).exists());
        }

        assert!(!fresh.exists());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "old");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SegmentConfig {
            max_line_units: 0.0,
            ..Default::default()
        };
        let mut out: Vec<SegmentRecord> = Vec::new();
        let err = segment_roads(Vec::new(), incidents(&[]), &config, &mut out).unwrap_err();
        assert!(matches!(err, SegmentError::ConfigError { .. }));
    }
}
