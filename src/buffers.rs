//! # Intersection Buffers
//!
//! Turns the intersection points of every tile into one multi-polygon of
//! disjoint junction zones.
//!
//! Points are circled by `intersection_buffer_units`. Instead of folding every
//! circle into a single polygon, circles are first grouped by whether they can
//! touch (centres no more than two radii apart) and each group is unioned on
//! its own. Groups cannot overlap each other, so their union is just the
//! concatenation of the group polygons.

use geo::{BooleanOps, Coord, MultiPoint, MultiPolygon, Polygon};
use log::{debug, info};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::geo_utils::{circle_buffer, dedup_coords};
use crate::union_find::DisjointSets;

type IndexedCenter = GeomWithData<[f64; 2], usize>;

/// Buffer every intersection point and dissolve overlapping buffers.
///
/// Points found in several tiles are buffered once. An empty input gives an
/// empty multi-polygon.
pub fn build_intersection_buffers(
    tile_points: Vec<MultiPoint<f64>>,
    radius: f64,
    quadrant_segments: u32,
) -> MultiPolygon<f64> {
    let centers = dedup_coords(
        tile_points
            .into_iter()
            .flat_map(|mp| mp.0.into_iter().map(|p| p.0))
            .collect(),
    );
    info!(
        "[IntersectionBuffers] Buffering {} intersection points",
        centers.len()
    );

    let polygons: Vec<Polygon<f64>> = cluster_centers(&centers, radius)
        .into_iter()
        .flat_map(|group| {
            let circles: Vec<Polygon<f64>> = group
                .iter()
                .map(|&idx| circle_buffer(centers[idx], radius, quadrant_segments))
                .collect();
            dissolve(circles).0
        })
        .collect();

    info!(
        "[IntersectionBuffers] Number of intersection buffers: {}",
        polygons.len()
    );
    MultiPolygon::new(polygons)
}

/// Group centres whose circles may overlap.
fn cluster_centers(centers: &[Coord<f64>], radius: f64) -> Vec<Vec<usize>> {
    let index: RTree<IndexedCenter> = RTree::bulk_load(
        centers
            .iter()
            .enumerate()
            .map(|(idx, c)| GeomWithData::new([c.x, c.y], idx))
            .collect(),
    );

    let reach = 2.0 * radius;
    let mut sets = DisjointSets::new(centers.len());
    for (idx, c) in centers.iter().enumerate() {
        for neighbor in index.locate_within_distance([c.x, c.y], reach * reach) {
            if neighbor.data > idx {
                sets.union(idx, neighbor.data);
            }
        }
    }

    let groups = sets.groups();
    debug!(
        "[IntersectionBuffers] {} points fall into {} clusters",
        centers.len(),
        groups.len()
    );
    groups
}

/// Union a handful of polygons.
fn dissolve(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = polygons.into_iter();
    let Some(first) = iter.next() else {
        return MultiPolygon::new(Vec::new());
    };
    iter.fold(MultiPolygon::new(vec![first]), |acc, polygon| {
        acc.union(&MultiPolygon::new(vec![polygon]))
    })
}
