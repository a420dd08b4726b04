//! # Road Tiling
//!
//! Pairwise intersection testing is quadratic in the number of roads, so the
//! working area is cut into a grid of tiles no wider or taller than
//! `tile_max_units`, and intersections are searched for within each tile.
//!
//! A road is assigned to every tile its bounding box touches. Two roads that
//! cross have overlapping bounding boxes, and any point of that overlap lies
//! in some tile, so every crossing is visible in at least one tile.

use geo::{Coord, Rect};
use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::rect_envelope;
use crate::Road;

/// Envelope of one road for R-tree indexing.
#[derive(Debug, Clone, Copy)]
pub struct RoadEnvelope {
    pub idx: usize,
    pub envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RoadEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A grid cell and the roads whose bounding boxes intersect it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub bounds: Rect<f64>,
    /// Indices into the road slice the grid was built from, ascending
    pub road_indices: Vec<usize>,
}

/// Grid over the working area with a spatial index of the roads to bucket.
pub struct TileGrid {
    bounds: Rect<f64>,
    x_divisions: usize,
    y_divisions: usize,
    tile_width: f64,
    tile_height: f64,
    index: RTree<RoadEnvelope>,
}

impl TileGrid {
    /// Build a grid over `bounds` with tiles at most `tile_max_units` on a side.
    ///
    /// `bounds` is expected to cover every road; roads without a usable
    /// envelope are left out of the index.
    pub fn new(roads: &[Road], bounds: Rect<f64>, tile_max_units: f64) -> Self {
        let width = bounds.width();
        let height = bounds.height();
        let x_divisions = divisions(width, tile_max_units);
        let y_divisions = divisions(height, tile_max_units);

        info!("[Tiler] Generating spatial index for intersections");
        let entries: Vec<RoadEnvelope> = roads
            .iter()
            .enumerate()
            .filter_map(|(idx, road)| road.envelope().map(|envelope| RoadEnvelope { idx, envelope }))
            .collect();

        let grid = Self {
            bounds,
            x_divisions,
            y_divisions,
            tile_width: width / x_divisions as f64,
            tile_height: height / y_divisions as f64,
            index: RTree::bulk_load(entries),
        };
        info!("[Tiler] Number of tiles: {}", grid.cell_count());
        grid
    }

    /// Number of grid cells, including ones that will be skipped.
    pub fn cell_count(&self) -> usize {
        self.x_divisions * self.y_divisions
    }

    pub fn divisions(&self) -> (usize, usize) {
        (self.x_divisions, self.y_divisions)
    }

    /// Bounds of the cell at column `x_offset`, row `y_offset`. The last
    /// column and row end exactly on the grid bounds.
    pub fn cell_bounds(&self, x_offset: usize, y_offset: usize) -> Rect<f64> {
        let min = self.bounds.min();
        let max = self.bounds.max();
        let max_x = if x_offset + 1 == self.x_divisions {
            max.x
        } else {
            min.x + (x_offset + 1) as f64 * self.tile_width
        };
        let max_y = if y_offset + 1 == self.y_divisions {
            max.y
        } else {
            min.y + (y_offset + 1) as f64 * self.tile_height
        };
        Rect::new(
            Coord {
                x: min.x + x_offset as f64 * self.tile_width,
                y: min.y + y_offset as f64 * self.tile_height,
            },
            Coord { x: max_x, y: max_y },
        )
    }

    /// Roads whose bounding boxes intersect `cell`.
    pub fn roads_in(&self, cell: &Rect<f64>) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&rect_envelope(cell))
            .map(|entry| entry.idx)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Lazily yield every tile holding more than one road, row by row.
    ///
    /// The iterator can be recreated at will; it does not consume the grid.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.y_divisions)
            .flat_map(move |y| (0..self.x_divisions).map(move |x| (x, y)))
            .filter_map(move |(x, y)| {
                let bounds = self.cell_bounds(x, y);
                let road_indices = self.roads_in(&bounds);
                debug!("[Tiler] Roads in tile ({}, {}): {}", x, y, road_indices.len());
                // 0 or 1 roads cannot cross anything
                (road_indices.len() > 1).then_some(Tile {
                    bounds,
                    road_indices,
                })
            })
    }
}

fn divisions(extent: f64, tile_max_units: f64) -> usize {
    let count = (extent / tile_max_units).ceil();
    if count.is_finite() && count >= 1.0 {
        count as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoadAttributes;
    use geo::{Intersects, LineString};

    fn road(coords: Vec<(f64, f64)>) -> Road {
        Road::new(LineString::from(coords), RoadAttributes::default())
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    #[test]
    fn test_divisions() {
        assert_eq!(divisions(7000.0, 3000.0), 3);
        assert_eq!(divisions(3000.0, 3000.0), 1);
        assert_eq!(divisions(0.0, 3000.0), 1);
    }

    #[test]
    fn test_cell_bounds_cover_grid() {
        let roads = vec![road(vec![(0.0, 0.0), (10.0, 7.0)])];
        let grid = TileGrid::new(&roads, rect(0.0, 0.0, 10.0, 7.0), 3.0);
        assert_eq!(grid.divisions(), (4, 3));
        assert_eq!(grid.cell_count(), 12);
        let last = grid.cell_bounds(3, 2);
        assert_eq!(last.max(), Coord { x: 10.0, y: 7.0 });
        let first = grid.cell_bounds(0, 0);
        assert_eq!(first.min(), Coord { x: 0.0, y: 0.0 });
        assert!((first.width() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_road_tiles_are_skipped() {
        let roads = vec![
            road(vec![(0.0, 0.0), (1.0, 1.0)]),
            road(vec![(9.0, 9.0), (10.0, 10.0)]),
        ];
        let grid = TileGrid::new(&roads, rect(0.0, 0.0, 10.0, 10.0), 5.0);
        assert_eq!(grid.tiles().count(), 0);
    }

    #[test]
    fn test_straddling_road_in_every_tile() {
        let roads = vec![
            road(vec![(0.0, 5.0), (10.0, 5.0)]),
            road(vec![(2.0, 0.0), (2.0, 10.0)]),
            road(vec![(8.0, 0.0), (8.0, 10.0)]),
        ];
        let grid = TileGrid::new(&roads, rect(0.0, 0.0, 10.0, 10.0), 5.0);
        let tiles: Vec<Tile> = grid.tiles().collect();
        // Horizontal road is in all four cells, each vertical road in two
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.road_indices.contains(&0)));

        // Restartable
        assert_eq!(grid.tiles().collect::<Vec<_>>(), tiles);
    }

    #[test]
    fn test_tile_coverage_of_crossing_pairs() {
        let roads: Vec<Road> = (0..6)
            .map(|i| {
                let offset = i as f64 * 17.0;
                road(vec![(offset, 0.0), (100.0 - offset, 100.0)])
            })
            .chain((0..6).map(|i| {
                let y = 5.0 + i as f64 * 15.0;
                road(vec![(0.0, y), (100.0, y + 3.0)])
            }))
            .collect();
        let grid = TileGrid::new(&roads, rect(0.0, 0.0, 100.0, 103.0), 10.0);
        let tiles: Vec<Tile> = grid.tiles().collect();

        for i in 0..roads.len() {
            for j in (i + 1)..roads.len() {
                if roads[i].geometry.intersects(&roads[j].geometry) {
                    assert!(
                        tiles
                            .iter()
                            .any(|t| t.road_indices.contains(&i) && t.road_indices.contains(&j)),
                        "roads {} and {} share no tile",
                        i,
                        j
                    );
                }
            }
        }
    }
}
