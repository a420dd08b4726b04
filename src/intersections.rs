//! # Intersection Discovery
//!
//! Finds the points where roads cross, one tile at a time.
//!
//! ## Classification
//!
//! The intersection of two roads is classified as a [`Crossing`] and reduced
//! to points:
//! - a single point or several points are kept as they are;
//! - a shared stretch (roads running collinear) contributes only its two ends,
//!   the first coordinate of the first part and the last coordinate of the
//!   last part, so overlaps behave like junctions at their boundary;
//! - a mixed result contributes the points of its point members.
//!
//! Points from all pairs in a tile are de-duplicated and returned as a
//! `MultiPoint`, even when there is only one.
//!
//! ## Parallelism
//!
//! Tiles are independent. With the `parallel` feature they are spread over the
//! current rayon pool and the results are gathered only once every tile has
//! finished.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BoundingRect, Coord, Intersects, Line, LineString, MultiPoint, Point};
use log::info;

use crate::geo_utils::dedup_coords;
use crate::tiles::{Tile, TileGrid};
use crate::Road;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Shape of the intersection between two roads.
#[derive(Debug, Clone, PartialEq)]
pub enum Crossing {
    Point(Coord<f64>),
    MultiPoint(Vec<Coord<f64>>),
    /// One shared stretch
    Line(LineString<f64>),
    /// Several shared stretches, ordered along the first road
    MultiLine(Vec<LineString<f64>>),
    /// Points and shared stretches together
    Collection(Vec<Crossing>),
}

impl Crossing {
    /// Append the junction points this crossing stands for.
    pub fn collect_points(&self, out: &mut Vec<Coord<f64>>) {
        match self {
            Crossing::Point(c) => out.push(*c),
            Crossing::MultiPoint(coords) => out.extend(coords.iter().copied()),
            Crossing::Line(line) => push_ends(std::slice::from_ref(line), out),
            Crossing::MultiLine(lines) => push_ends(lines, out),
            Crossing::Collection(members) => {
                for member in members {
                    member.collect_member_points(out);
                }
            }
        }
    }

    /// Members of a collection only contribute their points.
    fn collect_member_points(&self, out: &mut Vec<Coord<f64>>) {
        match self {
            Crossing::Point(c) => out.push(*c),
            Crossing::MultiPoint(coords) => out.extend(coords.iter().copied()),
            Crossing::Line(_) | Crossing::MultiLine(_) => {}
            Crossing::Collection(members) => {
                for member in members {
                    member.collect_member_points(out);
                }
            }
        }
    }
}

fn push_ends(lines: &[LineString<f64>], out: &mut Vec<Coord<f64>>) {
    let first = lines.first().and_then(|l| l.0.first());
    let last = lines.last().and_then(|l| l.0.last());
    if let (Some(first), Some(last)) = (first, last) {
        out.push(*first);
        out.push(*last);
    }
}

/// Intersect two roads. Returns `None` when they do not touch.
pub fn road_crossing(a: &LineString<f64>, b: &LineString<f64>) -> Option<Crossing> {
    let mut points: Vec<Coord<f64>> = Vec::new();
    // (segment of `a`, position along it, overlap oriented like `a`)
    let mut overlaps: Vec<(usize, f64, Line<f64>)> = Vec::new();

    for (seg_idx, seg_a) in a.lines().enumerate() {
        let rect_a = seg_a.bounding_rect();
        for seg_b in b.lines() {
            if !rect_a.intersects(&seg_b.bounding_rect()) {
                continue;
            }
            match line_intersection(seg_a, seg_b) {
                None => {}
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(intersection);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    if intersection.start == intersection.end {
                        points.push(intersection.start);
                        continue;
                    }
                    let piece = orient_along(intersection, &seg_a);
                    overlaps.push((seg_idx, position_on(&seg_a, piece.start), piece));
                }
            }
        }
    }

    overlaps.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.total_cmp(&y.1)));
    overlaps.dedup_by(|x, y| x.2 == y.2);
    let lines = chain_overlaps(overlaps.into_iter().map(|(_, _, piece)| piece));

    // Points on a shared stretch are represented by the stretch itself
    points.retain(|p| !lines.iter().any(|line| line.intersects(p)));
    let points = dedup_coords(points);

    let point_part = match points.len() {
        0 => None,
        1 => Some(Crossing::Point(points[0])),
        _ => Some(Crossing::MultiPoint(points)),
    };
    let line_part = match lines.len() {
        0 => None,
        1 => lines.into_iter().next().map(Crossing::Line),
        _ => Some(Crossing::MultiLine(lines)),
    };

    match (point_part, line_part) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(l)) => Some(l),
        (Some(p), Some(l)) => Some(Crossing::Collection(vec![p, l])),
    }
}

fn orient_along(piece: Line<f64>, segment: &Line<f64>) -> Line<f64> {
    let dot = piece.dx() * segment.dx() + piece.dy() * segment.dy();
    if dot < 0.0 {
        Line::new(piece.end, piece.start)
    } else {
        piece
    }
}

/// Parametric position of `c` along `segment`.
fn position_on(segment: &Line<f64>, c: Coord<f64>) -> f64 {
    let len_sq = segment.dx() * segment.dx() + segment.dy() * segment.dy();
    if len_sq == 0.0 {
        return 0.0;
    }
    ((c.x - segment.start.x) * segment.dx() + (c.y - segment.start.y) * segment.dy()) / len_sq
}

/// Join consecutive overlap pieces that share an endpoint.
fn chain_overlaps<I>(pieces: I) -> Vec<LineString<f64>>
where
    I: IntoIterator<Item = Line<f64>>,
{
    let mut chains: Vec<Vec<Coord<f64>>> = Vec::new();
    for piece in pieces {
        match chains.last_mut() {
            Some(chain) if chain.last() == Some(&piece.start) => chain.push(piece.end),
            _ => chains.push(vec![piece.start, piece.end]),
        }
    }
    chains.into_iter().map(LineString::new).collect()
}

/// Intersection points among a set of roads, de-duplicated.
///
/// Every unordered pair is tested; pairs whose bounding boxes are apart are
/// skipped before any segment work.
pub fn find_intersections(roads: &[&LineString<f64>]) -> MultiPoint<f64> {
    let rects: Vec<_> = roads.iter().map(|r| r.bounding_rect()).collect();
    let mut points: Vec<Coord<f64>> = Vec::new();

    for i in 0..roads.len() {
        for j in (i + 1)..roads.len() {
            let (Some(ri), Some(rj)) = (rects[i], rects[j]) else {
                continue;
            };
            if !ri.intersects(&rj) {
                continue;
            }
            if let Some(crossing) = road_crossing(roads[i], roads[j]) {
                crossing.collect_points(&mut points);
            }
        }
    }

    MultiPoint::new(dedup_coords(points).into_iter().map(Point::from).collect())
}

/// Intersection points among the roads of one tile.
pub fn find_tile_intersections(roads: &[Road], tile: &Tile) -> MultiPoint<f64> {
    let tile_roads: Vec<&LineString<f64>> = tile
        .road_indices
        .iter()
        .filter_map(|&idx| roads.get(idx).map(|r| &r.geometry))
        .collect();
    find_intersections(&tile_roads)
}

/// Intersection points of every tile in the grid, one `MultiPoint` per tile.
///
/// Runs on the current rayon pool and blocks until all tiles are done.
pub fn find_all_intersections(roads: &[Road], grid: &TileGrid) -> Vec<MultiPoint<f64>> {
    #[cfg(feature = "parallel")]
    let tile_intersections: Vec<MultiPoint<f64>> = {
        info!(
            "[Intersections] Searching tiles on {} workers",
            rayon::current_num_threads()
        );
        grid.tiles()
            .par_bridge()
            .map(|tile| find_tile_intersections(roads, &tile))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let tile_intersections: Vec<MultiPoint<f64>> = {
        info!("[Intersections] Searching tiles sequentially");
        grid.tiles()
            .map(|tile| find_tile_intersections(roads, &tile))
            .collect()
    };

    info!(
        "[Intersections] Found {} intersection points across {} tiles",
        tile_intersections.iter().map(|mp| mp.0.len()).sum::<usize>(),
        tile_intersections.len()
    );
    tile_intersections
}
