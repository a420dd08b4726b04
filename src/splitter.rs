//! # Road Splitting
//!
//! Cuts the filtered roads into the final segments.
//!
//! Every road is intersected with the junction zones it touches. The parts
//! inside a zone are gathered per zone and become one intersection segment
//! each; whatever lies outside all zones becomes plain segments, halved at the
//! arc-length midpoint until no piece is longer than `max_line_units`.
//!
//! Output order: intersection segments in zone order, then plain segments in
//! road order.

use std::collections::BTreeMap;

use geo::{BooleanOps, BoundingRect, Coord, Intersects, LineString, MultiLineString, MultiPolygon};
use log::{debug, info};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;

use crate::geo_utils::{is_degenerate, is_finite_rect, polyline_length};
use crate::{Road, Segment};

type IndexedZone = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Split a line into pieces no longer than `max_len`.
///
/// A line longer than `max_len` is halved at the midpoint of its length,
/// and each half is split again in the same way. The cut reuses a vertex when
/// the midpoint lands exactly on one, and otherwise inserts an interpolated
/// vertex. Pieces come out in order along the line.
pub fn split_line(line: &LineString<f64>, max_len: f64) -> Vec<LineString<f64>> {
    let mut pieces = Vec::new();
    let mut pending = vec![line.clone()];

    while let Some(piece) = pending.pop() {
        let length = polyline_length(&piece);
        if length <= max_len || !length.is_finite() || max_len <= 0.0 {
            pieces.push(piece);
            continue;
        }
        match halve(&piece, length / 2.0) {
            Some((first, second)) => {
                // Second half goes on the stack first so pieces stay ordered
                pending.push(second);
                pending.push(first);
            }
            None => pieces.push(piece),
        }
    }
    pieces
}

/// Cut `line` at distance `target` from its start.
fn halve(line: &LineString<f64>, target: f64) -> Option<(LineString<f64>, LineString<f64>)> {
    let coords = &line.0;
    let mut walked = 0.0;

    for (i, segment) in line.lines().enumerate() {
        let seg_len = segment.dx().hypot(segment.dy());
        if seg_len <= 0.0 || walked + seg_len < target {
            walked += seg_len;
            continue;
        }

        let t = ((target - walked) / seg_len).clamp(0.0, 1.0);
        let cut = if t >= 1.0 {
            segment.end
        } else {
            Coord {
                x: segment.start.x + t * segment.dx(),
                y: segment.start.y + t * segment.dy(),
            }
        };

        let mut first: Vec<Coord<f64>> = coords[..=i].to_vec();
        if first.last() != Some(&cut) {
            first.push(cut);
        }
        let mut second = vec![cut];
        second.extend(coords[i + 1..].iter().copied().skip_while(|c| *c == cut));

        if first.len() < 2 || second.len() < 2 {
            return None;
        }
        return Some((LineString::new(first), LineString::new(second)));
    }
    None
}

/// Pieces of one road: inside pieces keyed by zone, and outside pieces.
struct RoadPieces {
    inside: Vec<(usize, Vec<LineString<f64>>)>,
    outside: Vec<LineString<f64>>,
}

/// Cut every road against the intersection zones and length-split the rest.
///
/// The zones are consumed and released once splitting is done.
pub fn split_segments(roads: &[Road], zones: MultiPolygon<f64>, max_len: f64) -> Vec<Segment> {
    let index: RTree<IndexedZone> = RTree::bulk_load(
        zones
            .0
            .iter()
            .enumerate()
            .filter_map(|(idx, zone)| {
                let rect = zone.bounding_rect()?;
                is_finite_rect(&rect).then(|| {
                    GeomWithData::new(
                        Rectangle::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                        idx,
                    )
                })
            })
            .collect(),
    );

    let per_road: Vec<RoadPieces> = roads
        .iter()
        .map(|road| cut_road(road, &zones, &index, max_len))
        .collect();

    let mut by_zone: BTreeMap<usize, Vec<LineString<f64>>> = BTreeMap::new();
    let mut plain: Vec<Segment> = Vec::new();
    for pieces in per_road {
        for (zone_idx, inside) in pieces.inside {
            by_zone.entry(zone_idx).or_default().extend(inside);
        }
        plain.extend(pieces.outside.into_iter().map(Segment::Plain));
    }

    let mut segments: Vec<Segment> = by_zone
        .into_values()
        .map(dedup_pieces)
        .filter(|lines| !lines.is_empty())
        .map(|lines| Segment::Intersection(MultiLineString::new(lines)))
        .collect();
    info!(
        "[Splitter] Number of intersection segments: {}",
        segments.len()
    );
    info!("[Splitter] Number of plain segments: {}", plain.len());

    drop(index);
    drop(zones);
    debug!("[Splitter] Released intersection zones");

    segments.extend(plain);
    segments
}

fn cut_road(
    road: &Road,
    zones: &MultiPolygon<f64>,
    index: &RTree<IndexedZone>,
    max_len: f64,
) -> RoadPieces {
    let mut hits: Vec<usize> = match road.envelope() {
        Some(envelope) => index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .filter(|&idx| zones.0[idx].intersects(&road.geometry))
            .collect(),
        None => Vec::new(),
    };
    hits.sort_unstable();

    if hits.is_empty() {
        return RoadPieces {
            inside: Vec::new(),
            outside: split_line(&road.geometry, max_len),
        };
    }

    let road_lines = MultiLineString::new(vec![road.geometry.clone()]);
    let inside = hits
        .iter()
        .map(|&idx| {
            let clipped = zones.0[idx].clip(&road_lines, false);
            let kept: Vec<LineString<f64>> =
                clipped.0.into_iter().filter(|l| !is_degenerate(l)).collect();
            (idx, kept)
        })
        .collect();

    let touched = MultiPolygon::new(hits.iter().map(|&idx| zones.0[idx].clone()).collect());
    let outside = touched
        .clip(&road_lines, true)
        .0
        .into_iter()
        .filter(|l| !is_degenerate(l))
        .flat_map(|piece| split_line(&piece, max_len))
        .collect();

    RoadPieces { inside, outside }
}

/// Drop pieces that repeat an earlier one in either direction.
fn dedup_pieces(pieces: Vec<LineString<f64>>) -> Vec<LineString<f64>> {
    let mut kept: Vec<LineString<f64>> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let mut reversed = piece.clone();
        reversed.0.reverse();
        if !kept.iter().any(|k| *k == piece || *k == reversed) {
            kept.push(piece);
        }
    }
    kept
}
