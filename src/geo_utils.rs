//! # Geometry Utilities
//!
//! Planar helpers shared by the pipeline stages. All inputs are in a
//! projected CRS, so lengths and radii are plain Euclidean quantities in map
//! units.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`polyline_length`] | Length of a line string |
//! | [`multi_line_length`] | Summed length of a multi line string |
//! | [`line_envelope`] | R-tree envelope of a line string |
//! | [`rect_envelope`] | R-tree envelope of a rectangle |
//! | [`combined_bounds`] | Union of bounding rectangles |
//! | [`circle_buffer`] | Polygon approximating a buffered point |
//! | [`dedup_coords`] | Exact de-duplication of coordinates |

use std::cmp::Ordering;

use geo::{BoundingRect, Coord, LineString, MultiLineString, Polygon, Rect};
use rstar::AABB;

/// Total planar length of a line string. Empty or single-point lines are 0.0.
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Summed planar length of every part.
pub fn multi_line_length(lines: &MultiLineString<f64>) -> f64 {
    lines.0.iter().map(polyline_length).sum()
}

/// A line with fewer than two coordinates, or with zero length, carries no
/// road geometry worth emitting.
pub fn is_degenerate(line: &LineString<f64>) -> bool {
    line.0.len() < 2 || polyline_length(line) <= 0.0
}

/// Envelope of a rectangle for R-tree queries.
pub fn rect_envelope(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Envelope of a line string, or `None` for empty lines and lines with
/// non-finite coordinates. Callers treat `None` as "no candidates".
pub fn line_envelope(line: &LineString<f64>) -> Option<AABB<[f64; 2]>> {
    let rect = line.bounding_rect()?;
    if !is_finite_rect(&rect) {
        return None;
    }
    Some(rect_envelope(&rect))
}

/// Whether every corner of the rectangle is finite.
pub fn is_finite_rect(rect: &Rect<f64>) -> bool {
    rect.min().x.is_finite()
        && rect.min().y.is_finite()
        && rect.max().x.is_finite()
        && rect.max().y.is_finite()
}

/// Smallest rectangle containing every input rectangle.
pub fn combined_bounds<I>(rects: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = Rect<f64>>,
{
    rects
        .into_iter()
        .filter(is_finite_rect)
        .reduce(|acc, r| {
            Rect::new(
                Coord {
                    x: acc.min().x.min(r.min().x),
                    y: acc.min().y.min(r.min().y),
                },
                Coord {
                    x: acc.max().x.max(r.max().x),
                    y: acc.max().y.max(r.max().y),
                },
            )
        })
}

/// Buffer a point into a regular polygon with `4 * quadrant_segments` sides.
///
/// Vertices lie on the circle, so the polygon is inscribed in the true
/// buffer. The ring is closed and counter-clockwise.
pub fn circle_buffer(center: Coord<f64>, radius: f64, quadrant_segments: u32) -> Polygon<f64> {
    let sides = 4 * quadrant_segments.max(1) as usize;
    let step = std::f64::consts::TAU / sides as f64;
    let ring: Vec<Coord<f64>> = (0..sides)
        .map(|i| {
            let angle = step * i as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    // Polygon::new closes the ring
    Polygon::new(LineString::new(ring), vec![])
}

/// Total ordering of coordinates, x first.
pub fn cmp_coords(a: &Coord<f64>, b: &Coord<f64>) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

/// Sort and remove exact duplicates.
pub fn dedup_coords(mut coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    coords.sort_by(cmp_coords);
    coords.dedup();
    coords
}
