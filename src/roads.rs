//! # Road Network Loading and Filtering
//!
//! Roads arrive as a GeoJSON `FeatureCollection` of `LineString` and
//! `MultiLineString` features (an OSM `lines` export reprojected into a
//! metric CRS). Each `MultiLineString` part becomes its own [`Road`] carrying
//! the feature's attributes.
//!
//! The filter keeps a road only when
//! 1. its bounding box intersects the bounding box of at least one incident
//!    buffer (a coarse superset test: extra roads may pass, none that a true
//!    polygon test would keep are dropped), and
//! 2. its attributes describe a plausible vehicle way
//!    ([`RoadAttributes::is_vehicle_way`]).

use std::fs;
use std::path::Path;

use geo::{BoundingRect, Geometry, LineString, Rect};
use geojson::{Feature, GeoJson, JsonObject, JsonValue};
use log::{debug, info};
use rstar::RTree;

use crate::error::{Result, SegmentError};
use crate::geo_utils::combined_bounds;
use crate::records::IncidentBuffer;
use crate::{Road, RoadAttributes};

// ============================================================================
// Reading
// ============================================================================

/// Read a road network GeoJSON file.
pub fn read_road_network(path: impl AsRef<Path>) -> Result<Vec<Road>> {
    let path = path.as_ref();
    info!("[Roads] Reading road network: {}", path.display());
    let text = fs::read_to_string(path).map_err(|e| SegmentError::io(path, e))?;
    parse_road_network(&text)
}

/// Parse road features from GeoJSON text.
pub fn parse_road_network(text: &str) -> Result<Vec<Road>> {
    let geojson: GeoJson = text.parse()?;
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut roads = Vec::with_capacity(features.len());
    for (idx, feature) in features.into_iter().enumerate() {
        roads.extend(roads_from_feature(idx, feature)?);
    }
    info!("[Roads] Number of roads in network: {}", roads.len());
    Ok(roads)
}

fn roads_from_feature(idx: usize, feature: Feature) -> Result<Vec<Road>> {
    let attributes = feature
        .properties
        .as_ref()
        .map(RoadAttributes::from_properties)
        .unwrap_or_default();

    let Some(geometry) = feature.geometry else {
        return Err(SegmentError::InvalidGeometry {
            message: format!("road feature {} has no geometry", idx),
        });
    };
    let geometry: Geometry<f64> = geometry.try_into()?;

    let lines: Vec<LineString<f64>> = match geometry {
        Geometry::LineString(line) => vec![line],
        Geometry::MultiLineString(lines) => lines.0,
        Geometry::Line(line) => vec![LineString::from(line)],
        other => {
            return Err(SegmentError::InvalidGeometry {
                message: format!(
                    "road feature {} is a {}, expected a line",
                    idx,
                    geometry_name(&other)
                ),
            })
        }
    };

    Ok(lines
        .into_iter()
        .filter(|line| line.0.len() >= 2)
        .map(|geometry| Road::new(geometry, attributes.clone()))
        .collect())
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

impl RoadAttributes {
    /// Extract classification attributes from GeoJSON properties.
    pub fn from_properties(props: &JsonObject) -> Self {
        Self {
            highway: props.get("highway").and_then(string_value),
            bridge: props.get("bridge").map(flag_value).unwrap_or(false),
            tunnel: props.get("tunnel").map(flag_value).unwrap_or(false),
            class: props.get("class").map(string_value),
        }
    }

    /// Whether the attributes describe a way worth segmenting.
    ///
    /// Any explicit `highway` category other than `path`/`footway` is kept.
    /// Otherwise `class` decides: a missing key keeps the road, a present key
    /// (null included) keeps it only for a non-bridge, non-tunnel `highway`
    /// class.
    pub fn is_vehicle_way(&self) -> bool {
        match self.highway.as_deref() {
            Some("path") | Some("footway") | None => {}
            Some(_) => return true,
        }
        match &self.class {
            None => true,
            Some(class) => class.as_deref() == Some("highway") && !self.bridge && !self.tunnel,
        }
    }
}

fn string_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn flag_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        JsonValue::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "yes" | "true" | "t" | "y"
        ),
        _ => false,
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Roads that survived filtering, plus the bounds of the unfiltered network.
#[derive(Debug, Clone)]
pub struct FilteredRoads {
    /// Kept roads in source order
    pub roads: Vec<Road>,
    /// Bounding box of every road read, before filtering
    pub bounds: Option<Rect<f64>>,
    /// Number of roads before filtering
    pub total: usize,
}

/// Returns true if the road should be considered for segmentation.
///
/// A road without a usable envelope, or with no incident buffer near it, is
/// discarded before its attributes are looked at.
pub fn should_keep_road(road: &Road, incident_index: &RTree<IncidentBuffer>) -> bool {
    let Some(envelope) = road.envelope() else {
        return false;
    };
    if incident_index
        .locate_in_envelope_intersecting(&envelope)
        .next()
        .is_none()
    {
        return false;
    }
    road.attributes.is_vehicle_way()
}

/// Keep the roads near incidents that look like vehicle ways.
///
/// The incident buffers are consumed: they are not needed once the filter has
/// run.
pub fn filter_roads(roads: Vec<Road>, incident_buffers: Vec<IncidentBuffer>) -> FilteredRoads {
    let total = roads.len();
    let bounds = combined_bounds(roads.iter().filter_map(|r| r.geometry.bounding_rect()));

    let incident_index = RTree::bulk_load(incident_buffers);
    debug!(
        "[RoadFilter] Indexed {} incident buffers",
        incident_index.size()
    );

    let kept: Vec<Road> = roads
        .into_iter()
        .filter(|road| should_keep_road(road, &incident_index))
        .collect();

    info!(
        "[RoadFilter] Number of roads after filtering: {} of {}",
        kept.len(),
        total
    );

    FilteredRoads {
        roads: kept,
        bounds,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use serde_json::json;

    fn props(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn road(coords: Vec<(f64, f64)>, attributes: RoadAttributes) -> Road {
        Road::new(LineString::from(coords), attributes)
    }

    fn incident(x: f64, y: f64) -> IncidentBuffer {
        IncidentBuffer::new(Coord { x, y }, 5.0, 8)
    }

    #[test]
    fn test_attributes_from_properties() {
        let attrs = RoadAttributes::from_properties(&props(json!({
            "highway": "primary",
            "bridge": 1,
            "tunnel": "no",
            "class": null,
        })));
        assert_eq!(attrs.highway.as_deref(), Some("primary"));
        assert!(attrs.bridge);
        assert!(!attrs.tunnel);
        assert_eq!(attrs.class, Some(None));

        let attrs = RoadAttributes::from_properties(&props(json!({"highway": "footway"})));
        assert_eq!(attrs.class, None);
    }

    #[test]
    fn test_vehicle_way_rules() {
        let primary = RoadAttributes {
            highway: Some("primary".into()),
            bridge: true,
            ..Default::default()
        };
        assert!(primary.is_vehicle_way());

        // Unknown highway and no class key: keep
        assert!(RoadAttributes::default().is_vehicle_way());

        // A null class is still a class that is not `highway`
        let footway_null_class = RoadAttributes {
            highway: Some("footway".into()),
            class: Some(None),
            ..Default::default()
        };
        assert!(!footway_null_class.is_vehicle_way());

        let footway_highway_class = RoadAttributes {
            highway: Some("footway".into()),
            class: Some(Some("highway".into())),
            ..Default::default()
        };
        assert!(footway_highway_class.is_vehicle_way());

        let bridge = RoadAttributes {
            class: Some(Some("highway".into())),
            bridge: true,
            ..Default::default()
        };
        assert!(!bridge.is_vehicle_way());

        let tunnel = RoadAttributes {
            highway: Some("path".into()),
            class: Some(Some("highway".into())),
            tunnel: true,
            ..Default::default()
        };
        assert!(!tunnel.is_vehicle_way());

        let railway = RoadAttributes {
            class: Some(Some("railway".into())),
            ..Default::default()
        };
        assert!(!railway.is_vehicle_way());
    }

    #[test]
    fn test_parse_multilinestring_feature() {
        let text = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"highway": "residential"},
                "geometry": {
                    "type": "MultiLineString",
                    "coordinates": [[[0.0, 0.0], [10.0, 0.0]], [[20.0, 0.0], [30.0, 0.0]]]
                }
            }, {
                "type": "Feature",
                "properties": {"highway": "service"},
                "geometry": {"type": "LineString", "coordinates": [[0.0, 5.0], [0.0, 9.0]]}
            }]
        })
        .to_string();

        let roads = parse_road_network(&text).unwrap();
        assert_eq!(roads.len(), 3);
        assert_eq!(roads[1].attributes.highway.as_deref(), Some("residential"));
        assert_eq!(roads[2].geometry.0.len(), 2);
    }

    #[test]
    fn test_parse_rejects_polygons() {
        let text = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            }
        })
        .to_string();
        assert!(matches!(
            parse_road_network(&text),
            Err(SegmentError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_filter_discards_roads_without_incidents() {
        let near = road(vec![(0.0, 0.0), (100.0, 0.0)], RoadAttributes::default());
        let far = road(vec![(1000.0, 1000.0), (1100.0, 1000.0)], RoadAttributes::default());

        let filtered = filter_roads(vec![near.clone(), far], vec![incident(50.0, 3.0)]);
        assert_eq!(filtered.total, 2);
        assert_eq!(filtered.roads, vec![near]);

        // Tiling bounds still cover the discarded road
        let bounds = filtered.bounds.unwrap();
        assert_eq!(bounds.max(), Coord { x: 1100.0, y: 1000.0 });
    }

    #[test]
    fn test_filter_discards_bridge_near_incident() {
        let bridge = road(
            vec![(0.0, 0.0), (100.0, 0.0)],
            RoadAttributes {
                class: Some(Some("highway".into())),
                bridge: true,
                ..Default::default()
            },
        );
        let filtered = filter_roads(vec![bridge], vec![incident(50.0, 0.0)]);
        assert!(filtered.roads.is_empty());
    }

    #[test]
    fn test_filter_discards_footway_with_null_class() {
        let attributes = RoadAttributes::from_properties(&props(json!({
            "highway": "footway",
            "class": null,
            "bridge": 0,
            "tunnel": 0,
        })));
        let footway = road(vec![(0.0, 0.0), (100.0, 0.0)], attributes);
        let residential = road(
            vec![(0.0, 10.0), (100.0, 10.0)],
            RoadAttributes::from_properties(&props(json!({"highway": "residential"}))),
        );

        let filtered = filter_roads(vec![footway, residential.clone()], vec![incident(50.0, 5.0)]);
        assert_eq!(filtered.roads, vec![residential]);
    }

    #[test]
    fn test_bbox_superset_property() {
        // A diagonal road whose bounding box touches the incident buffer's
        // bounding box is kept even though the polygons do not meet.
        let diagonal = road(vec![(0.0, 0.0), (100.0, 100.0)], RoadAttributes::default());
        let filtered = filter_roads(vec![diagonal], vec![incident(95.0, 5.0)]);
        assert_eq!(filtered.roads.len(), 1);

        for kept in &filtered.roads {
            let env = kept.envelope().unwrap();
            let tree = RTree::bulk_load(vec![incident(95.0, 5.0)]);
            assert!(tree.locate_in_envelope_intersecting(&env).next().is_some());
        }
    }
}
