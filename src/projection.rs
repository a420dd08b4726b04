//! # Coordinate Reprojection
//!
//! Converts incident coordinates from the record CRS into the road network's
//! CRS with PROJ. Any pair of EPSG codes known to the PROJ database can be
//! combined: national grids, state planes, UTM zones, Web Mercator.
//! Coordinates are always `(x, y)` ordered, i.e. longitude first for
//! geographic systems.
//!
//! A point PROJ cannot transform (latitudes beyond the poles, non-finite
//! input) gives [`SegmentError::Projection`], which the record reader treats
//! as a per-row failure.

use std::fmt;
use std::str::FromStr;

use log::debug;
use proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };
    pub const WEB_MERCATOR: Crs = Crs { epsg: 3857 };

    /// Create a CRS from an EPSG code. Whether PROJ knows the code is only
    /// checked once a [`Reprojector`] is built.
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        if epsg == 0 {
            return Err(SegmentError::UnsupportedCrs {
                crs: "EPSG:0".to_string(),
                message: "EPSG codes start at 1".to_string(),
            });
        }
        Ok(Crs { epsg })
    }

    /// OGC URN used when tagging GeoJSON output.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg)
    }

    fn is_geographic_wgs84(&self) -> bool {
        *self == Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = SegmentError;

    /// Accepts `epsg:4326`, `EPSG:4326` or a bare `4326`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let unsupported = |message: &str| SegmentError::UnsupportedCrs {
            crs: trimmed.to_string(),
            message: message.to_string(),
        };
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(unsupported("only EPSG codes are accepted")),
            None => trimmed,
        };
        let epsg = code
            .trim()
            .parse::<u32>()
            .map_err(|_| unsupported("not a numeric EPSG code"))?;
        Crs::from_epsg(epsg)
    }
}

impl TryFrom<String> for Crs {
    type Error = SegmentError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Forward transform between two coordinate reference systems.
///
/// Same-CRS transforms skip PROJ entirely.
pub struct Reprojector {
    source: Crs,
    target: Crs,
    proj: Option<Proj>,
}

impl Reprojector {
    /// Build a transform from `source` to `target`.
    ///
    /// Fails with [`SegmentError::UnsupportedCrs`] when PROJ cannot build a
    /// transform between the two codes.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        if source == target {
            return Ok(Self {
                source,
                target,
                proj: None,
            });
        }

        let proj = Proj::new_known_crs(&source.to_string(), &target.to_string(), None).map_err(
            |e| SegmentError::UnsupportedCrs {
                crs: format!("{} -> {}", source, target),
                message: e.to_string(),
            },
        )?;
        debug!("[Reprojector] Built transform {} -> {}", source, target);

        Ok(Self {
            source,
            target,
            proj: Some(proj),
        })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn target(&self) -> Crs {
        self.target
    }

    /// Whether the transform is the identity.
    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    /// Reproject a single `(x, y)` coordinate.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return Err(projection_error(x, y, "non-finite coordinate"));
        }
        // PROJ wraps longitudes silently; out-of-range degrees are bad rows
        if self.source.is_geographic_wgs84() && (y.abs() > 90.0 || x.abs() > 180.0) {
            return Err(projection_error(x, y, "longitude/latitude out of range"));
        }

        let Some(proj) = &self.proj else {
            return Ok((x, y));
        };
        let (out_x, out_y) = proj
            .convert((x, y))
            .map_err(|e| projection_error(x, y, &e.to_string()))?;

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(projection_error(x, y, "transform produced a non-finite result"));
        }
        Ok((out_x, out_y))
    }
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

fn projection_error(x: f64, y: f64, message: &str) -> SegmentError {
    SegmentError::Projection {
        x,
        y,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("EPSG:3857".parse::<Crs>().unwrap(), Crs::WEB_MERCATOR);
        assert_eq!("32702".parse::<Crs>().unwrap().epsg, 32702);
        assert_eq!("epsg:2193".parse::<Crs>().unwrap().epsg, 2193);
        assert!("esri:102100".parse::<Crs>().is_err());
        assert!("epsg:abc".parse::<Crs>().is_err());
        assert!(Crs::from_epsg(0).is_err());
    }

    #[test]
    fn test_crs_serde_as_string() {
        let json = serde_json::to_string(&Crs::WGS84).unwrap();
        assert_eq!(json, "\"EPSG:4326\"");
        let crs: Crs = serde_json::from_str("\"epsg:27700\"").unwrap();
        assert_eq!(crs.epsg, 27700);
    }

    #[test]
    fn test_identity_transform() {
        let proj = Reprojector::new(Crs::WGS84, Crs::WGS84).unwrap();
        assert!(proj.is_identity());
        assert_eq!(proj.transform(12.5, 41.9).unwrap(), (12.5, 41.9));
        assert!(proj.transform(12.5, 95.0).is_err());
    }

    #[test]
    fn test_web_mercator() {
        let proj = Reprojector::new(Crs::WGS84, Crs::WEB_MERCATOR).unwrap();
        assert!(!proj.is_identity());
        let (x, y) = proj.transform(180.0, 0.0).unwrap();
        assert!(approx_eq(x, 20_037_508.342_789_244, 1e-3));
        assert!(approx_eq(y, 0.0, 1e-6));
    }

    #[test]
    fn test_utm_central_meridian_on_equator() {
        // Zone 31 is centred on 3°E
        let proj = Reprojector::new(Crs::WGS84, Crs::from_epsg(32631).unwrap()).unwrap();
        let (x, y) = proj.transform(3.0, 0.0).unwrap();
        assert!(approx_eq(x, 500_000.0, 1e-3));
        assert!(approx_eq(y, 0.0, 1e-3));
    }

    #[test]
    fn test_utm_round_trip() {
        let utm = Crs::from_epsg(32702).unwrap();
        let forward = Reprojector::new(Crs::WGS84, utm).unwrap();
        let inverse = Reprojector::new(utm, Crs::WGS84).unwrap();

        let (x, y) = forward.transform(-171.76, -13.83).unwrap();
        assert!(y > 8_000_000.0, "south zone adds a false northing");
        let (lon, lat) = inverse.transform(x, y).unwrap();
        assert!(approx_eq(lon, -171.76, 1e-6));
        assert!(approx_eq(lat, -13.83, 1e-6));
    }

    #[test]
    fn test_national_grids() {
        // Wellington in New Zealand Transverse Mercator
        let nztm = Reprojector::new(Crs::WGS84, Crs::from_epsg(2193).unwrap()).unwrap();
        let (x, y) = nztm.transform(174.7762, -41.2865).unwrap();
        assert!(x > 1_700_000.0 && x < 1_800_000.0, "easting {}", x);
        assert!(y > 5_400_000.0 && y < 5_460_000.0, "northing {}", y);

        for epsg in [27700, 2263, 3395] {
            assert!(
                Reprojector::new(Crs::WGS84, Crs::from_epsg(epsg).unwrap()).is_ok(),
                "EPSG:{} should be available",
                epsg
            );
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        let err = Reprojector::new(Crs::WGS84, Crs { epsg: 999_999 }).unwrap_err();
        assert!(matches!(err, SegmentError::UnsupportedCrs { .. }));
    }

    #[test]
    fn test_out_of_domain_rejected() {
        let proj = Reprojector::new(Crs::WGS84, Crs::from_epsg(32702).unwrap()).unwrap();
        let err = proj.transform(-171.76, 95.0).unwrap_err();
        assert!(matches!(err, SegmentError::Projection { .. }));
        assert!(proj.transform(f64::NAN, 0.0).is_err());
        assert!(proj.transform(200.0, 0.0).is_err());
    }
}
