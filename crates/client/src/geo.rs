//! GeoJSON shapes used by geo predicates
//!
//! Supports `Point`, `Polygon` and the `AeroCircle` extension
//! (`{"type": "AeroCircle", "coordinates": [[lng, lat], radius_m]}`).
//! Coordinates are `[longitude, latitude]` in degrees. Polygon containment
//! is tested on the plane of those degrees; circle containment uses the
//! great-circle distance.

use aeroclient_core::{Error, Result, ResultCode};
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// `[longitude, latitude]`
pub type Coord = [f64; 2];

/// A parsed GeoJSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeoShape {
    /// Single position
    Point(Coord),
    /// Exterior ring followed by holes; every ring is closed
    Polygon(Vec<Vec<Coord>>),
    /// Center and radius in meters
    AeroCircle(Coord, f64),
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ResultCode::GeoInvalidGeoJson, message)
}

fn check_coord(c: &Coord) -> Result<()> {
    let [lng, lat] = *c;
    if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
        return Err(invalid(format!("coordinate [{}, {}] out of range", lng, lat)));
    }
    Ok(())
}

impl GeoShape {
    /// Parse and check a GeoJSON string
    pub fn parse(json: &str) -> Result<Self> {
        let shape: GeoShape =
            serde_json::from_str(json).map_err(|e| invalid(format!("invalid GeoJSON: {}", e)))?;
        shape.check()?;
        Ok(shape)
    }

    fn check(&self) -> Result<()> {
        match self {
            GeoShape::Point(c) => check_coord(c),
            GeoShape::Polygon(rings) => {
                if rings.is_empty() {
                    return Err(invalid("polygon has no rings"));
                }
                for ring in rings {
                    if ring.len() < 4 || ring.first() != ring.last() {
                        return Err(invalid("polygon rings need 4 or more points and must close"));
                    }
                    ring.iter().try_for_each(check_coord)?;
                }
                Ok(())
            }
            GeoShape::AeroCircle(center, radius) => {
                check_coord(center)?;
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(invalid(format!("circle radius must be positive, got {}", radius)));
                }
                Ok(())
            }
        }
    }

    /// Serialize back to a GeoJSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whether this shape encloses an area
    pub fn is_region(&self) -> bool {
        !matches!(self, GeoShape::Point(_))
    }

    /// Whether the region covers `point`; a point covers nothing
    pub fn covers(&self, point: Coord) -> bool {
        match self {
            GeoShape::Point(_) => false,
            GeoShape::Polygon(rings) => {
                let mut rings = rings.iter();
                rings.next().is_some_and(|outer| in_ring(outer, point))
                    && !rings.any(|hole| in_ring(hole, point))
            }
            GeoShape::AeroCircle(center, radius) => distance_m(*center, point) <= *radius,
        }
    }
}

/// Even-odd ray casting
fn in_ring(ring: &[Coord], [x, y]: Coord) -> bool {
    let mut inside = false;
    for edge in ring.windows(2) {
        let ([x1, y1], [x2, y2]) = (edge[0], edge[1]);
        if (y1 > y) != (y2 > y) && x < (x2 - x1) * (y - y1) / (y2 - y1) + x1 {
            inside = !inside;
        }
    }
    inside
}

/// Haversine distance in meters
pub fn distance_m([lng1, lat1]: Coord, [lng2, lat2]: Coord) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lng2 - lng1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str =
        r#"{"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}"#;

    #[test]
    fn test_parse_shapes() {
        assert_eq!(
            GeoShape::parse(r#"{"type": "Point", "coordinates": [-122.0, 37.5]}"#).unwrap(),
            GeoShape::Point([-122.0, 37.5])
        );
        let circle = GeoShape::parse(r#"{"type":"AeroCircle","coordinates":[[1.5,2.5],300]}"#)
            .unwrap();
        assert_eq!(circle, GeoShape::AeroCircle([1.5, 2.5], 300.0));
        assert!(circle.is_region());
        assert_eq!(GeoShape::parse(&circle.to_json()).unwrap(), circle);
    }

    #[test]
    fn test_invalid_geojson() {
        for bad in [
            "not json",
            r#"{"type": "Line", "coordinates": [0, 0]}"#,
            r#"{"type": "Point", "coordinates": [200, 0]}"#,
            r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1]]]}"#,
            r#"{"type": "AeroCircle", "coordinates": [[0,0], -5]}"#,
        ] {
            let err = GeoShape::parse(bad).unwrap_err();
            assert_eq!(err.code(), ResultCode::GeoInvalidGeoJson, "{}", bad);
        }
    }

    #[test]
    fn test_polygon_cover_with_hole() {
        let square = GeoShape::parse(SQUARE).unwrap();
        assert!(square.covers([5.0, 5.0]));
        assert!(!square.covers([15.0, 5.0]));
        let holed = GeoShape::Polygon(vec![
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
            vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]],
        ]);
        assert!(!holed.covers([5.0, 5.0]));
        assert!(holed.covers([2.0, 2.0]));
        assert!(!GeoShape::Point([5.0, 5.0]).covers([5.0, 5.0]));
    }

    #[test]
    fn test_circle_cover() {
        // One degree of latitude is about 111 km
        let circle = GeoShape::AeroCircle([0.0, 0.0], 120_000.0);
        assert!(circle.covers([0.0, 1.0]));
        assert!(!circle.covers([0.0, 1.2]));
        let d = distance_m([0.0, 0.0], [0.0, 1.0]);
        assert!((d - 111_195.0).abs() < 10.0);
    }
}
