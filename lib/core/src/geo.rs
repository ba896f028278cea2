//! Geographic primitives and point-in-region containment.
//!
//! Circles use great-circle (haversine) distance; polygons use even-odd ray
//! casting over (longitude, latitude) treated as planar coordinates.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

// Absorbs float rounding so points on the circle edge stay inside the box
const BBOX_EPSILON_DEGREES: f64 = 1e-9;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[inline]
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a point, rejecting out-of-range or non-finite coordinates
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self> {
        let point = Self::new(latitude, longitude);
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<()> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(Error::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Great-circle distance in meters
    pub fn haversine_distance(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

/// Axis-aligned box in degrees. `min_lon > max_lon` never happens; spans that
/// would cross the antimeridian are widened to the full longitude range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

/// The explicit service-area geometry of a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Circle { center: GeoPoint, radius_meters: f64 },
    Polygon { vertices: Vec<GeoPoint> },
}

impl Geometry {
    pub fn validate(&self) -> Result<()> {
        match self {
            Geometry::Circle { center, radius_meters } => {
                center.validate()?;
                if !radius_meters.is_finite() || *radius_meters < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "radius must be a non-negative number of meters, got {}",
                        radius_meters
                    )));
                }
                Ok(())
            }
            Geometry::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(Error::InvalidInput(format!(
                        "polygon needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                vertices.iter().try_for_each(GeoPoint::validate)
            }
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        match self {
            Geometry::Circle { center, radius_meters } => {
                center.haversine_distance(point) <= *radius_meters
            }
            Geometry::Polygon { vertices } => polygon_contains(vertices, point),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Geometry::Circle { center, radius_meters } => circle_bbox(center, *radius_meters),
            Geometry::Polygon { vertices } => {
                let mut bbox = BoundingBox {
                    min_lat: f64::INFINITY,
                    max_lat: f64::NEG_INFINITY,
                    min_lon: f64::INFINITY,
                    max_lon: f64::NEG_INFINITY,
                };
                for v in vertices {
                    bbox.min_lat = bbox.min_lat.min(v.latitude);
                    bbox.max_lat = bbox.max_lat.max(v.latitude);
                    bbox.min_lon = bbox.min_lon.min(v.longitude);
                    bbox.max_lon = bbox.max_lon.max(v.longitude);
                }
                bbox
            }
        }
    }
}

fn circle_bbox(center: &GeoPoint, radius_meters: f64) -> BoundingBox {
    let angular = radius_meters / EARTH_RADIUS_METERS;
    let dlat = angular.to_degrees() + BBOX_EPSILON_DEGREES;
    let min_lat = (center.latitude - dlat).max(-90.0);
    let max_lat = (center.latitude + dlat).min(90.0);

    // Widest longitude reach of a great circle: asin(sin(r/R) / cos(lat)).
    // A circle over a pole, or one wide enough that the ratio reaches 1, spans every meridian.
    let cos_lat = center.latitude.to_radians().cos();
    let reach = if angular < std::f64::consts::FRAC_PI_2 && cos_lat > 0.0 {
        angular.sin() / cos_lat
    } else {
        f64::INFINITY
    };
    let full_lon = min_lat <= -90.0 || max_lat >= 90.0 || reach >= 1.0;
    let (min_lon, max_lon) = if full_lon {
        (-180.0, 180.0)
    } else {
        let dlon = reach.asin().to_degrees() + BBOX_EPSILON_DEGREES;
        let (lo, hi) = (center.longitude - dlon, center.longitude + dlon);
        if lo < -180.0 || hi > 180.0 {
            (-180.0, 180.0)
        } else {
            (lo, hi)
        }
    };

    BoundingBox { min_lat, max_lat, min_lon, max_lon }
}

fn polygon_contains(vertices: &[GeoPoint], point: &GeoPoint) -> bool {
    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
        let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
