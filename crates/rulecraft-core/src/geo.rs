// SPDX-License-Identifier: Apache-2.0
//! Geodesic primitives: haversine distance, bearing, move-towards, and
//! point-in-region tests.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used by [`haversine_distance_m`].
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude coordinate pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, in degrees.
    pub lat: f64,
    /// Longitude, in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Constructs a point from degrees.
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Distance unit used by distance-bearing transforms and view operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Meters (default when unspecified).
    Meters,
    /// Kilometers.
    Kilometers,
}

impl Default for DistanceUnit {
    fn default() -> Self {
        DistanceUnit::Meters
    }
}

impl DistanceUnit {
    /// Converts a meter value into this unit.
    #[must_use]
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            DistanceUnit::Meters => meters,
            DistanceUnit::Kilometers => meters / 1000.0,
        }
    }

    /// Converts a value in this unit back into meters.
    #[must_use]
    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value,
            DistanceUnit::Kilometers => value * 1000.0,
        }
    }
}

/// Great-circle distance between two points, in meters.
///
/// Symmetric: `haversine_distance_m(a, b) == haversine_distance_m(b, a)`.
/// Correctly handles antimeridian crossing because it works entirely in
/// terms of angular differences, never raw longitude subtraction.
#[must_use]
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();
    let h = sin_dlat.mul_add(sin_dlat, lat1.cos() * lat2.cos() * sin_dlon * sin_dlon);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `a` to `b`, in degrees, `0 = north`, `90 =
/// east`, normalized to `[0, 360)`.
#[must_use]
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = (lat1.cos() * lat2.sin()) - (lat1.sin() * lat2.cos() * dlon.cos());
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Moves `current` towards `target` by `speed` (meters/ms) over
/// `delta_ms`, clamping at `target` if the step would overshoot.
///
/// `move_towards(p, p, d) == p` and
/// `move_towards(a, b, d) == b` when `d` covers the whole distance.
#[must_use]
pub fn move_towards(current: GeoPoint, target: GeoPoint, speed_m_per_ms: f64, delta_ms: f64) -> GeoPoint {
    let total = haversine_distance_m(current, target);
    if total <= f64::EPSILON {
        return current;
    }
    let step = (speed_m_per_ms * delta_ms).max(0.0);
    if step >= total {
        return target;
    }
    let fraction = step / total;

    // Spherical linear interpolation along the great-circle arc.
    let lat1 = current.lat.to_radians();
    let lon1 = current.lon.to_radians();
    let lat2 = target.lat.to_radians();
    let lon2 = target.lon.to_radians();

    let angular_dist = total / EARTH_RADIUS_M;
    if angular_dist <= f64::EPSILON {
        return current;
    }
    let a = ((1.0 - fraction) * angular_dist).sin() / angular_dist.sin();
    let b = (fraction * angular_dist).sin() / angular_dist.sin();

    let x = a.mul_add(lat1.cos() * lon1.cos(), b * (lat2.cos() * lon2.cos()));
    let y = a.mul_add(lat1.cos() * lon1.sin(), b * (lat2.cos() * lon2.sin()));
    let z = a.mul_add(lat1.sin(), b * lat2.sin());

    let lat = z.atan2((x * x + y * y).sqrt());
    let lon = y.atan2(x);

    GeoPoint::new(lat.to_degrees(), lon.to_degrees())
}

/// Whether `point` lies within `radius` (in `unit`) of `center`.
#[must_use]
pub fn point_in_radius(point: GeoPoint, center: GeoPoint, radius: f64, unit: DistanceUnit) -> bool {
    let distance = unit.from_meters(haversine_distance_m(point, center));
    distance <= radius
}

/// Ray-casting point-in-polygon test over a sequence of vertices treated as
/// flat (lon, lat) coordinates — adequate for polygons small enough that
/// great-circle curvature is negligible, which is the only case the source
/// supports.
#[must_use]
pub fn point_in_polygon(point: GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let vi = polygon[i];
        let vj = polygon[j];
        let intersects = ((vi.lat > point.lat) != (vj.lat > point.lat))
            && (point.lon
                < (vj.lon - vi.lon) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}
