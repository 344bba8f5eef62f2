use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A plain (longitude, latitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Sum of consecutive leg distances along `points`.
pub fn path_length_km(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|pair| haversine_km(&pair[0], &pair[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        let p = GeoPoint::new(31.2357, 30.0444);
        assert_eq!(p.distance_km(&p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        // 2 * pi * 6371 / 360
        assert!((a.distance_km(&b) - 111.195).abs() < 0.01);
    }

    #[test]
    fn test_known_city_pair() {
        // Cairo -> Alexandria is roughly 180 km as the crow flies
        let cairo = GeoPoint::new(31.2357, 30.0444);
        let alexandria = GeoPoint::new(29.9187, 31.2001);
        let d = cairo.distance_km(&alexandria);
        assert!(d > 170.0 && d < 190.0, "got {}", d);
        assert!((d - alexandria.distance_km(&cairo)).abs() < 1e-9);
    }

    #[test]
    fn test_path_length() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let c = GeoPoint::new(0.0, 2.0);
        assert!((path_length_km(&[a, b, c]) - 2.0 * a.distance_km(&b)).abs() < 1e-9);
        assert_eq!(path_length_km(&[a]), 0.0);
        assert_eq!(path_length_km(&[]), 0.0);
    }
}
