use geo::Point;
use serde::{Deserialize, Serialize};

/// A geographic position in degrees.
///
/// Latitude comes first, matching how coordinates are written in the
/// datasets. Conversions to `geo::Point` put longitude on the x axis.
///
/// # Examples
///
/// ```
/// use flora_types::point::GeoPoint;
///
/// let minneapolis = GeoPoint::new(44.9708547, -93.4012199);
/// let point: geo::Point = minneapolis.into();
/// assert_eq!(point.x(), -93.4012199);
/// assert_eq!(point.y(), 44.9708547);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// The `{0, 0}` point is what an unset location looks like upstream.
    pub fn is_null_island(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    /// Round both coordinates to eight significant digits.
    ///
    /// Locations coming from geolocation carry noise far below anything
    /// the index can resolve; rounding keeps equal positions comparing equal.
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_significant(self.lat, 8),
            lng: round_significant(self.lng, 8),
        }
    }
}

fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let factor = 10f64.powi(digits - magnitude);
    (value * factor).round() / factor
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.lng, p.lat)
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(p: Point<f64>) -> Self {
        GeoPoint::new(p.y(), p.x())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(GeoPoint::new(-90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_null_island() {
        assert!(GeoPoint::default().is_null_island());
        assert!(!GeoPoint::new(0.0, 1.0).is_null_island());
    }

    #[test]
    fn test_rounded_keeps_eight_significant_digits() {
        let p = GeoPoint::new(35.538851234, -82.70549012345);
        let r = p.rounded();
        assert!((r.lat - 35.538851).abs() < 1e-9);
        assert!((r.lng - -82.70549).abs() < 1e-9);
    }

    #[test]
    fn test_geo_point_round_trip_axes() {
        let p = GeoPoint::new(10.0, 20.0);
        let g: Point<f64> = p.into();
        assert_eq!(g.x(), 20.0);
        assert_eq!(GeoPoint::from(g), p);
    }
}
