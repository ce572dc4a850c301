//! Great-circle distances and local degree scaling.

use flora_types::point::GeoPoint;
use geo::{Distance, Haversine, Point};
use smallvec::{SmallVec, smallvec};

/// Mean Earth radius in kilometers, matching `geo`'s haversine radius.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance in kilometers.
///
/// # Examples
///
/// ```rust
/// use flora_geoindex::compute::spatial::haversine_km;
/// use flora_geoindex::GeoPoint;
///
/// let nyc = GeoPoint::new(40.7128, -74.0060);
/// let la = GeoPoint::new(34.0522, -118.2437);
/// let km = haversine_km(&nyc, &la);
/// assert!(km > 3_900.0 && km < 4_000.0);
/// ```
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (pa, pb): (Point, Point) = ((*a).into(), (*b).into());
    Haversine.distance(pa, pb) / 1000.0
}

/// Angular radius in radians of a ground distance.
pub fn km_to_radians(km: f64) -> f64 {
    km / EARTH_RADIUS_KM
}

/// Degree extents `(d_lat, d_lng)` that enclose a circle of `radius_km`
/// around `center`.
///
/// Longitude degrees shrink with latitude; near the poles the longitude
/// extent saturates to the full circle.
pub fn degree_extents(center: &GeoPoint, radius_km: f64) -> (f64, f64) {
    let d_lat = km_to_radians(radius_km).to_degrees();
    let cos_lat = center.lat.to_radians().cos();
    let d_lng = if cos_lat.abs() < 1e-6 {
        360.0
    } else {
        (d_lat / cos_lat.abs()).min(360.0)
    };
    (d_lat, d_lng)
}

/// Wrap a longitude into `[-180, 180)`.
pub fn wrap_lng(lng: f64) -> f64 {
    ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
}

/// Longitude spans covering `min_lng..=max_lng` once wrapped into
/// `[-180, 180]`. A span crossing the antimeridian splits into its eastern
/// and western parts.
pub fn lng_spans(min_lng: f64, max_lng: f64) -> SmallVec<[(f64, f64); 2]> {
    if max_lng - min_lng >= 360.0 {
        return smallvec![(-180.0, 180.0)];
    }
    let min = wrap_lng(min_lng);
    let max = if max_lng == 180.0 { 180.0 } else { wrap_lng(max_lng) };
    if min > max {
        smallvec![(min, 180.0), (-180.0, max)]
    } else {
        smallvec![(min, max)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(35.5, -82.7);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let km = haversine_km(&a, &b);
        assert!((km - 111.19).abs() < 0.1, "got {}", km);
    }

    #[test]
    fn test_distance_across_antimeridian() {
        let east = GeoPoint::new(10.0, 179.9);
        let west = GeoPoint::new(10.0, -179.9);
        let km = haversine_km(&east, &west);
        assert!(km > 20.0 && km < 23.0, "got {}", km);
    }

    #[test]
    fn test_lng_spans_split_at_antimeridian() {
        assert_eq!(wrap_lng(190.0), -170.0);
        assert_eq!(wrap_lng(-190.0), 170.0);
        assert_eq!(lng_spans(-83.0, -82.0).as_slice(), &[(-83.0, -82.0)]);
        assert_eq!(lng_spans(-180.0, 180.0).as_slice(), &[(-180.0, 180.0)]);
        assert_eq!(lng_spans(170.0, 190.0).as_slice(), &[(170.0, 180.0), (-180.0, -170.0)]);
        assert_eq!(lng_spans(-190.0, -170.0).as_slice(), &[(170.0, 180.0), (-180.0, -170.0)]);
        assert_eq!(lng_spans(170.0, -170.0).as_slice(), &[(170.0, 180.0), (-180.0, -170.0)]);
    }

    #[test]
    fn test_degree_extents_widen_with_latitude() {
        let (lat_eq, lng_eq) = degree_extents(&GeoPoint::new(0.0, 0.0), 10.0);
        let (lat_n, lng_n) = degree_extents(&GeoPoint::new(60.0, 0.0), 10.0);
        assert!((lat_eq - lat_n).abs() < 1e-12);
        assert!((lng_eq - lat_eq).abs() < 1e-9);
        assert!((lng_n - 2.0 * lat_n).abs() < 1e-6);
        assert_eq!(degree_extents(&GeoPoint::new(90.0, 0.0), 10.0).1, 360.0);
    }
}
