use crate::point::GeoPoint;
use serde::{Deserialize, Serialize};

/// A geographic bounding box in `[minLng, minLat, maxLng, maxLat]` order.
///
/// Unlike `geo::Rect`, construction does not reorder the corners, so a box
/// built from swapped or collapsed edges stays detectably invalid. Queries
/// treat an invalid box as "not ready" and answer with nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use flora_types::bbox::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(-74.0, 40.7, -73.9, 40.8);
    /// assert!(bbox.is_valid());
    /// ```
    pub const fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    }

    /// Build from the `[minLng, minLat, maxLng, maxLat]` array layout.
    pub const fn from_array(edges: [f64; 4]) -> Self {
        Self::new(edges[0], edges[1], edges[2], edges[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }

    /// Finite edges with `min < max` on both axes.
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && self.min_lng < self.max_lng
            && self.min_lat < self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// The four corners, counter-clockwise from the south-west.
    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint::new(self.min_lat, self.min_lng),
            GeoPoint::new(self.min_lat, self.max_lng),
            GeoPoint::new(self.max_lat, self.max_lng),
            GeoPoint::new(self.max_lat, self.min_lng),
        ]
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, point: &GeoPoint) -> bool {
        point.lng >= self.min_lng
            && point.lng <= self.max_lng
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lng < other.min_lng
            || self.min_lng > other.max_lng
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_rejects_degenerate_boxes() {
        assert!(BoundingBox::new(-1.0, -1.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(1.0, -1.0, -1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, 0.0, 0.0).is_valid());
        assert!(!BoundingBox::new(0.0, f64::NAN, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_contains_and_intersects() {
        let a = BoundingBox::new(-74.0, 40.7, -73.9, 40.8);
        let b = BoundingBox::new(-73.95, 40.75, -73.8, 40.9);
        let c = BoundingBox::new(10.0, 10.0, 11.0, 11.0);

        assert!(a.contains_point(&GeoPoint::new(40.75, -73.95)));
        assert!(!a.contains_point(&GeoPoint::new(40.75, -73.85)));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_center_and_array_layout() {
        let bbox = BoundingBox::from_array([-2.0, -1.0, 2.0, 3.0]);
        assert_eq!(bbox.center(), GeoPoint::new(1.0, 0.0));
        assert_eq!(bbox.to_array(), [-2.0, -1.0, 2.0, 3.0]);
        assert_eq!(bbox.width(), 4.0);
        assert_eq!(bbox.height(), 4.0);
    }
}
