//! Spherical Mercator viewport math.
//!
//! Converts a map center, zoom and pixel viewport into the geographic box it
//! shows and the ground distance from its center to its western edge. The
//! radius feeds the region coverer; the box feeds point queries.

use crate::compute::spatial::haversine_km;
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

const MAX_SIN_LAT: f64 = 0.9999;

/// Pixel dimensions of the visible map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A viewport with any zero dimension has not been laid out yet.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Geographic extent of a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    pub bbox: BoundingBox,
    /// Ground distance from the center to the western edge, in kilometers
    pub radius_km: f64,
}

impl ViewportBounds {
    fn not_ready() -> Self {
        Self {
            bbox: BoundingBox::new(0.0, 0.0, 0.0, 0.0),
            radius_km: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.radius_km > 0.0 && self.bbox.is_valid()
    }
}

/// Pixel space of one zoom level.
struct Projection {
    /// Pixels per degree of longitude
    bc: f64,
    /// Pixels per radian
    cc: f64,
    /// Half the world size in pixels
    zc: f64,
    /// World size in pixels
    ac: f64,
}

impl Projection {
    fn new(zoom: u8, tile_size: u32) -> Self {
        let size = tile_size as f64 * 2f64.powi(zoom as i32);
        Self {
            bc: size / 360.0,
            cc: size / (2.0 * PI),
            zc: size / 2.0,
            ac: size,
        }
    }

    fn px(&self, point: &GeoPoint) -> (f64, f64) {
        let f = point.lat.to_radians().sin().clamp(-MAX_SIN_LAT, MAX_SIN_LAT);
        let x = self.zc + point.lng * self.bc;
        let y = self.zc + 0.5 * ((1.0 + f) / (1.0 - f)).ln() * -self.cc;
        (x.clamp(0.0, self.ac), y.clamp(0.0, self.ac))
    }

    fn ll(&self, x: f64, y: f64) -> GeoPoint {
        let g = (y - self.zc) / -self.cc;
        let lng = (x - self.zc) / self.bc;
        let lat = (2.0 * g.exp().atan() - 0.5 * PI).to_degrees();
        GeoPoint::new(
            lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT),
            lng.clamp(-180.0, 180.0),
        )
    }
}

/// Bounding box shown by a viewport centered on `center` at `zoom`.
///
/// # Examples
///
/// ```rust
/// use flora_geoindex::viewport::{bounds, Viewport};
/// use flora_geoindex::GeoPoint;
///
/// let bbox = bounds(&GeoPoint::new(0.0, 0.0), 0, Viewport::new(256, 256), 256);
/// assert!((bbox.min_lng - -180.0).abs() < 1e-9);
/// assert!((bbox.max_lat - 85.0511).abs() < 1e-3);
/// ```
pub fn bounds(center: &GeoPoint, zoom: u8, viewport: Viewport, tile_size: u32) -> BoundingBox {
    let projection = Projection::new(zoom, tile_size);
    let (x, y) = projection.px(center);
    let half_w = viewport.width as f64 / 2.0;
    let half_h = viewport.height as f64 / 2.0;
    let top_left = projection.ll(x - half_w, y - half_h);
    let bottom_right = projection.ll(x + half_w, y + half_h);
    BoundingBox::new(
        top_left.lng,
        bottom_right.lat,
        bottom_right.lng,
        top_left.lat,
    )
}

/// Bounding box and ground radius of a viewport.
///
/// A viewport with a zero dimension, or an invalid center, is not ready:
/// the result has radius 0 and an invalid box.
pub fn compute(
    center: &GeoPoint,
    zoom: u8,
    viewport: Viewport,
    tile_size: u32,
) -> ViewportBounds {
    if !viewport.is_ready() || tile_size == 0 || !center.is_valid() {
        return ViewportBounds::not_ready();
    }
    let bbox = bounds(center, zoom, viewport, tile_size);
    let west = GeoPoint::new(center.lat, bbox.min_lng);
    ViewportBounds {
        bbox,
        radius_km: haversine_km(center, &west),
    }
}

/// Ground radius of a viewport in kilometers, 0 when not ready.
pub fn radius_km(center: &GeoPoint, zoom: u8, viewport: Viewport, tile_size: u32) -> f64 {
    compute(center, zoom, viewport, tile_size).radius_km
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asheville() -> GeoPoint {
        GeoPoint::new(35.538851, -82.7054901)
    }

    #[test]
    fn test_zero_viewport_is_not_ready() {
        for viewport in [Viewport::new(0, 0), Viewport::new(0, 600), Viewport::new(800, 0)] {
            let result = compute(&asheville(), 9, viewport, 256);
            assert_eq!(result.radius_km, 0.0);
            assert!(!result.bbox.is_valid());
            assert!(!result.is_ready());
        }
    }

    #[test]
    fn test_radius_doubles_per_zoom_out() {
        let viewport = Viewport::new(1024, 768);
        let r9 = radius_km(&asheville(), 9, viewport, 256);
        let r8 = radius_km(&asheville(), 8, viewport, 256);
        let r10 = radius_km(&asheville(), 10, viewport, 256);
        assert!(r9 > 0.0);
        assert!((r8 / r9 - 2.0).abs() < 0.02, "ratio {}", r8 / r9);
        assert!((r9 / r10 - 2.0).abs() < 0.02, "ratio {}", r9 / r10);
    }

    #[test]
    fn test_bounds_surround_center() {
        let center = asheville();
        let bbox = bounds(&center, 9, Viewport::new(800, 600), 256);
        assert!(bbox.is_valid());
        assert!(bbox.contains_point(&center));
        // Center stays horizontally centered in pixel space, so in degrees too.
        assert!(((bbox.min_lng + bbox.max_lng) / 2.0 - center.lng).abs() < 1e-9);
        // 800 px at zoom 9 spans 800 / (256 * 512) of the world.
        let expected_width = 800.0 / (256.0 * 512.0) * 360.0;
        assert!((bbox.width() - expected_width).abs() < 1e-9);
    }

    #[test]
    fn test_world_view_clamps() {
        let bbox = bounds(&GeoPoint::new(0.0, 0.0), 0, Viewport::new(2048, 2048), 256);
        assert_eq!(bbox.min_lng, -180.0);
        assert_eq!(bbox.max_lng, 180.0);
        assert!(bbox.max_lat <= MAX_MERCATOR_LAT);
        assert!(bbox.min_lat >= -MAX_MERCATOR_LAT);
    }
}
