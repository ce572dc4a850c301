//! Proximity index over raw points using an R*-tree with envelope pruning.
//!
//! Radius queries never compute a great-circle distance for every point.
//! The circle is first widened into a lng/lat envelope (longitude degrees
//! scaled by latitude), the tree prunes everything outside that envelope,
//! and only the remaining candidates are filtered by haversine distance.
//! Envelopes crossing the antimeridian are split in two.

use super::{IndexHit, IndexedPoint};
use crate::compute::spatial::{degree_extents, haversine_km, lng_spans};
use crate::compute::validation::validate_radius_km;
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use smallvec::SmallVec;

/// Tree entry: `[lng, lat]` and the slot of the point it stands for.
type Entry = GeomWithData<[f64; 2], usize>;

#[derive(Debug)]
pub struct ProximityIndex {
    points: Vec<IndexedPoint>,
    tree: RTree<Entry>,
}

impl ProximityIndex {
    pub fn build(points: Vec<IndexedPoint>) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| Entry::new([p.point.lng, p.point.lat], i))
            .collect();
        Self {
            points,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[IndexedPoint] {
        &self.points
    }

    /// Tree envelopes for a lng/lat box, wrapped into `[-180, 180]`.
    fn envelopes(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> SmallVec<[AABB<[f64; 2]>; 2]> {
        let (min_lat, max_lat) = (min_lat.clamp(-90.0, 90.0), max_lat.clamp(-90.0, 90.0));
        lng_spans(min_lng, max_lng)
            .into_iter()
            .map(|(west, east)| AABB::from_corners([west, min_lat], [east, max_lat]))
            .collect()
    }

    fn radius_envelopes(center: &GeoPoint, radius_km: f64) -> SmallVec<[AABB<[f64; 2]>; 2]> {
        let (d_lat, d_lng) = degree_extents(center, radius_km);
        Self::envelopes(
            center.lng - d_lng,
            center.lat - d_lat,
            center.lng + d_lng,
            center.lat + d_lat,
        )
    }

    /// Slots of the points inside the radius envelopes, each reported once.
    fn radius_candidates(&self, center: &GeoPoint, radius_km: f64) -> Vec<usize> {
        let mut slots = Vec::new();
        for envelope in Self::radius_envelopes(center, radius_km) {
            slots.extend(
                self.tree
                    .locate_in_envelope_intersecting(&envelope)
                    .map(|entry| entry.data),
            );
        }
        slots
    }

    /// Points within `radius_km` of `center` that satisfy `filter`, nearest
    /// first, with their distance in kilometers.
    ///
    /// # Arguments
    ///
    /// * `center` - Query center
    /// * `radius_km` - Search radius in kilometers
    /// * `filter` - Extra predicate each candidate must pass
    pub fn around<F>(&self, center: &GeoPoint, radius_km: f64, filter: F) -> Vec<(&IndexedPoint, f64)>
    where
        F: Fn(&IndexedPoint) -> bool,
    {
        if let Err(e) = validate_radius_km(radius_km) {
            log::warn!("Rejecting radius query: {}", e);
            return Vec::new();
        }

        let mut results: Vec<(usize, f64)> = self
            .radius_candidates(center, radius_km)
            .into_iter()
            .filter_map(|slot| {
                let point = &self.points[slot];
                if !filter(point) {
                    return None;
                }
                let distance = haversine_km(center, &point.point);
                (distance <= radius_km).then_some((slot, distance))
            })
            .collect();

        results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        results
            .into_iter()
            .map(|(i, d)| (&self.points[i], d))
            .collect()
    }

    /// Points inside `bbox`, in insertion order.
    pub fn within_bbox(&self, bbox: &BoundingBox) -> Vec<&IndexedPoint> {
        let mut slots = Vec::new();
        self.visit_bbox(bbox, &mut |i| slots.push(i));
        slots.sort_unstable();
        slots.into_iter().map(|i| &self.points[i]).collect()
    }

    fn visit_bbox(&self, bbox: &BoundingBox, visit: &mut dyn FnMut(usize)) {
        if !bbox.to_array().iter().all(|v| v.is_finite()) {
            log::warn!("Rejecting bounding box query with non-finite coordinates");
            return;
        }
        for envelope in Self::envelopes(bbox.min_lng, bbox.min_lat, bbox.max_lng, bbox.max_lat) {
            for entry in self.tree.locate_in_envelope(&envelope) {
                visit(entry.data);
            }
        }
    }

    pub fn hits_in_bbox(&self, bbox: &BoundingBox) -> Vec<IndexHit<'_>> {
        self.within_bbox(bbox)
            .into_iter()
            .map(IndexHit::Point)
            .collect()
    }

    pub fn hits_around(&self, center: &GeoPoint, radius_km: f64) -> Vec<IndexHit<'_>> {
        self.around(center, radius_km, |_| true)
            .into_iter()
            .map(|(p, _)| IndexHit::Point(p))
            .collect()
    }

    /// `(count, attribute_sum)` inside `bbox`.
    pub fn aggregate_bbox(&self, bbox: &BoundingBox) -> (usize, f64) {
        let mut totals = (0usize, 0.0f64);
        self.visit_bbox(bbox, &mut |i| {
            totals.0 += 1;
            totals.1 += self.points[i].attribute.unwrap_or(0.0);
        });
        totals
    }

    /// `(count, attribute_sum)` within `radius_km` of `center`.
    pub fn aggregate_around(&self, center: &GeoPoint, radius_km: f64) -> (usize, f64) {
        if validate_radius_km(radius_km).is_err() {
            return (0, 0.0);
        }
        self.radius_candidates(center, radius_km)
            .into_iter()
            .map(|slot| &self.points[slot])
            .filter(|p| haversine_km(center, &p.point) <= radius_km)
            .fold((0, 0.0), |(count, sum), p| {
                (count + 1, sum + p.attribute.unwrap_or(0.0))
            })
    }
}
