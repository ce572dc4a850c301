//! Date-filtered, zoom-aware queries against the committed subject index.
//!
//! Every query answers from one [`IndexStore`] snapshot. Degenerate input
//! (an invalid bounding box, zoom 0, a non-positive radius) and a store that
//! is still loading produce empty results instead of errors.

use crate::index::{DateIndex, IndexHit, IndexStore, SubjectIndex};
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use flora_types::record::{DateKey, PointKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One point or cluster handed to map rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    pub id: String,
    pub kind: PointKind,
    pub point: GeoPoint,
    /// Probability of a point, or the summed probability of a cluster
    pub attribute: Option<f64>,
    pub date_key: DateKey,
    pub point_count: usize,
    pub cluster_id: Option<usize>,
}

impl MapFeature {
    fn from_hit(hit: &IndexHit<'_>, kind: PointKind, date_key: &DateKey) -> Self {
        match hit {
            IndexHit::Point(p) => MapFeature {
                id: p.id.clone(),
                kind,
                point: p.point,
                attribute: p.attribute,
                date_key: p.date_key.clone(),
                point_count: 1,
                cluster_id: None,
            },
            IndexHit::Cluster(c) => MapFeature {
                id: c.id.to_string(),
                kind,
                point: c.center,
                attribute: kind.sums_attribute().then_some(c.attribute_sum),
                date_key: date_key.clone(),
                point_count: c.point_count,
                cluster_id: Some(c.id),
            },
        }
    }

    pub fn is_cluster(&self) -> bool {
        self.cluster_id.is_some()
    }
}

/// Region an aggregation runs over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryGeometry {
    Bounds(BoundingBox),
    Radius { center: GeoPoint, radius_km: f64 },
}

impl QueryGeometry {
    fn is_valid(&self) -> bool {
        match self {
            QueryGeometry::Bounds(bbox) => bbox.is_valid(),
            QueryGeometry::Radius { center, radius_km } => {
                center.is_valid() && radius_km.is_finite() && *radius_km > 0.0
            }
        }
    }
}

/// Scalar summary of the points a query selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub count: usize,
    /// `total / count` when the attribute total is positive, otherwise `0`
    pub mean_attribute: f64,
}

impl Aggregate {
    pub fn from_totals(count: usize, total: f64) -> Self {
        let mean_attribute = if total > 0.0 && count > 0 {
            total / count as f64
        } else {
            0.0
        };
        Self {
            count,
            mean_attribute,
        }
    }
}

/// Query front end over an [`IndexStore`].
///
/// # Examples
///
/// ```rust
/// use flora_geoindex::index::{IndexStore, PointIndexBuilder};
/// use flora_geoindex::query::PointQueryEngine;
/// use flora_geoindex::{BoundingBox, DateKey, GeoPoint, PointKind, Record, SubjectId};
/// use std::sync::Arc;
///
/// let store = Arc::new(IndexStore::new(PointKind::Predictions));
/// let ticket = store.select(Some(SubjectId::from("ugkG3de"))).unwrap();
/// let records = vec![Record::new(
///     DateKey::parse("20171103").unwrap(),
///     GeoPoint::new(35.5, -82.7),
///     Some(0.4),
/// )];
/// let index = PointIndexBuilder::default().build(
///     ticket.subject().clone(),
///     PointKind::Predictions,
///     records,
/// );
/// store.commit(&ticket, index);
///
/// let engine = PointQueryEngine::new(store);
/// let bbox = BoundingBox::new(-83.0, 35.0, -82.0, 36.0);
/// let date = DateKey::parse("20171103").unwrap();
/// assert_eq!(engine.get_points(&bbox, 9, &date).len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PointQueryEngine {
    store: Arc<IndexStore>,
}

impl PointQueryEngine {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    pub fn kind(&self) -> PointKind {
        self.store.kind()
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    fn snapshot(&self, zoom: u8) -> Option<Arc<SubjectIndex>> {
        if zoom == 0 {
            return None;
        }
        self.store.snapshot()
    }

    fn collect<'a, F>(index: &'a SubjectIndex, date_key: &'a DateKey, walk: F) -> Vec<MapFeature>
    where
        F: Fn(&'a DateIndex) -> Vec<IndexHit<'a>>,
    {
        index
            .matching(date_key)
            .flat_map(|(key, date_index)| {
                walk(date_index)
                    .iter()
                    .map(|hit| MapFeature::from_hit(hit, index.kind(), key))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Points and clusters inside `bbox` at `zoom` for `date_key`.
    pub fn get_points(&self, bbox: &BoundingBox, zoom: u8, date_key: &DateKey) -> Vec<MapFeature> {
        if !bbox.is_valid() {
            return Vec::new();
        }
        let Some(index) = self.snapshot(zoom) else {
            return Vec::new();
        };
        Self::collect(&index, date_key, |date_index| date_index.visible(bbox, zoom))
    }

    /// Points and clusters within `radius_km` of `center`.
    pub fn get_points_around(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        zoom: u8,
        date_key: &DateKey,
    ) -> Vec<MapFeature> {
        let geometry = QueryGeometry::Radius {
            center: *center,
            radius_km,
        };
        if !geometry.is_valid() {
            return Vec::new();
        }
        let Some(index) = self.snapshot(zoom) else {
            return Vec::new();
        };
        Self::collect(&index, date_key, |date_index| {
            date_index.around(center, radius_km, zoom)
        })
    }

    /// Count and mean attribute of everything the geometry selects, computed
    /// by walking the index without building features.
    pub fn get_aggregation(&self, geometry: &QueryGeometry, zoom: u8, date_key: &DateKey) -> Aggregate {
        if !geometry.is_valid() {
            return Aggregate::default();
        }
        let Some(index) = self.snapshot(zoom) else {
            return Aggregate::default();
        };

        let (count, total) = index
            .matching(date_key)
            .map(|(_, date_index)| match geometry {
                QueryGeometry::Bounds(bbox) => date_index.aggregate_bbox(bbox, zoom),
                QueryGeometry::Radius { center, radius_km } => {
                    date_index.aggregate_around(center, *radius_km, zoom)
                }
            })
            .fold((0usize, 0.0f64), |acc, (c, t)| (acc.0 + c, acc.1 + t));
        Aggregate::from_totals(count, total)
    }

    /// Leaves of a cluster returned for `date_key`, paginated.
    ///
    /// Unlike the map queries this reports unknown clusters as errors, since
    /// a cluster id only exists because an earlier query returned it.
    pub fn cluster_leaves(
        &self,
        date_key: &DateKey,
        cluster_id: usize,
        limit: usize,
        offset: usize,
    ) -> crate::Result<Vec<MapFeature>> {
        let index = self.cluster_snapshot()?;
        let cluster = cluster_index(&index, date_key)?;
        Ok(cluster
            .leaves(cluster_id, limit, offset)?
            .into_iter()
            .map(|p| MapFeature::from_hit(&IndexHit::Point(p), index.kind(), date_key))
            .collect())
    }

    /// Zoom at which a cluster returned for `date_key` splits apart.
    pub fn cluster_expansion_zoom(&self, date_key: &DateKey, cluster_id: usize) -> crate::Result<u8> {
        let index = self.cluster_snapshot()?;
        cluster_index(&index, date_key)?.expansion_zoom(cluster_id)
    }

    fn cluster_snapshot(&self) -> crate::Result<Arc<SubjectIndex>> {
        self.store
            .snapshot()
            .ok_or_else(|| crate::GeoIndexError::InvalidInput("Index is still loading".to_string()))
    }
}

fn cluster_index<'a>(
    index: &'a SubjectIndex,
    date_key: &DateKey,
) -> crate::Result<&'a crate::index::ClusterIndex> {
    match index.get(date_key) {
        Some(DateIndex::Cluster(cluster)) => Ok(cluster),
        Some(DateIndex::Proximity(_)) => Err(crate::GeoIndexError::InvalidInput(format!(
            "Date key [{}] is not clustered",
            date_key
        ))),
        None => Err(crate::GeoIndexError::InvalidInput(format!(
            "No index for date key [{}]",
            date_key
        ))),
    }
}

/// Render features as a GeoJSON `FeatureCollection`.
#[cfg(feature = "geojson")]
pub fn to_feature_collection(features: &[MapFeature]) -> geojson::FeatureCollection {
    use geojson::{Feature, FeatureCollection, Geometry, Value, feature::Id};
    use serde_json::{Map, Value as JsonValue};

    let features = features
        .iter()
        .map(|f| {
            let mut properties = Map::new();
            properties.insert("kind".to_string(), JsonValue::from(f.kind.as_str()));
            properties.insert("date".to_string(), JsonValue::from(f.date_key.as_str()));
            properties.insert("point_count".to_string(), JsonValue::from(f.point_count));
            if let Some(attribute) = f.attribute {
                properties.insert("attribute".to_string(), JsonValue::from(attribute));
            }
            if let Some(cluster_id) = f.cluster_id {
                properties.insert("cluster".to_string(), JsonValue::Bool(true));
                properties.insert("cluster_id".to_string(), JsonValue::from(cluster_id));
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![f.point.lng, f.point.lat]))),
                id: Some(Id::String(f.id.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexStrategy;
    use crate::index::PointIndexBuilder;
    use flora_types::record::{Record, SubjectId};

    fn record(date: &str, lat: f64, lng: f64, attribute: Option<f64>) -> Record {
        Record::new(DateKey::parse(date).unwrap(), GeoPoint::new(lat, lng), attribute)
    }

    fn loaded(kind: PointKind, records: Vec<Record>) -> PointQueryEngine {
        let store = Arc::new(IndexStore::new(kind));
        let ticket = store.select(Some(SubjectId::from("ugkG3de"))).unwrap();
        let index = PointIndexBuilder::default().build(ticket.subject().clone(), kind, records);
        assert!(store.commit(&ticket, index));
        PointQueryEngine::new(store)
    }

    fn predictions() -> PointQueryEngine {
        loaded(
            PointKind::Predictions,
            vec![
                record("20171103", 35.50, -82.70, Some(0.4)),
                record("20171103", 35.52, -82.68, Some(0.2)),
                record("20171110", 35.50, -82.70, Some(0.9)),
                record("20171208", 35.50, -82.70, Some(0.1)),
            ],
        )
    }

    fn region() -> BoundingBox {
        BoundingBox::new(-83.0, 35.0, -82.0, 36.0)
    }

    #[test]
    fn test_get_points_filters_by_exact_date() {
        let engine = predictions();
        let features = engine.get_points(&region(), 16, &DateKey::parse("20171103").unwrap());
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.date_key.as_str() == "20171103"));
        assert!(features.iter().all(|f| !f.is_cluster()));
    }

    #[test]
    fn test_month_query_matches_every_day_of_month() {
        let engine = predictions();
        let features = engine.get_points(&region(), 16, &DateKey::parse("11").unwrap());
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f.date_key.month() == "11"));
    }

    #[test]
    fn test_degenerate_queries_are_empty() {
        let engine = predictions();
        let date = DateKey::parse("20171103").unwrap();
        assert!(engine.get_points(&region(), 0, &date).is_empty());
        assert!(
            engine
                .get_points(&BoundingBox::new(-82.0, 35.0, -83.0, 36.0), 9, &date)
                .is_empty()
        );
        assert!(
            engine
                .get_points(&region(), 9, &DateKey::parse("20170101").unwrap())
                .is_empty()
        );
        let center = GeoPoint::new(35.5, -82.7);
        assert!(engine.get_points_around(&center, 0.0, 9, &date).is_empty());
        assert_eq!(
            engine.get_aggregation(&QueryGeometry::Bounds(region()), 0, &date),
            Aggregate::default()
        );
    }

    #[test]
    fn test_loading_store_answers_empty() {
        let engine = predictions();
        engine.store().select(Some(SubjectId::from("other")));
        let date = DateKey::parse("20171103").unwrap();
        assert!(engine.get_points(&region(), 9, &date).is_empty());
        assert_eq!(
            engine.get_aggregation(&QueryGeometry::Bounds(region()), 9, &date),
            Aggregate::default()
        );
    }

    #[test]
    fn test_clusters_at_low_zoom_carry_summed_attribute() {
        let engine = predictions();
        let features = engine.get_points(&region(), 6, &DateKey::parse("20171103").unwrap());
        assert_eq!(features.len(), 1);
        let cluster = &features[0];
        assert!(cluster.is_cluster());
        assert_eq!(cluster.point_count, 2);
        assert!((cluster.attribute.unwrap() - 0.6).abs() < 1e-9);

        let date = DateKey::parse("20171103").unwrap();
        let leaves = engine
            .cluster_leaves(&date, cluster.cluster_id.unwrap(), 10, 0)
            .unwrap();
        assert_eq!(leaves.len(), 2);
        assert!(engine.cluster_expansion_zoom(&date, cluster.cluster_id.unwrap()).unwrap() > 6);
    }

    #[test]
    fn test_aggregation_matches_feature_totals() {
        let engine = predictions();
        let date = DateKey::parse("11").unwrap();
        let aggregate = engine.get_aggregation(&QueryGeometry::Bounds(region()), 16, &date);
        assert_eq!(aggregate.count, 3);
        assert!((aggregate.mean_attribute - 0.5).abs() < 1e-9);

        let around = engine.get_aggregation(
            &QueryGeometry::Radius {
                center: GeoPoint::new(35.5, -82.7),
                radius_km: 1.0,
            },
            16,
            &date,
        );
        assert_eq!(around.count, 2);
        assert!((around.mean_attribute - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_occurrences_aggregate_without_attribute() {
        let engine = loaded(
            PointKind::Occurrences,
            vec![
                record("20170603", 35.50, -82.70, None),
                record("20170611", 35.51, -82.71, None),
                record("20170704", 35.50, -82.70, None),
            ],
        );
        let june = DateKey::parse("06").unwrap();
        let aggregate = engine.get_aggregation(&QueryGeometry::Bounds(region()), 9, &june);
        assert_eq!(aggregate, Aggregate::from_totals(2, 0.0));
        assert_eq!(aggregate.mean_attribute, 0.0);

        let day_query = DateKey::parse("20170615").unwrap();
        assert_eq!(engine.get_points(&region(), 9, &day_query).len(), 2);
        assert!(engine.cluster_leaves(&june, 0, 10, 0).is_err());
    }

    #[test]
    fn test_forced_proximity_strategy_returns_raw_points() {
        let store = Arc::new(IndexStore::new(PointKind::Predictions));
        let ticket = store.select(Some(SubjectId::from("a"))).unwrap();
        let index = PointIndexBuilder::default()
            .strategy(PointKind::Predictions, IndexStrategy::Proximity)
            .build(
                ticket.subject().clone(),
                PointKind::Predictions,
                vec![
                    record("20171103", 35.50, -82.70, Some(0.4)),
                    record("20171103", 35.52, -82.68, Some(0.2)),
                ],
            );
        store.commit(&ticket, index);
        let engine = PointQueryEngine::new(store);
        let features = engine.get_points(&region(), 6, &DateKey::parse("20171103").unwrap());
        assert_eq!(features.len(), 2);
    }

    #[cfg(feature = "geojson")]
    #[test]
    fn test_feature_collection_output() {
        let engine = predictions();
        let features = engine.get_points(&region(), 16, &DateKey::parse("20171110").unwrap());
        let collection = to_feature_collection(&features);
        assert_eq!(collection.features.len(), 1);
        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0], -82.7);
        assert_eq!(json["features"][0]["properties"]["attribute"], 0.9);
    }
}
