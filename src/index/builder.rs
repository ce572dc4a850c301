//! Builds a [`SubjectIndex`] from parsed records.

use super::{ClusterIndex, ClusterOptions, DateIndex, IndexedPoint, ProximityIndex, SubjectIndex};
use crate::config::{Config, IndexStrategy};
use crate::covering::leaf_token;
use flora_types::record::{DateKey, PointKind, Record, SubjectId};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Groups records by date key and builds one index per group.
///
/// # Examples
///
/// ```rust
/// use flora_geoindex::index::PointIndexBuilder;
/// use flora_geoindex::{Config, DateKey, GeoPoint, PointKind, Record, SubjectId};
///
/// let records = vec![
///     Record::new(DateKey::parse("20171103").unwrap(), GeoPoint::new(35.5, -82.7), Some(0.4)),
///     Record::new(DateKey::parse("20171110").unwrap(), GeoPoint::new(35.6, -82.6), Some(0.9)),
/// ];
/// let index = PointIndexBuilder::new(Config::default())
///     .build(SubjectId::from("ugkG3de"), PointKind::Predictions, records);
/// assert_eq!(index.stats().date_keys, 2);
/// ```
#[derive(Debug, Clone)]
pub struct PointIndexBuilder {
    config: Config,
}

impl PointIndexBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Override the strategy configured for `kind`.
    pub fn strategy(mut self, kind: PointKind, strategy: IndexStrategy) -> Self {
        self.config = self.config.with_strategy(kind, strategy);
        self
    }

    pub fn build(&self, subject: SubjectId, kind: PointKind, records: Vec<Record>) -> SubjectIndex {
        let strategy = self.config.strategy.for_kind(kind);
        let precision = kind.date_precision();

        let mut groups: FxHashMap<DateKey, Vec<IndexedPoint>> = FxHashMap::default();
        for record in records {
            let date_key = record.date_key.with_precision(precision);
            let id = record.id.unwrap_or_else(|| leaf_token(&record.point));
            groups.entry(date_key.clone()).or_default().push(IndexedPoint {
                id,
                point: record.point,
                attribute: record.attribute,
                date_key,
            });
        }

        let options = ClusterOptions::for_kind(&self.config.cluster, kind);
        let by_date: BTreeMap<DateKey, DateIndex> = groups
            .into_iter()
            .map(|(key, points)| {
                let index = match strategy {
                    IndexStrategy::Cluster => {
                        DateIndex::Cluster(ClusterIndex::build(points, options.clone()))
                    }
                    IndexStrategy::Proximity => DateIndex::Proximity(ProximityIndex::build(points)),
                };
                (key, index)
            })
            .collect();

        let index = SubjectIndex::new(subject, kind, by_date);
        let stats = index.stats();
        log::info!(
            "Built {:?} index for {} [{}]: {} date keys, {} points",
            strategy,
            kind,
            index.subject().map(SubjectId::as_str).unwrap_or_default(),
            stats.date_keys,
            stats.total_points
        );
        index
    }
}

impl Default for PointIndexBuilder {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flora_types::point::GeoPoint;

    fn record(date: &str, lat: f64, lng: f64, attribute: Option<f64>) -> Record {
        Record::new(DateKey::parse(date).unwrap(), GeoPoint::new(lat, lng), attribute)
    }

    #[test]
    fn test_groups_by_date_key_with_default_strategies() {
        let records = vec![
            record("20171103", 35.5, -82.7, Some(0.4)),
            record("20171103", 35.6, -82.6, Some(0.2)),
            record("20171110", 35.5, -82.7, Some(0.9)),
        ];
        let index = PointIndexBuilder::default().build(
            SubjectId::from("a"),
            PointKind::Predictions,
            records,
        );

        let keys: Vec<&str> = index.date_keys().map(DateKey::as_str).collect();
        assert_eq!(keys, vec!["20171103", "20171110"]);
        let first = index.get(&DateKey::parse("20171103").unwrap()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.strategy(), IndexStrategy::Cluster);
        assert_eq!(index.stats().total_points, 3);
        assert_eq!(index.stats().largest_date_key, 2);
    }

    #[test]
    fn test_occurrence_keys_reduce_to_month() {
        let records = vec![
            record("20170603", 35.5, -82.7, None),
            record("06", 35.6, -82.6, None),
            record("20170704", 35.5, -82.7, None),
        ];
        let index = PointIndexBuilder::default().build(
            SubjectId::from("b"),
            PointKind::Occurrences,
            records,
        );
        let keys: Vec<&str> = index.date_keys().map(DateKey::as_str).collect();
        assert_eq!(keys, vec!["06", "07"]);
        let june = index.get(&DateKey::parse("06").unwrap()).unwrap();
        assert_eq!(june.strategy(), IndexStrategy::Proximity);
        assert_eq!(june.len(), 2);
    }

    #[test]
    fn test_missing_ids_fall_back_to_leaf_token() {
        let records = vec![record("20171103", 35.5, -82.7, Some(0.4)).with_id("given")];
        let mut with_missing = records.clone();
        with_missing.push(record("20171103", 36.5, -81.7, Some(0.1)));

        let index = PointIndexBuilder::default()
            .strategy(PointKind::Predictions, IndexStrategy::Proximity)
            .build(SubjectId::from("c"), PointKind::Predictions, with_missing);
        let points = index
            .get(&DateKey::parse("20171103").unwrap())
            .unwrap()
            .points();
        assert_eq!(points[0].id, "given");
        assert_eq!(points[1].id, leaf_token(&GeoPoint::new(36.5, -81.7)));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let records = vec![
            record("20171103", 35.5, -82.7, Some(0.4)),
            record("20171103", 35.5001, -82.7001, Some(0.2)),
        ];
        let builder = PointIndexBuilder::default();
        let a = builder.build(SubjectId::from("d"), PointKind::Predictions, records.clone());
        let b = builder.build(SubjectId::from("d"), PointKind::Predictions, records);
        assert_eq!(a.stats(), b.stats());
        let key = DateKey::parse("20171103").unwrap();
        let bbox = flora_types::bbox::BoundingBox::new(-83.0, 35.0, -82.0, 36.0);
        assert_eq!(
            a.get(&key).unwrap().visible(&bbox, 9),
            b.get(&key).unwrap().visible(&bbox, 9)
        );
    }
}
