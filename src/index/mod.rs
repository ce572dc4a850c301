//! Per-subject point indexes.
//!
//! A [`SubjectIndex`] holds one spatial index per distinct date key of a
//! subject's dataset. Depending on the configured [`IndexStrategy`] each
//! date key is backed by a [`ClusterIndex`] (zoom-level clusters with an
//! attribute sum) or a [`ProximityIndex`] (raw points in an R*-tree).
//!
//! Indexes are immutable once built. A subject change discards the whole
//! [`SubjectIndex`]; the [`IndexStore`] swaps it atomically.

pub mod builder;
pub mod cluster;
pub mod proximity;
pub mod store;

pub use builder::PointIndexBuilder;
pub use cluster::{ClusterIndex, ClusterOptions};
pub use proximity::ProximityIndex;
pub use store::{IndexStore, LoadTicket};

use crate::config::IndexStrategy;
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use flora_types::record::{DateKey, PointKind, SubjectId};
use flora_types::stats::IndexStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record as stored in an index: the id is always resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: String,
    pub point: GeoPoint,
    pub attribute: Option<f64>,
    pub date_key: DateKey,
}

/// A synthetic point standing for several nearby points at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub center: GeoPoint,
    pub point_count: usize,
    pub attribute_sum: f64,
}

/// One result of an index walk.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexHit<'a> {
    Point(&'a IndexedPoint),
    Cluster(ClusterSummary),
}

impl IndexHit<'_> {
    pub fn point_count(&self) -> usize {
        match self {
            IndexHit::Point(_) => 1,
            IndexHit::Cluster(c) => c.point_count,
        }
    }

    pub fn position(&self) -> GeoPoint {
        match self {
            IndexHit::Point(p) => p.point,
            IndexHit::Cluster(c) => c.center,
        }
    }

    pub fn attribute_sum(&self) -> f64 {
        match self {
            IndexHit::Point(p) => p.attribute.unwrap_or(0.0),
            IndexHit::Cluster(c) => c.attribute_sum,
        }
    }
}

/// The index built for one date key.
#[derive(Debug)]
pub enum DateIndex {
    Cluster(ClusterIndex),
    Proximity(ProximityIndex),
}

impl DateIndex {
    pub fn strategy(&self) -> IndexStrategy {
        match self {
            DateIndex::Cluster(_) => IndexStrategy::Cluster,
            DateIndex::Proximity(_) => IndexStrategy::Proximity,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DateIndex::Cluster(index) => index.len(),
            DateIndex::Proximity(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> &[IndexedPoint] {
        match self {
            DateIndex::Cluster(index) => index.points(),
            DateIndex::Proximity(index) => index.points(),
        }
    }

    /// Everything visible in `bbox` at `zoom`. Proximity indexes ignore zoom.
    pub fn visible(&self, bbox: &BoundingBox, zoom: u8) -> Vec<IndexHit<'_>> {
        match self {
            DateIndex::Cluster(index) => index.clusters(bbox, zoom),
            DateIndex::Proximity(index) => index.hits_in_bbox(bbox),
        }
    }

    pub fn around(&self, center: &GeoPoint, radius_km: f64, zoom: u8) -> Vec<IndexHit<'_>> {
        match self {
            DateIndex::Cluster(index) => index.around(center, radius_km, zoom),
            DateIndex::Proximity(index) => index.hits_around(center, radius_km),
        }
    }

    pub fn aggregate_bbox(&self, bbox: &BoundingBox, zoom: u8) -> (usize, f64) {
        match self {
            DateIndex::Cluster(index) => index.aggregate_bbox(bbox, zoom),
            DateIndex::Proximity(index) => index.aggregate_bbox(bbox),
        }
    }

    pub fn aggregate_around(&self, center: &GeoPoint, radius_km: f64, zoom: u8) -> (usize, f64) {
        match self {
            DateIndex::Cluster(index) => index.aggregate_around(center, radius_km, zoom),
            DateIndex::Proximity(index) => index.aggregate_around(center, radius_km),
        }
    }
}

/// All date-key indexes of one subject.
#[derive(Debug, Default)]
pub struct SubjectIndex {
    subject: Option<SubjectId>,
    kind: PointKind,
    by_date: BTreeMap<DateKey, DateIndex>,
}

impl SubjectIndex {
    /// An index with no date keys, for "no subject" and failed loads.
    pub fn empty(kind: PointKind) -> Self {
        Self {
            subject: None,
            kind,
            by_date: BTreeMap::new(),
        }
    }

    pub(crate) fn new(
        subject: SubjectId,
        kind: PointKind,
        by_date: BTreeMap<DateKey, DateIndex>,
    ) -> Self {
        Self {
            subject: Some(subject),
            kind,
            by_date,
        }
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    pub fn kind(&self) -> PointKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn date_keys(&self) -> impl Iterator<Item = &DateKey> {
        self.by_date.keys()
    }

    pub fn get(&self, key: &DateKey) -> Option<&DateIndex> {
        self.by_date.get(key)
    }

    /// Date-key indexes that answer a query for `query`, in key order.
    pub fn matching<'a>(
        &'a self,
        query: &'a DateKey,
    ) -> impl Iterator<Item = (&'a DateKey, &'a DateIndex)> + 'a {
        self.by_date
            .iter()
            .filter(move |(key, _)| key.matches(query))
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            date_keys: self.by_date.len(),
            total_points: self.by_date.values().map(DateIndex::len).sum(),
            largest_date_key: self.by_date.values().map(DateIndex::len).max().unwrap_or(0),
        }
    }
}
