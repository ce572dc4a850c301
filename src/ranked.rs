//! Ranked aggregation of remote per-cell documents.
//!
//! One query is issued per covering cell, all of them concurrently. Every
//! subject entry found in the returned documents becomes a
//! [`RankedCandidate`] scored with the configured [`RankingConfig`] weights;
//! the merged list is sorted and reduced to one candidate per subject.
//!
//! Batches are tagged with a generation. A batch that settles after a newer
//! one was started is dropped instead of replacing the newer ranking, and a
//! failed batch leaves the previous ranking in place.

use crate::compute::spatial::haversine_km;
use crate::config::RankingConfig;
use crate::covering::Covering;
use crate::error::{BoxError, GeoIndexError, Result};
use flora_types::point::GeoPoint;
use flora_types::record::{DateKey, SubjectId};
use futures::future::join_all;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// One subject's prediction at one location inside a cell document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPrediction {
    #[serde(rename = "Ω", alias = "attribute")]
    pub attribute: f64,
    pub lat: f64,
    pub lng: f64,
    /// Area of the predicted region in square kilometers
    #[serde(rename = "km", alias = "area_size", default)]
    pub area_size: f64,
}

/// A prediction document stored under one cell token and date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionDocument {
    #[serde(rename = "Taxa", alias = "subjects", default)]
    pub subjects: BTreeMap<SubjectId, Vec<SubjectPrediction>>,
}

/// An occurrence document stored under one cell token and month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceDocument {
    #[serde(rename = "NameUsageID", alias = "subject")]
    pub subject: SubjectId,
}

/// Remote store queried once per covering cell.
pub trait DocumentStore: Send + Sync {
    fn prediction_documents(
        &self,
        token: &str,
        date: &DateKey,
    ) -> impl Future<Output = std::result::Result<Vec<PredictionDocument>, BoxError>> + Send;

    fn occurrence_documents(
        &self,
        token: &str,
        month: &DateKey,
    ) -> impl Future<Output = std::result::Result<Vec<OccurrenceDocument>, BoxError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub subject: SubjectId,
    pub score: f64,
    pub distance_km: f64,
    pub area_size: f64,
    pub attribute: f64,
    pub location: GeoPoint,
    /// Token of the covering cell the candidate was found under
    pub token: String,
}

/// Score every subject entry of `documents` against `center`.
pub fn score_documents(
    token: &str,
    documents: &[PredictionDocument],
    center: &GeoPoint,
    ranking: &RankingConfig,
) -> Vec<RankedCandidate> {
    let mut candidates = Vec::new();
    for document in documents {
        for (subject, predictions) in &document.subjects {
            for prediction in predictions {
                let location = GeoPoint::new(prediction.lat, prediction.lng);
                let distance_km = haversine_km(&location, center);
                candidates.push(RankedCandidate {
                    subject: subject.clone(),
                    score: ranking.score(prediction.attribute, prediction.area_size, distance_km),
                    distance_km,
                    area_size: prediction.area_size,
                    attribute: prediction.attribute,
                    location,
                    token: token.to_string(),
                });
            }
        }
    }
    candidates
}

fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.token.cmp(&b.token))
        .then_with(|| a.subject.cmp(&b.subject))
}

/// Sort by score descending, then cell token and subject ascending, and
/// keep only the first candidate of each subject.
pub fn rank_candidates(mut candidates: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
    candidates.sort_by(rank_order);
    let mut seen: FxHashSet<SubjectId> = FxHashSet::default();
    candidates.retain(|c| seen.insert(c.subject.clone()));
    candidates
}

/// Result of a ranking batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    /// The batch was current and its ranking is now the latest.
    Committed(Arc<Vec<RankedCandidate>>),
    /// A newer batch started before this one settled.
    Superseded,
}

/// Fans ranking queries out over a covering and keeps the latest ranking.
#[derive(Debug)]
pub struct RankedAggregator<S> {
    store: Arc<S>,
    ranking: RankingConfig,
    generation: AtomicU64,
    latest: RwLock<Arc<Vec<RankedCandidate>>>,
}

impl<S: DocumentStore> RankedAggregator<S> {
    pub fn new(store: Arc<S>, ranking: RankingConfig) -> Self {
        Self {
            store,
            ranking,
            generation: AtomicU64::new(0),
            latest: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn ranking(&self) -> &RankingConfig {
        &self.ranking
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::SeqCst)
    }

    /// The last committed ranking.
    pub fn latest(&self) -> Arc<Vec<RankedCandidate>> {
        Arc::clone(&self.latest.read())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Rank the subjects predicted inside `covering` on `date`.
    ///
    /// An empty covering commits an empty ranking without any remote call.
    /// If any cell query fails the batch fails with
    /// [`GeoIndexError::RemoteQueryFailure`] and the previous ranking stays.
    pub async fn rank(
        &self,
        covering: &Covering,
        center: &GeoPoint,
        date: &DateKey,
    ) -> Result<RankOutcome> {
        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        let ranked = if covering.is_empty() {
            Vec::new()
        } else {
            let store = &self.store;
            let responses = join_all(covering.iter().map(|cell| async move {
                store
                    .prediction_documents(&cell.token, date)
                    .await
                    .map(|documents| (cell.token.as_str(), documents))
                    .map_err(|source| GeoIndexError::RemoteQueryFailure {
                        token: cell.token.clone(),
                        source,
                    })
            }))
            .await;

            if !self.is_current(generation) {
                log::debug!("Discarding superseded ranking batch {}", generation);
                return Ok(RankOutcome::Superseded);
            }

            let mut candidates = Vec::new();
            for response in responses {
                let (token, documents) = response?;
                candidates.extend(score_documents(token, &documents, center, &self.ranking));
            }
            rank_candidates(candidates)
        };

        let ranked = Arc::new(ranked);
        let mut latest = self.latest.write();
        if !self.is_current(generation) {
            return Ok(RankOutcome::Superseded);
        }
        *latest = Arc::clone(&ranked);
        log::debug!(
            "Committed ranking batch {} over {} cells: {} subjects",
            generation,
            covering.len(),
            ranked.len()
        );
        Ok(RankOutcome::Committed(ranked))
    }

    /// Count occurrence documents per subject across `covering` for `month`.
    ///
    /// Ordered by count descending, most observed first, then by subject id.
    /// Reverse the list for a rarest-first view.
    pub async fn tally_occurrences(
        &self,
        covering: &Covering,
        month: &DateKey,
    ) -> Result<Vec<(SubjectId, usize)>> {
        if covering.is_empty() {
            return Ok(Vec::new());
        }
        let month = month.to_month();
        let store = &self.store;
        let month = &month;
        let responses = join_all(covering.iter().map(|cell| async move {
            store
                .occurrence_documents(&cell.token, month)
                .await
                .map_err(|source| GeoIndexError::RemoteQueryFailure {
                    token: cell.token.clone(),
                    source,
                })
        }))
        .await;

        let mut counts: FxHashMap<SubjectId, usize> = FxHashMap::default();
        for response in responses {
            for document in response? {
                *counts.entry(document.subject).or_default() += 1;
            }
        }
        let mut tally: Vec<(SubjectId, usize)> = counts.into_iter().collect();
        tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(tally)
    }
}
