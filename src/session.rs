//! The session context: inputs, index stores, and memoized derived values.
//!
//! A [`Session`] owns everything one map view needs. Setters record real
//! changes with the [`RecomputeController`]; getters recompute a derived
//! value only when one of its declared inputs moved, and otherwise return
//! the memoized copy. Subject loads run as async tasks tagged with
//! [`LoadTicket`]s, so a late load for a previous subject never lands.

use crate::calendar::{Clock, DateSelection, SystemClock, prediction_range};
use crate::config::Config;
use crate::controller::{Component, Input, RecomputeController};
use crate::covering::{Covering, RegionCoverer};
use crate::error::Result;
use crate::index::{IndexStore, LoadTicket, PointIndexBuilder};
use crate::ingest::{DatasetSource, RecordParser};
use crate::query::{MapFeature, PointQueryEngine, QueryGeometry};
use crate::ranked::{DocumentStore, RankOutcome, RankedAggregator, RankedCandidate};
use crate::timeline::{TickSchedule, TimeBucket, TimelineBucketer};
use crate::viewport::{self, Viewport, ViewportBounds};
use chrono::NaiveDate;
use flora_types::point::GeoPoint;
use flora_types::record::{DateKey, PointKind, SubjectId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;

/// Location used until the caller provides one.
pub const FALLBACK_LOCATION: GeoPoint = GeoPoint::new(35.538851, -82.7054901);

struct SessionState {
    location: GeoPoint,
    zoom: u8,
    viewport: Viewport,
    date: DateSelection,
    subject: Option<SubjectId>,
    kind: PointKind,
    controller: RecomputeController,
    bounds: ViewportBounds,
    covering: Arc<Covering>,
    map_points: Arc<Vec<MapFeature>>,
    timeline: Arc<Vec<TimeBucket>>,
}

pub struct Session<D, S> {
    config: Config,
    clock: Arc<dyn Clock>,
    source: Arc<D>,
    builder: PointIndexBuilder,
    coverer: RegionCoverer,
    bucketer: TimelineBucketer,
    predictions: PointQueryEngine,
    occurrences: PointQueryEngine,
    ranked: RankedAggregator<S>,
    state: Mutex<SessionState>,
}

impl<D, S> std::fmt::Debug for Session<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("location", &state.location)
            .field("zoom", &state.zoom)
            .field("viewport", &state.viewport)
            .field("date", &state.date.date())
            .field("subject", &state.subject)
            .field("kind", &state.kind)
            .finish_non_exhaustive()
    }
}

impl<D: DatasetSource, S: DocumentStore> Session<D, S> {
    pub fn builder(source: Arc<D>, documents: Arc<S>) -> SessionBuilder<D, S> {
        SessionBuilder::new(source, documents)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self, kind: PointKind) -> &PointQueryEngine {
        match kind {
            PointKind::Predictions => &self.predictions,
            PointKind::Occurrences => &self.occurrences,
        }
    }

    fn store(&self, kind: PointKind) -> &Arc<IndexStore> {
        self.engine(kind).store()
    }

    pub fn location(&self) -> GeoPoint {
        self.state.lock().location
    }

    pub fn zoom(&self) -> u8 {
        self.state.lock().zoom
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn date(&self) -> NaiveDate {
        self.state.lock().date.date()
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.state.lock().subject.clone()
    }

    pub fn kind(&self) -> PointKind {
        self.state.lock().kind
    }

    pub fn is_loading(&self) -> bool {
        self.store(self.kind()).is_loading()
    }

    /// Move the map center. Coordinates are rounded before comparison, so
    /// jitter below the rounding precision is not a change.
    pub fn set_location(&self, location: GeoPoint) -> bool {
        let location = location.rounded();
        let mut state = self.state.lock();
        let changed = state.location != location;
        state.location = location;
        state.controller.bump_if(Input::Location, changed)
    }

    /// Set the zoom, raised to the configured minimum.
    pub fn set_zoom(&self, zoom: u8) -> bool {
        let zoom = zoom.max(self.config.viewport.min_zoom);
        let mut state = self.state.lock();
        let changed = state.zoom != zoom;
        state.zoom = zoom;
        state.controller.bump_if(Input::Zoom, changed)
    }

    pub fn set_viewport(&self, viewport: Viewport) -> bool {
        let mut state = self.state.lock();
        let changed = state.viewport != viewport;
        state.viewport = viewport;
        state.controller.bump_if(Input::Viewport, changed)
    }

    /// Select a prediction date; non-standard days snap back.
    pub fn set_date(&self, date: NaiveDate) -> bool {
        let mut state = self.state.lock();
        let changed = state.date.set(date);
        state.controller.bump_if(Input::Date, changed)
    }

    pub fn set_date_formatted(&self, raw: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let changed = state.date.set_formatted(raw)?;
        Ok(state.controller.bump_if(Input::Date, changed))
    }

    pub fn set_kind(&self, kind: PointKind) -> bool {
        let mut state = self.state.lock();
        let changed = state.kind != kind;
        state.kind = kind;
        state.controller.bump_if(Input::Kind, changed)
    }

    /// Switch subjects. Both index stores drop their data and enter loading;
    /// the returned tickets are passed to [`Session::load`].
    ///
    /// Re-selecting the current subject does nothing and returns no tickets.
    pub fn select_subject(&self, subject: Option<SubjectId>) -> Vec<LoadTicket> {
        let subject = subject.filter(|s| !s.is_empty());
        let mut state = self.state.lock();
        if state.subject == subject {
            return Vec::new();
        }
        state.subject = subject.clone();
        state.controller.bump(Input::Subject);
        log::debug!("Session subject changed to {:?}", subject);
        [PointKind::Predictions, PointKind::Occurrences]
            .into_iter()
            .filter_map(|kind| self.store(kind).select(subject.clone()))
            .collect()
    }

    /// Start fresh loads of the current subject, superseding loads in flight.
    pub fn reload(&self) -> Vec<LoadTicket> {
        let mut state = self.state.lock();
        let tickets: Vec<LoadTicket> = [PointKind::Predictions, PointKind::Occurrences]
            .into_iter()
            .filter_map(|kind| self.store(kind).begin_load())
            .collect();
        if !tickets.is_empty() {
            state.controller.bump(Input::Index);
        }
        tickets
    }

    /// Fetch, parse and index the dataset a ticket was issued for.
    ///
    /// Returns `Ok(false)` when the ticket went stale while loading, in which
    /// case nothing is committed. A transport failure of a current ticket
    /// empties the index and is returned as the error.
    pub async fn load(&self, ticket: LoadTicket) -> Result<bool> {
        let kind = ticket.kind();
        let store = self.store(kind);
        let parser =
            RecordParser::with_config(ticket.subject().clone(), kind, &self.config.ingest);

        match parser.fetch_and_parse(self.source.as_ref()).await {
            Ok(report) => {
                let index = self
                    .builder
                    .build(ticket.subject().clone(), kind, report.records);
                let committed = store.commit(&ticket, index);
                if committed {
                    self.state.lock().controller.bump(Input::Index);
                }
                Ok(committed)
            }
            Err(e) => {
                if store.fail(&ticket) {
                    self.state.lock().controller.bump(Input::Index);
                    log::warn!("Loading {} for [{}] failed: {}", kind, ticket.subject(), e);
                    Err(e)
                } else {
                    log::debug!("Ignoring failure of stale load for [{}]: {}", ticket.subject(), e);
                    Ok(false)
                }
            }
        }
    }

    /// Select `subject` and load both of its datasets.
    pub async fn select_and_load(&self, subject: Option<SubjectId>) -> Result<()> {
        let tickets = self.select_subject(subject);
        for result in join_all(tickets.into_iter().map(|t| self.load(t))).await {
            result?;
        }
        Ok(())
    }

    fn date_key(state: &SessionState, kind: PointKind) -> DateKey {
        match kind {
            PointKind::Predictions => state.date.day_key(),
            PointKind::Occurrences => state.date.month_key(),
        }
    }

    fn bounds_in(&self, state: &mut SessionState) -> ViewportBounds {
        if state.controller.is_dirty(Component::Bounds) {
            state.bounds = viewport::compute(
                &state.location,
                state.zoom,
                state.viewport,
                self.config.viewport.tile_size,
            );
            state.controller.mark_clean(Component::Bounds);
        }
        state.bounds
    }

    fn covering_in(&self, state: &mut SessionState) -> Arc<Covering> {
        if state.controller.is_dirty(Component::Covering) {
            let bounds = self.bounds_in(state);
            state.covering = Arc::new(self.coverer.cover_radius(&state.location, bounds.radius_km));
            state.controller.mark_clean(Component::Covering);
        }
        Arc::clone(&state.covering)
    }

    /// Box and radius of the current viewport.
    pub fn bounds(&self) -> ViewportBounds {
        self.bounds_in(&mut self.state.lock())
    }

    /// Covering of the current viewport radius. Empty until the viewport is
    /// laid out.
    pub fn covering(&self) -> Arc<Covering> {
        self.covering_in(&mut self.state.lock())
    }

    /// Points and clusters of the active kind inside the viewport.
    pub fn map_points(&self) -> Arc<Vec<MapFeature>> {
        let mut state = self.state.lock();
        if state.controller.is_dirty(Component::MapPoints) {
            let bounds = self.bounds_in(&mut state);
            let kind = state.kind;
            let key = Self::date_key(&state, kind);
            let points = self.engine(kind).get_points(&bounds.bbox, state.zoom, &key);
            log::debug!("Recomputed {} map points for {}", points.len(), key);
            state.map_points = Arc::new(points);
            state.controller.mark_clean(Component::MapPoints);
        }
        Arc::clone(&state.map_points)
    }

    /// Timeline buckets of the active kind around the viewport center.
    pub fn timeline(&self) -> Arc<Vec<TimeBucket>> {
        let mut state = self.state.lock();
        if state.controller.is_dirty(Component::Timeline) {
            let bounds = self.bounds_in(&mut state);
            let kind = state.kind;
            let schedule = TickSchedule::for_kind(
                kind,
                prediction_range(self.clock.today(), self.config.timeline.prediction_weeks),
                self.config.timeline.reference_year,
            );
            let geometry = QueryGeometry::Radius {
                center: state.location,
                radius_km: bounds.radius_km,
            };
            let buckets = self.bucketer.buckets(
                self.engine(kind),
                &geometry,
                state.zoom,
                &schedule,
                f64::from(state.viewport.width),
            );
            state.timeline = Arc::new(buckets);
            state.controller.mark_clean(Component::Timeline);
        }
        Arc::clone(&state.timeline)
    }

    /// The last committed ranking.
    pub fn ranking(&self) -> Arc<Vec<RankedCandidate>> {
        self.ranked.latest()
    }

    pub fn ranking_is_stale(&self) -> bool {
        self.state.lock().controller.is_dirty(Component::Ranking)
    }

    /// Rank subjects predicted around the current location on the current
    /// date.
    pub async fn rank(&self) -> Result<RankOutcome> {
        let (covering, center, date, seen) = {
            let mut state = self.state.lock();
            let covering = self.covering_in(&mut state);
            let seen = state.controller.snapshot(Component::Ranking);
            (
                covering,
                state.location,
                Self::date_key(&state, PointKind::Predictions),
                seen,
            )
        };

        let outcome = self.ranked.rank(&covering, &center, &date).await?;
        if matches!(outcome, RankOutcome::Committed(_)) {
            self.state
                .lock()
                .controller
                .mark_clean_at(Component::Ranking, seen);
        }
        Ok(outcome)
    }

    /// Occurrence counts per subject around the current location for the
    /// current month.
    pub async fn tally_occurrences(&self) -> Result<Vec<(SubjectId, usize)>> {
        let (covering, month) = {
            let mut state = self.state.lock();
            (
                self.covering_in(&mut state),
                Self::date_key(&state, PointKind::Occurrences),
            )
        };
        self.ranked.tally_occurrences(&covering, &month).await
    }

    pub fn dirty_components(&self) -> Vec<Component> {
        self.state.lock().controller.dirty_components()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<D, S> {
    source: Arc<D>,
    documents: Arc<S>,
    config: Config,
    clock: Arc<dyn Clock>,
    location: GeoPoint,
    zoom: Option<u8>,
    viewport: Viewport,
    kind: PointKind,
}

impl<D: DatasetSource, S: DocumentStore> SessionBuilder<D, S> {
    pub fn new(source: Arc<D>, documents: Arc<S>) -> Self {
        Self {
            source,
            documents,
            config: Config::default(),
            clock: Arc::new(SystemClock),
            location: FALLBACK_LOCATION,
            zoom: None,
            viewport: Viewport::default(),
            kind: PointKind::default(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn location(mut self, location: GeoPoint) -> Self {
        self.location = location;
        self
    }

    /// Initial zoom; defaults to the configured default zoom.
    pub fn zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn kind(mut self, kind: PointKind) -> Self {
        self.kind = kind;
        self
    }

    /// Validate the configuration and build the session.
    pub fn build(self) -> Result<Session<D, S>> {
        self.config.validate()?;
        let config = self.config;

        let location = if self.location.is_valid() {
            self.location.rounded()
        } else {
            FALLBACK_LOCATION
        };
        let zoom = self
            .zoom
            .unwrap_or(config.viewport.default_zoom)
            .max(config.viewport.min_zoom);

        let state = SessionState {
            location,
            zoom,
            viewport: self.viewport,
            date: DateSelection::new(self.clock.as_ref()),
            subject: None,
            kind: self.kind,
            controller: RecomputeController::new(),
            bounds: ViewportBounds {
                bbox: flora_types::bbox::BoundingBox::new(0.0, 0.0, 0.0, 0.0),
                radius_km: 0.0,
            },
            covering: Arc::new(Covering::empty()),
            map_points: Arc::new(Vec::new()),
            timeline: Arc::new(Vec::new()),
        };

        Ok(Session {
            builder: PointIndexBuilder::new(config.clone()),
            coverer: RegionCoverer::new(config.covering.clone()),
            bucketer: TimelineBucketer::new(config.timeline.clone()),
            predictions: PointQueryEngine::new(Arc::new(IndexStore::new(PointKind::Predictions))),
            occurrences: PointQueryEngine::new(Arc::new(IndexStore::new(PointKind::Occurrences))),
            ranked: RankedAggregator::new(self.documents, config.ranking.clone()),
            clock: self.clock,
            source: self.source,
            state: Mutex::new(state),
            config,
        })
    }
}
