//! Generation-guarded holder of the current subject index.
//!
//! Every subject selection or reload bumps a generation counter and hands
//! out a [`LoadTicket`]. A finished build only lands if its ticket is still
//! current, so a slow load that was overtaken by a newer one is dropped
//! instead of overwriting fresher state. The lock is only held for the swap
//! itself, never across an await.

use super::SubjectIndex;
use flora_types::record::{PointKind, SubjectId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Proof that a load was started at a given generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    subject: SubjectId,
    kind: PointKind,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn kind(&self) -> PointKind {
        self.kind
    }
}

#[derive(Debug)]
struct StoreState {
    generation: u64,
    subject: Option<SubjectId>,
    loading: bool,
    index: Arc<SubjectIndex>,
}

#[derive(Debug)]
pub struct IndexStore {
    kind: PointKind,
    state: RwLock<StoreState>,
}

impl IndexStore {
    pub fn new(kind: PointKind) -> Self {
        Self {
            kind,
            state: RwLock::new(StoreState {
                generation: 0,
                subject: None,
                loading: false,
                index: Arc::new(SubjectIndex::empty(kind)),
            }),
        }
    }

    pub fn kind(&self) -> PointKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.state.read().subject.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    /// Switch to `subject`, discarding the current index.
    ///
    /// Returns a ticket for loading the new subject, or `None` when the
    /// selection was cleared.
    pub fn select(&self, subject: Option<SubjectId>) -> Option<LoadTicket> {
        let mut state = self.state.write();
        state.generation += 1;
        state.index = Arc::new(SubjectIndex::empty(self.kind));
        state.subject = subject.filter(|s| !s.is_empty());
        state.loading = state.subject.is_some();
        log::debug!(
            "{} store selected {:?} at generation {}",
            self.kind,
            state.subject,
            state.generation
        );
        state.subject.clone().map(|subject| LoadTicket {
            generation: state.generation,
            subject,
            kind: self.kind,
        })
    }

    /// Start another load of the current subject, superseding any load in
    /// flight.
    pub fn begin_load(&self) -> Option<LoadTicket> {
        let mut state = self.state.write();
        let subject = state.subject.clone()?;
        state.generation += 1;
        state.loading = true;
        Some(LoadTicket {
            generation: state.generation,
            subject,
            kind: self.kind,
        })
    }

    fn is_current(state: &StoreState, ticket: &LoadTicket) -> bool {
        state.generation == ticket.generation && state.subject.as_ref() == Some(&ticket.subject)
    }

    /// Publish a finished build. Returns `false` when the ticket is stale.
    pub fn commit(&self, ticket: &LoadTicket, index: SubjectIndex) -> bool {
        let mut state = self.state.write();
        if !Self::is_current(&state, ticket) {
            log::debug!(
                "Discarding stale {} index for [{}]: generation {} != {}",
                self.kind,
                ticket.subject,
                ticket.generation,
                state.generation
            );
            return false;
        }
        state.index = Arc::new(index);
        state.loading = false;
        true
    }

    /// Record a failed load: the index reverts to empty and loading ends.
    pub fn fail(&self, ticket: &LoadTicket) -> bool {
        let mut state = self.state.write();
        if !Self::is_current(&state, ticket) {
            return false;
        }
        state.index = Arc::new(SubjectIndex::empty(self.kind));
        state.loading = false;
        true
    }

    /// The committed index, or `None` while a load is in flight.
    pub fn snapshot(&self) -> Option<Arc<SubjectIndex>> {
        let state = self.state.read();
        if state.loading {
            None
        } else {
            Some(Arc::clone(&state.index))
        }
    }
}
