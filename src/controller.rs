//! Pull-based recompute tracking.
//!
//! Every [`Input`] carries a revision that only moves when its value really
//! changes. Each [`Component`] declares the inputs it reads; when it
//! recomputes it records the revisions it saw. A component is dirty while
//! any declared input has moved past the revision it last consumed.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Observable inputs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Input {
    Location,
    Zoom,
    Viewport,
    Date,
    Subject,
    Kind,
    /// A subject index was committed or failed
    Index,
}

impl Input {
    pub const ALL: [Input; 7] = [
        Input::Location,
        Input::Zoom,
        Input::Viewport,
        Input::Date,
        Input::Subject,
        Input::Kind,
        Input::Index,
    ];
}

/// Derived values a session computes from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Bounds,
    Covering,
    MapPoints,
    Ranking,
    Timeline,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Bounds,
        Component::Covering,
        Component::MapPoints,
        Component::Ranking,
        Component::Timeline,
    ];

    /// Inputs the component reads.
    pub fn inputs(&self) -> &'static [Input] {
        use Input::*;
        match self {
            Component::Bounds | Component::Covering => &[Location, Zoom, Viewport],
            Component::MapPoints => &[Location, Zoom, Viewport, Date, Subject, Kind, Index],
            Component::Ranking => &[Location, Zoom, Viewport, Date],
            Component::Timeline => &[Location, Zoom, Viewport, Date, Subject, Kind, Index],
        }
    }
}

pub type Revisions = SmallVec<[(Input, u64); 8]>;

#[derive(Debug, Clone)]
pub struct RecomputeController {
    revisions: FxHashMap<Input, u64>,
    consumed: FxHashMap<Component, Revisions>,
}

impl RecomputeController {
    pub fn new() -> Self {
        Self {
            revisions: Input::ALL.iter().map(|i| (*i, 0)).collect(),
            consumed: FxHashMap::default(),
        }
    }

    pub fn revision(&self, input: Input) -> u64 {
        self.revisions.get(&input).copied().unwrap_or(0)
    }

    /// Record a real change of `input`.
    pub fn bump(&mut self, input: Input) -> u64 {
        let revision = self.revisions.entry(input).or_insert(0);
        *revision += 1;
        log::debug!("Input {:?} moved to revision {}", input, revision);
        *revision
    }

    /// Bump `input` only if `changed`. Returns `changed`.
    pub fn bump_if(&mut self, input: Input, changed: bool) -> bool {
        if changed {
            self.bump(input);
        }
        changed
    }

    /// Whether `component` must recompute. A component that never
    /// recomputed is dirty.
    pub fn is_dirty(&self, component: Component) -> bool {
        match self.consumed.get(&component) {
            None => true,
            Some(seen) => {
                component.inputs().len() != seen.len()
                    || seen.iter().any(|(input, rev)| self.revision(*input) != *rev)
            }
        }
    }

    /// Record that `component` recomputed against the current revisions.
    pub fn mark_clean(&mut self, component: Component) {
        let seen: Revisions = component
            .inputs()
            .iter()
            .map(|input| (*input, self.revision(*input)))
            .collect();
        self.consumed.insert(component, seen);
    }

    /// Record a recompute against revisions captured earlier with
    /// [`RecomputeController::snapshot`], for work that ran without the
    /// controller at hand.
    pub fn mark_clean_at(&mut self, component: Component, seen: Revisions) {
        self.consumed.insert(component, seen);
    }

    /// Current revisions of the inputs `component` reads.
    pub fn snapshot(&self, component: Component) -> Revisions {
        component
            .inputs()
            .iter()
            .map(|input| (*input, self.revision(*input)))
            .collect()
    }

    pub fn dirty_components(&self) -> Vec<Component> {
        Component::ALL
            .iter()
            .copied()
            .filter(|c| self.is_dirty(*c))
            .collect()
    }
}

impl Default for RecomputeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_start_dirty_and_clean_up() {
        let mut controller = RecomputeController::new();
        assert_eq!(controller.dirty_components(), Component::ALL.to_vec());
        for component in Component::ALL {
            controller.mark_clean(component);
        }
        assert!(controller.dirty_components().is_empty());
    }

    #[test]
    fn test_only_dependents_become_dirty() {
        let mut controller = RecomputeController::new();
        for component in Component::ALL {
            controller.mark_clean(component);
        }
        controller.bump(Input::Date);
        assert_eq!(
            controller.dirty_components(),
            vec![Component::MapPoints, Component::Ranking, Component::Timeline]
        );

        controller.mark_clean(Component::MapPoints);
        controller.mark_clean(Component::Ranking);
        controller.mark_clean(Component::Timeline);
        assert!(!controller.bump_if(Input::Zoom, false));
        assert!(controller.dirty_components().is_empty());
    }

    #[test]
    fn test_snapshot_taken_before_a_change_stays_dirty() {
        let mut controller = RecomputeController::new();
        let seen = controller.snapshot(Component::Ranking);
        controller.bump(Input::Location);
        controller.mark_clean_at(Component::Ranking, seen);
        assert!(controller.is_dirty(Component::Ranking));
    }

    #[test]
    fn test_date_change_dirties_timeline() {
        let mut controller = RecomputeController::new();
        for component in Component::ALL {
            controller.mark_clean(component);
        }
        controller.bump(Input::Date);
        assert!(controller.is_dirty(Component::Timeline));
        assert!(!controller.is_dirty(Component::Bounds));
        assert!(!controller.is_dirty(Component::Covering));
        assert!(Component::Timeline.inputs().contains(&Input::Date));
    }
}
