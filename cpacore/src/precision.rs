use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use cpacfa::Location;
use cpaformal::abstraction::PredicateId;
use parking_lot::RwLock;

/// Predicates tracked by the abstraction, globally and per location.
///
/// Precisions only grow: refinement adds predicates, nothing removes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicatePrecision {
    global: BTreeSet<PredicateId>,
    local: BTreeMap<Location, BTreeSet<PredicateId>>,
}

/// Precision shared between the transfer relation and the refiner.
pub type SharedPrecision = Arc<RwLock<PredicatePrecision>>;

impl PredicatePrecision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedPrecision {
        Arc::new(RwLock::new(self))
    }

    /// Track `predicate` at every location. Returns whether it was new.
    pub fn add_global(&mut self, predicate: PredicateId) -> bool {
        self.global.insert(predicate)
    }

    /// Track `predicate` at `location`. Returns whether it was new there.
    pub fn add(&mut self, location: Location, predicate: PredicateId) -> bool {
        if self.global.contains(&predicate) {
            return false;
        }
        self.local.entry(location).or_default().insert(predicate)
    }

    /// Number of predicates that were new at `location`.
    pub fn add_all(&mut self, location: Location, predicates: impl IntoIterator<Item = PredicateId>) -> usize {
        predicates
            .into_iter()
            .filter(|predicate| self.add(location, *predicate))
            .count()
    }

    /// Predicates used when abstracting at `location`.
    pub fn predicates_at(&self, location: Location) -> BTreeSet<PredicateId> {
        let mut predicates = self.global.clone();
        if let Some(local) = self.local.get(&location) {
            predicates.extend(local.iter().copied());
        }
        predicates
    }

    pub fn global(&self) -> &BTreeSet<PredicateId> {
        &self.global
    }

    pub fn locations(&self) -> impl Iterator<Item = (Location, &BTreeSet<PredicateId>)> {
        self.local.iter().map(|(location, predicates)| (*location, predicates))
    }

    /// Total number of (location, predicate) entries plus global predicates.
    pub fn len(&self) -> usize {
        self.global.len() + self.local.values().map(BTreeSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
