use std::collections::{BTreeSet, HashMap};

use cpacfa::Location;

use crate::arg::ArgNodeId;

/// Uncovered explored states, grouped by location in insertion order.
#[derive(Debug, Default)]
pub struct ReachedSet {
    order: Vec<ArgNodeId>,
    by_location: HashMap<Location, Vec<ArgNodeId>>,
}

impl ReachedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ArgNodeId, location: Location) {
        self.order.push(id);
        self.by_location.entry(location).or_default().push(id);
    }

    /// States at `location`, oldest first.
    pub fn at(&self, location: Location) -> &[ArgNodeId] {
        self.by_location.get(&location).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove_all(&mut self, removed: &BTreeSet<ArgNodeId>) {
        if removed.is_empty() {
            return;
        }
        self.order.retain(|id| !removed.contains(id));
        for ids in self.by_location.values_mut() {
            ids.retain(|id| !removed.contains(id));
        }
        self.by_location.retain(|_, ids| !ids.is_empty());
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        self.order.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Last-in first-out waitlist.
#[derive(Debug, Default)]
pub struct Waitlist {
    stack: Vec<ArgNodeId>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ArgNodeId) {
        self.stack.push(id);
    }

    pub fn pop(&mut self) -> Option<ArgNodeId> {
        self.stack.pop()
    }

    pub fn remove_all(&mut self, removed: &BTreeSet<ArgNodeId>) {
        self.stack.retain(|id| !removed.contains(id));
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        self.stack.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
