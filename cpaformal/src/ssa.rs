//! Variable version maps.
use std::{collections::BTreeMap, fmt, sync::Arc};

use cpacfa::Var;

/// Immutable map from program variables to their current SSA index.
///
/// Variables that were never written have index 0. Updates return a new map
/// and leave the receiver untouched; clones share their storage.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SsaMap(Arc<BTreeMap<Var, u32>>);

impl SsaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &Var) -> u32 {
        self.0.get(var).copied().unwrap_or(0)
    }

    /// Map where `var` has index `index`.
    pub fn with(&self, var: Var, index: u32) -> Self {
        let mut map = (*self.0).clone();
        map.insert(var, index);
        Self(Arc::new(map))
    }

    /// Bump the index of `var`, returning the new map and the fresh index.
    pub fn fresh(&self, var: &Var) -> (Self, u32) {
        let index = self.get(var) + 1;
        (self.with(var.clone(), index), index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, u32)> {
        self.0.iter().map(|(var, index)| (var, *index))
    }
}

impl fmt::Debug for SsaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_do_not_alias() {
        let x = Var::new("x");
        let empty = SsaMap::new();
        let (one, index) = empty.fresh(&x);
        let (two, _) = one.fresh(&x);

        assert_eq!(index, 1);
        assert_eq!(empty.get(&x), 0);
        assert_eq!(one.get(&x), 1);
        assert_eq!(two.get(&x), 2);
        assert_eq!(two.get(&Var::new("y")), 0);
        assert_eq!(one, SsaMap::new().with(x, 1));
    }
}
