//! Abstract states of the predicate analysis.
//!
//! A state is either an *abstraction state*, created at a block head, whose
//! region is exactly its [`AbstractFormula`], or a *block-interior* state whose
//! region is the last abstraction conjoined with the path formula of the
//! block so far.
use std::{fmt, sync::Arc};

use cpacfa::Location;
use cpaformal::{abstraction::AbstractFormula, path_formula::PathFormula};

use crate::arg::ArgNodeId;

struct StackNode<T> {
    head: T,
    tail: PersistentStack<T>,
    len: usize,
}

/// Immutable stack sharing its tail between versions.
pub struct PersistentStack<T>(Option<Arc<StackNode<T>>>);

impl<T> PersistentStack<T> {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn push(&self, head: T) -> Self {
        Self(Some(Arc::new(StackNode {
            head,
            tail: self.clone(),
            len: self.len() + 1,
        })))
    }

    pub fn peek(&self) -> Option<&T> {
        self.0.as_ref().map(|node| &node.head)
    }

    /// Top element and the stack below it.
    pub fn pop(&self) -> Option<(&T, Self)> {
        self.0.as_ref().map(|node| (&node.head, node.tail.clone()))
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Elements from the top of the stack down.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut cursor = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.tail.0.as_deref();
            Some(&node.head)
        })
    }
}

impl<T> Clone for PersistentStack<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for PersistentStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for PersistentStack<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(lhs), Some(rhs)) if Arc::ptr_eq(lhs, rhs) => true,
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

impl<T: Eq> Eq for PersistentStack<T> {}

impl<T: fmt::Debug> fmt::Debug for PersistentStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Abstraction computed along the path to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbstractionPoint {
    pub location: Location,
    pub abstraction: AbstractFormula,
}

/// Return sites of the pending calls, innermost on top.
pub type CallStack = PersistentStack<Location>;

#[derive(Debug, Clone, PartialEq)]
pub struct AbstractState {
    location: Location,
    abstraction_location: Location,
    path_formula: PathFormula,
    abstraction: AbstractFormula,
    history: PersistentStack<AbstractionPoint>,
    size_since_abstraction: usize,
    call_stack: CallStack,
    covering_hint: Option<ArgNodeId>,
    deferred_return: bool,
}

impl AbstractState {
    /// Abstraction state at the start of the analysis.
    pub fn initial(location: Location, abstraction: AbstractFormula) -> Self {
        debug_assert!(!abstraction.is_false(), "initial state with a false abstraction");
        Self {
            location,
            abstraction_location: location,
            path_formula: PathFormula::identity(),
            abstraction,
            history: PersistentStack::new().push(AbstractionPoint { location, abstraction }),
            size_since_abstraction: 0,
            call_stack: CallStack::new(),
            covering_hint: None,
            deferred_return: false,
        }
    }

    /// Block-interior successor: same block, extended path formula.
    pub(crate) fn interior_successor(&self, location: Location, path_formula: PathFormula, call_stack: CallStack) -> Self {
        Self {
            location,
            abstraction_location: self.abstraction_location,
            path_formula,
            abstraction: self.abstraction,
            history: self.history.clone(),
            size_since_abstraction: self.size_since_abstraction + 1,
            call_stack,
            covering_hint: None,
            deferred_return: false,
        }
    }

    /// Abstraction successor opening a new block at `location`.
    ///
    /// `path_formula` is the identity, except after a return edge whose
    /// formula was deferred past the abstraction.
    pub(crate) fn abstraction_successor(
        &self,
        location: Location,
        abstraction: AbstractFormula,
        path_formula: PathFormula,
        call_stack: CallStack,
        deferred_return: bool,
    ) -> Self {
        debug_assert!(!abstraction.is_false(), "abstract states are never stored with a false abstraction");
        Self {
            location,
            abstraction_location: location,
            path_formula,
            abstraction,
            history: self.history.push(AbstractionPoint { location, abstraction }),
            size_since_abstraction: 0,
            call_stack,
            covering_hint: None,
            deferred_return,
        }
    }

    /// Record a covering candidate, accepted by the stop operator without an
    /// entailment check.
    ///
    /// Meant for joining merge operators of composed analyses, which know the
    /// reached state that subsumes their result. [`crate::merge::MergeSep`]
    /// never sets it.
    pub fn with_covering_hint(mut self, hint: ArgNodeId) -> Self {
        self.covering_hint = Some(hint);
        self
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn abstraction_location(&self) -> Location {
        self.abstraction_location
    }

    pub fn path_formula(&self) -> &PathFormula {
        &self.path_formula
    }

    pub fn abstraction(&self) -> AbstractFormula {
        self.abstraction
    }

    pub fn history(&self) -> &PersistentStack<AbstractionPoint> {
        &self.history
    }

    pub fn size_since_abstraction(&self) -> usize {
        self.size_since_abstraction
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn covering_hint(&self) -> Option<ArgNodeId> {
        self.covering_hint
    }

    /// Whether the state was created at a block head.
    pub fn is_abstraction_state(&self) -> bool {
        self.size_since_abstraction == 0
    }

    /// Whether the formula of the incoming return edge was moved to the start
    /// of this state's block.
    pub fn has_deferred_return(&self) -> bool {
        self.deferred_return
    }
}

impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if !self.is_abstraction_state() {
            write!(f, " (+{} since {})", self.size_since_abstraction, self.abstraction_location)?;
        }
        if !self.call_stack.is_empty() {
            write!(f, " [depth {}]", self.call_stack.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacks_share_their_tails() {
        let base: PersistentStack<u32> = PersistentStack::new().push(1).push(2);
        let left = base.push(3);
        let right = base.push(4);

        assert_eq!(left.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(right.len(), 3);
        let (top, rest) = right.pop().unwrap();
        assert_eq!(*top, 4);
        assert_eq!(rest, base);
        assert_ne!(left, right);
        assert_eq!(PersistentStack::<u32>::new().peek(), None);
        assert_eq!(format!("{base:?}"), "[2, 1]");
    }
}
