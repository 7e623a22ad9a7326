//! Causal growing list
//!
//! A growing list is an append-only log whose items point at their
//! predecessor by [`Dot`]. Concurrent appends fork the log; a
//! [`Register`] of [`GrowingListItem`]s holds the tips of every branch.
//!
//! [`show`] turns those tips back into one linear, oldest-first view. Items
//! on the common prefix are tagged [`ConflictState::InAllTimelines`]; items
//! that only exist on some branches are tagged with the timelines (tip
//! indices, in register order) they belong to.
//!
//! # Walk
//!
//! Each working entry maps a set of timeline ids to the head of its branch.
//! Until one entry remains:
//!
//! 1. Entries whose heads have identical clocks are the same causal point;
//!    their timeline sets are unioned.
//! 2. Otherwise the head that no other head dominates is emitted (ties broken
//!    by the largest causal key) and its owner walks back to the predecessor.
//!    A head without a reachable predecessor falls off the back and the
//!    result is no longer fully resolved.
//!
//! Every step either merges two entries or moves one strictly backwards in a
//! finite history, so the walk terminates.

use crate::causality::{ClockOrdering, Dot, OperationMetadata};
use crate::register::Register;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One node of a growing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowingListItem<T> {
    /// Application payload
    pub item: T,
    /// Dot of the item this one was appended after
    pub predecessor: Option<Dot>,
}

impl<T> GrowingListItem<T> {
    /// Item appended after `predecessor`.
    pub fn new(item: T, predecessor: Option<Dot>) -> Self {
        Self { item, predecessor }
    }

    /// First item of a list.
    pub fn root(item: T) -> Self {
        Self::new(item, None)
    }
}

/// Which logical timelines an item of the projection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictState {
    /// Shared by every branch
    InAllTimelines,
    /// Only on the listed timelines (tip indices)
    InTimelines(BTreeSet<usize>),
}

impl ConflictState {
    /// True for items every branch agrees on.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ConflictState::InAllTimelines)
    }

    /// True when the item is on the given timeline.
    pub fn includes(&self, timeline: usize) -> bool {
        match self {
            ConflictState::InAllTimelines => true,
            ConflictState::InTimelines(timelines) => timelines.contains(&timeline),
        }
    }
}

/// One row of the projected list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry<T> {
    /// Dot of the operation that appended the item
    pub dot: Dot,
    /// Timeline membership
    pub conflict: ConflictState,
    /// Application payload
    pub item: T,
}

struct Head<T> {
    item: GrowingListItem<T>,
    metadata: OperationMetadata,
}

struct Branch<T> {
    timelines: BTreeSet<usize>,
    head: Head<T>,
}

/// Project a register of branch tips into an oldest-first list.
///
/// `fetch` resolves a predecessor dot to the item and metadata it was
/// written with; it is the only access to history the walk needs.
pub fn show<T, F>(tips: &Register<GrowingListItem<T>>, mut fetch: F) -> Vec<ListEntry<T>>
where
    T: Clone,
    F: FnMut(&Dot) -> Option<(GrowingListItem<T>, OperationMetadata)>,
{
    let mut branches: Vec<Branch<T>> = tips
        .iter()
        .enumerate()
        .map(|(index, (item, metadata))| Branch {
            timelines: BTreeSet::from([index]),
            head: Head {
                item: item.clone(),
                metadata: metadata.clone(),
            },
        })
        .collect();

    let mut newest_first = Vec::new();
    let mut visited = HashSet::new();
    let mut fully_resolved = true;

    while branches.len() > 1 {
        if let Some((keep, absorb)) = find_equal_heads(&branches) {
            let absorbed = branches.swap_remove(absorb);
            branches[keep].timelines.extend(absorbed.timelines);
            continue;
        }

        let index = newest_undominated(&branches);
        let branch = &branches[index];
        let dot = branch.head.metadata.to_dot();
        visited.insert(dot.clone());
        newest_first.push(ListEntry {
            dot,
            conflict: ConflictState::InTimelines(branch.timelines.clone()),
            item: branch.head.item.item.clone(),
        });

        match step_back(&branch.head, &mut fetch, &visited) {
            Some(previous) => branches[index].head = previous,
            None => {
                tracing::trace!(timelines = ?branches[index].timelines, "branch fell off the back");
                branches.swap_remove(index);
                fully_resolved = false;
            }
        }
    }

    if let Some(survivor) = branches.pop() {
        let conflict = if fully_resolved {
            ConflictState::InAllTimelines
        } else {
            ConflictState::InTimelines(survivor.timelines)
        };

        let mut current = Some(survivor.head);
        while let Some(head) = current {
            let dot = head.metadata.to_dot();
            if !visited.insert(dot.clone()) {
                tracing::warn!(dot = %dot, "growing list revisits an item, stopping walk");
                break;
            }
            current = step_back(&head, &mut fetch, &visited);
            newest_first.push(ListEntry {
                dot,
                conflict: conflict.clone(),
                item: head.item.item,
            });
        }
    }

    newest_first.reverse();
    newest_first
}

impl<T: Clone> Register<GrowingListItem<T>> {
    /// See [`show`].
    pub fn show<F>(&self, fetch: F) -> Vec<ListEntry<T>>
    where
        F: FnMut(&Dot) -> Option<(GrowingListItem<T>, OperationMetadata)>,
    {
        show(self, fetch)
    }

    /// Predecessor to use when appending: the single tip, or the newest tip
    /// by causal key when the list has diverged.
    pub fn append_point(&self) -> Option<Dot> {
        self.iter()
            .map(|(_, metadata)| metadata.causal_key())
            .max()
            .map(|(_, dot)| dot)
    }
}

fn find_equal_heads<T>(branches: &[Branch<T>]) -> Option<(usize, usize)> {
    for (i, left) in branches.iter().enumerate() {
        for (offset, right) in branches[i + 1..].iter().enumerate() {
            if left.head.metadata.clock == right.head.metadata.clock {
                return Some((i, i + 1 + offset));
            }
        }
    }
    None
}

fn newest_undominated<T>(branches: &[Branch<T>]) -> usize {
    let undominated = |index: usize| {
        let clock = &branches[index].head.metadata.clock;
        branches.iter().enumerate().all(|(other, branch)| {
            other == index || branch.head.metadata.clock.compare(clock) != ClockOrdering::Greater
        })
    };

    (0..branches.len())
        .filter(|index| undominated(*index))
        .max_by_key(|index| branches[*index].head.metadata.causal_key())
        .unwrap_or(0)
}

fn step_back<T, F>(head: &Head<T>, fetch: &mut F, visited: &HashSet<Dot>) -> Option<Head<T>>
where
    F: FnMut(&Dot) -> Option<(GrowingListItem<T>, OperationMetadata)>,
{
    let predecessor = head.item.predecessor.as_ref()?;
    if visited.contains(predecessor) {
        tracing::warn!(dot = %predecessor, "growing list predecessor already emitted");
        return None;
    }
    match fetch(predecessor) {
        Some((item, metadata)) => Some(Head { item, metadata }),
        None => {
            tracing::warn!(dot = %predecessor, "growing list predecessor missing from history");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causality::VectorClock;
    use crate::identifiers::ClientId;
    use std::collections::HashMap;

    /// In-memory history keyed by dot, standing in for the version store.
    #[derive(Default)]
    struct History {
        items: HashMap<Dot, (GrowingListItem<&'static str>, OperationMetadata)>,
    }

    impl History {
        fn append(
            &mut self,
            client: &str,
            clock: &VectorClock,
            item: &'static str,
            predecessor: Option<&Dot>,
        ) -> (GrowingListItem<&'static str>, OperationMetadata) {
            let client = ClientId::new(client).unwrap();
            let metadata = OperationMetadata::new(clock.next(&client), client);
            let entry = GrowingListItem::new(item, predecessor.cloned());
            self.items
                .insert(metadata.to_dot(), (entry.clone(), metadata.clone()));
            (entry, metadata)
        }

        fn fetch(&self, dot: &Dot) -> Option<(GrowingListItem<&'static str>, OperationMetadata)> {
            self.items.get(dot).cloned()
        }
    }

    fn items(list: &[ListEntry<&'static str>]) -> Vec<&'static str> {
        list.iter().map(|entry| entry.item).collect()
    }

    #[test]
    fn empty_register_shows_nothing() {
        let tips: Register<GrowingListItem<&str>> = Register::new();
        assert!(tips.show(|_| None).is_empty());
    }

    #[test]
    fn linear_history_is_fully_resolved() {
        let mut history = History::default();
        let mut tips = Register::new();

        let (i1, m1) = history.append("a", &VectorClock::new(), "one", None);
        tips.insert(i1, m1.clone());
        let (i2, m2) = history.append("a", &m1.clock, "two", Some(&m1.to_dot()));
        tips.insert(i2, m2.clone());
        let (i3, m3) = history.append("a", &m2.clock, "three", Some(&m2.to_dot()));
        tips.insert(i3, m3);

        assert_eq!(tips.len(), 1);
        let shown = tips.show(|dot| history.fetch(dot));
        assert_eq!(items(&shown), vec!["one", "two", "three"]);
        assert!(shown.iter().all(|entry| entry.conflict.is_resolved()));
    }

    #[test]
    fn diverged_branches_are_tagged_per_timeline() {
        let mut history = History::default();
        let mut tips = Register::new();

        let (root, root_meta) = history.append("a", &VectorClock::new(), "root", None);
        tips.insert(root, root_meta.clone());

        let (a1, a1_meta) = history.append("a", &root_meta.clock, "a1", Some(&root_meta.to_dot()));
        let (a2, a2_meta) = history.append("a", &a1_meta.clock, "a2", Some(&a1_meta.to_dot()));
        let (b1, b1_meta) = history.append("b", &root_meta.clock, "b1", Some(&root_meta.to_dot()));
        let (b2, b2_meta) = history.append("b", &b1_meta.clock, "b2", Some(&b1_meta.to_dot()));
        for (item, meta) in [(a1, a1_meta), (a2, a2_meta), (b1, b1_meta), (b2, b2_meta)] {
            tips.insert(item, meta);
        }
        assert_eq!(tips.len(), 2);

        let shown = tips.show(|dot| history.fetch(dot));
        assert_eq!(shown.len(), 5);
        assert_eq!(shown[0].item, "root");
        assert!(shown[0].conflict.is_resolved());

        // Tips are ordered by dot: a's tip is timeline 0, b's is timeline 1.
        for entry in &shown[1..] {
            let expected = if entry.item.starts_with('a') { 0 } else { 1 };
            assert_eq!(
                entry.conflict,
                ConflictState::InTimelines(BTreeSet::from([expected]))
            );
        }
        let position = |name: &str| items(&shown).iter().position(|i| *i == name).unwrap();
        assert!(position("a1") < position("a2"));
        assert!(position("b1") < position("b2"));
    }

    #[test]
    fn independent_roots_are_not_fully_resolved() {
        let mut history = History::default();
        let mut tips = Register::new();

        let (a, a_meta) = history.append("a", &VectorClock::new(), "a-root", None);
        let (b, b_meta) = history.append("b", &VectorClock::new(), "b-root", None);
        tips.insert(a, a_meta);
        tips.insert(b, b_meta);

        let shown = tips.show(|dot| history.fetch(dot));
        assert_eq!(shown.len(), 2);
        assert!(shown.iter().all(|entry| !entry.conflict.is_resolved()));
    }

    #[test]
    fn missing_history_truncates_instead_of_failing() {
        let mut history = History::default();
        let mut tips = Register::new();

        let (_, m1) = history.append("a", &VectorClock::new(), "lost", None);
        let (i2, m2) = history.append("a", &m1.clock, "kept", Some(&m1.to_dot()));
        tips.insert(i2, m2);

        let shown = tips.show(|_| None);
        assert_eq!(items(&shown), vec!["kept"]);
    }

    #[test]
    fn projection_is_independent_of_insertion_order() {
        let mut history = History::default();
        let (root, root_meta) = history.append("a", &VectorClock::new(), "root", None);
        let (x, x_meta) = history.append("b", &root_meta.clock, "x", Some(&root_meta.to_dot()));
        let (y, y_meta) = history.append("c", &root_meta.clock, "y", Some(&root_meta.to_dot()));

        let mut forward = Register::new();
        forward.insert(root.clone(), root_meta.clone());
        forward.insert(x.clone(), x_meta.clone());
        forward.insert(y.clone(), y_meta.clone());

        let mut backward = Register::new();
        backward.insert(y, y_meta);
        backward.insert(x, x_meta);
        backward.insert(root, root_meta);

        assert_eq!(
            forward.show(|dot| history.fetch(dot)),
            backward.show(|dot| history.fetch(dot))
        );
    }

    #[test]
    fn append_point_prefers_newest_tip() {
        let mut history = History::default();
        let mut tips = Register::new();
        let (a, a_meta) = history.append("a", &VectorClock::new(), "a", None);
        let (b, b_meta) = history.append("b", &a_meta.clock, "b", Some(&a_meta.to_dot()));
        tips.insert(a, a_meta);
        tips.insert(b, b_meta.clone());
        assert_eq!(tips.append_point(), Some(b_meta.to_dot()));
    }
}
