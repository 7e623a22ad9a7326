//! Version store
//!
//! The [`Repository`] owns one replica's authoritative history: the
//! published vector clock, every applied [`Operation`] keyed by its [`Dot`],
//! and the application state those operations were applied to.
//!
//! All mutations go through one write lock, so the read-then-write sequence
//! of [`Repository::insert`] (compute what is missing, then apply) is atomic
//! with respect to concurrent inserts from other connections and to local
//! [`Repository::produce`] calls.

use parking_lot::RwLock;
use rally_core::{AbstractState, ClientId, Dot, Operation, OperationMetadata, VectorClock};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

/// Outcome of inserting remote operations.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Everything the remote clock covers is now applied
    Success(VectorClock),
    /// These dots are still missing; nothing was applied
    MissingVersions(Vec<Dot>),
}

impl InsertResult {
    /// True for [`InsertResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, InsertResult::Success(_))
    }

    /// Dots still missing, empty on success.
    pub fn missing(&self) -> &[Dot] {
        match self {
            InsertResult::Success(_) => &[],
            InsertResult::MissingVersions(dots) => dots,
        }
    }
}

struct Versions<Op, S> {
    current: VectorClock,
    operations: HashMap<Dot, Operation<Op>>,
    state: S,
}

/// Consistent read-only view of a repository, valid while the read lock is
/// held.
pub struct Snapshot<'a, Op, S> {
    versions: &'a Versions<Op, S>,
}

impl<'a, Op, S> Snapshot<'a, Op, S> {
    /// The materialized application state.
    pub fn state(&self) -> &'a S {
        &self.versions.state
    }

    /// Clock covering every applied operation.
    pub fn current_version(&self) -> &'a VectorClock {
        &self.versions.current
    }

    /// Look up an applied operation by dot.
    pub fn fetch_version(&self, dot: &Dot) -> Option<&'a Operation<Op>> {
        self.versions.operations.get(dot)
    }
}

/// Version store for one replica.
///
/// Shared between the application and every open connection, usually behind
/// an `Arc`.
pub struct Repository<Op, S> {
    client: ClientId,
    versions: RwLock<Versions<Op, S>>,
    published: watch::Sender<VectorClock>,
}

impl<Op, S> Repository<Op, S>
where
    S: AbstractState<Op>,
{
    /// Create an empty repository for `client` around an initial state.
    pub fn new(client: ClientId, state: S) -> Self {
        let (published, _) = watch::channel(VectorClock::new());
        Self {
            client,
            versions: RwLock::new(Versions {
                current: VectorClock::new(),
                operations: HashMap::new(),
                state,
            }),
            published,
        }
    }

    /// The replica that owns this store.
    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Produce local operations.
    ///
    /// Each op gets the next dot of this replica and is applied immediately.
    /// The new clock is published once, after the whole batch.
    pub fn produce(&self, ops: impl IntoIterator<Item = Op>) -> VectorClock {
        let mut versions = self.versions.write();
        let mut produced = 0usize;

        for op in ops {
            let clock = versions.current.next(&self.client);
            let operation = Operation::new(OperationMetadata::new(clock.clone(), self.client.clone()), op);
            warn_unknown_predecessors::<Op, S>(&versions.operations, &operation);
            apply_operation(&mut versions.state, &operation);
            versions.operations.insert(operation.dot(), operation);
            versions.current = clock;
            produced += 1;
        }

        let current = versions.current.clone();
        if produced > 0 {
            tracing::debug!(client = %self.client, produced, clock = %current, "produced operations");
            self.publish(&current);
        }
        current
    }

    /// Insert operations received from a peer whose clock is `remote_clock`.
    ///
    /// Operations the remote clock covers but this store lacks must all be
    /// among `operations`; otherwise nothing is applied and the remaining
    /// dots are returned so the caller can fetch them and retry. Operations
    /// already known are ignored.
    pub fn insert(&self, remote_clock: &VectorClock, operations: Vec<Operation<Op>>) -> InsertResult {
        let mut versions = self.versions.write();

        let mut missing: HashSet<Dot> = remote_clock
            .versions_not_in(&versions.current)
            .into_iter()
            .collect();

        let mut consumed = Vec::with_capacity(missing.len());
        for operation in operations {
            if missing.remove(&operation.dot()) {
                consumed.push(operation);
            } else {
                tracing::trace!(dot = %operation.dot(), "ignoring operation not missing locally");
            }
        }

        if !missing.is_empty() {
            let mut remaining: Vec<Dot> = missing.into_iter().collect();
            remaining.sort();
            tracing::debug!(
                client = %self.client,
                missing = remaining.len(),
                remote = %remote_clock,
                "insert incomplete, requesting missing versions"
            );
            return InsertResult::MissingVersions(remaining);
        }

        // A linear extension of causality: every operation sees its causal
        // prefix applied first, whatever order the peer sent them in.
        consumed.sort_by_key(|operation| operation.causal_key());

        let applied = consumed.len();
        for operation in consumed {
            warn_unknown_predecessors::<Op, S>(&versions.operations, &operation);
            apply_operation(&mut versions.state, &operation);
            versions.operations.insert(operation.dot(), operation);
        }
        versions.current.merge_in_place(remote_clock);

        let current = versions.current.clone();
        if applied > 0 {
            tracing::debug!(client = %self.client, applied, clock = %current, "inserted remote operations");
        }
        self.publish(&current);
        InsertResult::Success(current)
    }

    /// Clock covering every applied operation.
    pub fn current_version(&self) -> VectorClock {
        self.versions.read().current.clone()
    }

    /// Stream of published clocks. Every clock-changing `produce` or
    /// `insert` emits exactly one update.
    pub fn subscribe(&self) -> watch::Receiver<VectorClock> {
        self.published.subscribe()
    }

    /// Run `f` against one consistent view of state, history and clock.
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot<'_, Op, S>) -> R) -> R {
        let versions = self.versions.read();
        f(&Snapshot {
            versions: &*versions,
        })
    }

    /// Number of stored operations.
    pub fn len(&self) -> usize {
        self.versions.read().operations.len()
    }

    /// True when no operation was ever applied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, clock: &VectorClock) {
        self.published.send_if_modified(|published| {
            if published == clock {
                false
            } else {
                *published = clock.clone();
                true
            }
        });
    }
}

impl<Op, S> Repository<Op, S>
where
    Op: Clone,
    S: AbstractState<Op>,
{
    /// Look up an applied operation by dot.
    pub fn fetch_version(&self, dot: &Dot) -> Option<Operation<Op>> {
        self.versions.read().operations.get(dot).cloned()
    }

    /// Look up several dots, silently skipping unknown ones.
    pub fn fetch_versions<'d>(&self, dots: impl IntoIterator<Item = &'d Dot>) -> Vec<Operation<Op>> {
        let versions = self.versions.read();
        dots.into_iter()
            .filter_map(|dot| versions.operations.get(dot).cloned())
            .collect()
    }
}

impl<Op, S> Repository<Op, S>
where
    S: AbstractState<Op> + Clone,
{
    /// Clone of the current application state.
    pub fn state(&self) -> S {
        self.versions.read().state.clone()
    }
}

fn apply_operation<Op, S: AbstractState<Op>>(state: &mut S, operation: &Operation<Op>) {
    let prunable = state.apply(operation);
    if !prunable.is_empty() {
        // History stays fetchable by peers, so nothing is reclaimed.
        tracing::trace!(dot = %operation.dot(), prunable = prunable.len(), "state reported prunable versions");
    }
}

fn warn_unknown_predecessors<Op, S: AbstractState<Op>>(
    known: &HashMap<Dot, Operation<Op>>,
    operation: &Operation<Op>,
) {
    for predecessor in S::predecessors(&operation.op) {
        if !known.contains_key(&predecessor) {
            tracing::warn!(
                dot = %operation.dot(),
                predecessor = %predecessor,
                "operation depends on a version this store has never seen"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the dots applied, in order.
    #[derive(Debug, Default, Clone)]
    struct Trace {
        applied: Vec<Dot>,
    }

    impl AbstractState<&'static str> for Trace {
        fn apply(&mut self, operation: &Operation<&'static str>) -> Vec<Dot> {
            self.applied.push(operation.dot());
            Vec::new()
        }
    }

    fn id(s: &str) -> ClientId {
        ClientId::new(s).unwrap()
    }

    #[test]
    fn produce_assigns_consecutive_dots() {
        let repo = Repository::new(id("a"), Trace::default());
        let clock = repo.produce(["x", "y"]);

        assert_eq!(clock.get(&id("a")), 2);
        assert_eq!(repo.len(), 2);
        assert_eq!(
            repo.state().applied,
            vec![Dot::new(id("a"), 1), Dot::new(id("a"), 2)]
        );
        assert_eq!(repo.fetch_version(&Dot::new(id("a"), 2)).unwrap().op, "y");
    }

    #[test]
    fn produce_publishes_once_per_batch() {
        let repo = Repository::new(id("a"), Trace::default());
        let mut updates = repo.subscribe();
        repo.produce(["x", "y", "z"]);

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().get(&id("a")), 3);
        assert!(!updates.has_changed().unwrap());
    }

    #[test]
    fn empty_batch_publishes_nothing() {
        let repo = Repository::new(id("a"), Trace::default());
        let updates = repo.subscribe();
        repo.produce(Vec::<&str>::new());
        assert!(!updates.has_changed().unwrap());
        assert!(repo.is_empty());
    }

    #[test]
    fn insert_is_all_or_nothing() {
        let source = Repository::new(id("a"), Trace::default());
        let clock = source.produce(["x", "y"]);
        let first = source.fetch_version(&Dot::new(id("a"), 1)).unwrap();

        let target = Repository::new(id("b"), Trace::default());
        let result = target.insert(&clock, vec![first]);

        assert_eq!(result, InsertResult::MissingVersions(vec![Dot::new(id("a"), 2)]));
        assert!(target.is_empty());
        assert!(target.current_version().is_empty());
    }

    #[test]
    fn insert_applies_in_causal_order() {
        let source = Repository::new(id("a"), Trace::default());
        let clock = source.produce(["x", "y", "z"]);
        let mut operations = source.fetch_versions(&clock.versions_not_in(&VectorClock::new()));
        operations.reverse();

        let target = Repository::new(id("b"), Trace::default());
        assert_eq!(target.insert(&clock, operations), InsertResult::Success(clock.clone()));
        assert_eq!(target.state().applied, source.state().applied);
    }

    #[test]
    fn insert_ignores_known_and_duplicate_operations() {
        let source = Repository::new(id("a"), Trace::default());
        let clock = source.produce(["x"]);
        let op = source.fetch_version(&Dot::new(id("a"), 1)).unwrap();

        let target = Repository::new(id("b"), Trace::default());
        assert!(target.insert(&clock, vec![op.clone(), op.clone()]).is_success());
        assert!(target.insert(&clock, vec![op]).is_success());
        assert_eq!(target.state().applied.len(), 1);
    }

    #[test]
    fn unchanged_clock_is_not_republished() {
        let source = Repository::new(id("a"), Trace::default());
        let clock = source.produce(["x"]);
        let target = Repository::new(id("b"), Trace::default());
        assert!(target
            .insert(&clock, source.fetch_versions(&[Dot::new(id("a"), 1)]))
            .is_success());

        let updates = target.subscribe();
        assert!(target.insert(&clock, Vec::new()).is_success());
        assert!(!updates.has_changed().unwrap());
    }

    #[test]
    fn snapshot_reads_state_and_history_together() {
        let repo = Repository::new(id("a"), Trace::default());
        repo.produce(["x"]);
        let (count, op) = repo.read(|snapshot| {
            (
                snapshot.state().applied.len(),
                snapshot.fetch_version(&Dot::new(id("a"), 1)).map(|op| op.op),
            )
        });
        assert_eq!(count, 1);
        assert_eq!(op, Some("x"));
    }
}
