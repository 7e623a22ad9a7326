//! Property test strategies for Rally types
//!
//! Histories are generated by simulating replicas that produce operations
//! and exchange clocks, so every generated dot is unique and every clock is
//! one a real replica could have stamped.

use proptest::prelude::*;
use rally_core::{ClientId, OperationMetadata, Register, VectorClock};

// Re-export proptest for convenience
pub use proptest;

/// Client names used for clocks, kept small so clocks often overlap.
pub const CLIENT_POOL: [&str; 4] = ["a", "b", "c", "d"];

/// Upper bound on the length of generated histories.
pub const MAX_HISTORY: usize = 24;

/// Strategy for arbitrary valid client identifiers.
pub fn arb_client_id() -> impl Strategy<Value = ClientId> {
    "[a-zA-Z0-9][a-zA-Z0-9_.-]{0,7}"
        .prop_map(|id| ClientId::new(id).expect("pattern only yields allowed characters"))
}

/// Strategy for clocks over [`CLIENT_POOL`], including zero entries.
pub fn arb_vector_clock() -> impl Strategy<Value = VectorClock> {
    prop::collection::vec((prop::sample::select(CLIENT_POOL.to_vec()), 0u64..6), 0..5).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(client, sequence)| (ClientId::new(client).expect("pool ids are valid"), sequence))
                .collect()
        },
    )
}

/// One step of a simulated multi-replica run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Replica produces one operation
    Produce(usize),
    /// Replica `to` learns everything replica `from` knows
    Sync {
        /// Source replica
        from: usize,
        /// Destination replica
        to: usize,
    },
}

/// Replay `steps` over `replicas` replicas named from [`CLIENT_POOL`],
/// returning the metadata of every produced operation in production order.
pub fn simulate(replicas: usize, steps: &[Step]) -> Vec<OperationMetadata> {
    let replicas = replicas.clamp(1, CLIENT_POOL.len());
    let ids: Vec<ClientId> = CLIENT_POOL[..replicas]
        .iter()
        .map(|name| ClientId::new(*name).expect("pool ids are valid"))
        .collect();
    let mut clocks = vec![VectorClock::new(); replicas];
    let mut history = Vec::new();

    for step in steps {
        match *step {
            Step::Produce(replica) => {
                let replica = replica % replicas;
                let clock = clocks[replica].next(&ids[replica]);
                history.push(OperationMetadata::new(clock.clone(), ids[replica].clone()));
                clocks[replica] = clock;
            }
            Step::Sync { from, to } => {
                let source = clocks[from % replicas].clone();
                clocks[to % replicas].merge_in_place(&source);
            }
        }
    }
    history
}

/// Strategy for one simulation step over `replicas` replicas.
pub fn arb_step(replicas: usize) -> impl Strategy<Value = Step> {
    let replicas = replicas.max(1);
    prop_oneof![
        2 => (0..replicas).prop_map(Step::Produce),
        1 => (0..replicas, 0..replicas).prop_map(|(from, to)| Step::Sync { from, to }),
    ]
}

/// Strategy for a well-formed history of three replicas.
pub fn arb_history() -> impl Strategy<Value = Vec<OperationMetadata>> {
    prop::collection::vec(arb_step(3), 1..MAX_HISTORY).prop_map(|steps| simulate(3, &steps))
}

/// Strategy for `count` registers holding subsets of one shared history.
///
/// Each write's value is its position in the history, so a dot always
/// carries the same value in every register.
pub fn arb_registers(count: usize) -> impl Strategy<Value = Vec<Register<u32>>> {
    (
        arb_history(),
        prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_HISTORY), count),
    )
        .prop_map(|(history, masks)| {
            masks
                .iter()
                .map(|mask| {
                    let mut register = Register::new();
                    for (index, metadata) in history.iter().enumerate() {
                        if mask[index] {
                            register.insert(index as u32, metadata.clone());
                        }
                    }
                    register
                })
                .collect()
        })
}
