//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Two servers fed the same trigger events and path results must agree on
//! every `attacking` flag and every strike. Sources of non-determinism
//! include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`invasion_core::math::Fixed`] throughout.
//!
//! - **Accumulated time**: Summing tick durations drifts. Simulation time
//!   is derived from the tick count instead.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Agents, actors and gates live in `BTreeMap`s keyed by id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use invasion_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use invasion_test_utils::determinism::verify_determinism;
/// use invasion_test_utils::fixtures::{chase_scenario, ScenarioRunner};
///
/// let result = verify_determinism(
///     3,
///     100,
///     || ScenarioRunner::new(chase_scenario().unwrap().0),
///     |runner| {
///         runner.step();
///     },
///     |runner| runner.sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for `Simulation` type.
///
/// Runs the simulation twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        |sim| sim.state_hash(),
    );
    result.is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// variations or memory layout differences.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> Vec<u64>
where
    F: Fn() -> Simulation + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves simulation state exactly,
/// and that the restored copy keeps evolving identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();

    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };

    if sim.state_hash() != restored.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        sim.tick();
        restored.tick();
    }

    sim.state_hash() == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the simulation.
pub mod strategies {
    use invasion_core::components::EntityId;
    use invasion_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    /// Generate a fixed-point coordinate.
    ///
    /// Range: -50 to 50 (one arena)
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-50i32..50i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D vector for positions.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a short path.
    pub fn arb_waypoints(max_len: usize) -> impl Strategy<Value = Vec<Vec2Fixed>> {
        proptest::collection::vec(arb_vec2_position(), 1..max_len)
    }

    /// One input a host can feed an agent between ticks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum AgentInput {
        /// The actor entered the attack range.
        Enter(EntityId),
        /// The actor left the attack range.
        Exit(EntityId),
        /// Toggle control.
        Controllable(bool),
        /// Let a tick pass.
        Tick,
    }

    /// Generate a single agent input over a small identity pool.
    pub fn arb_agent_input() -> impl Strategy<Value = AgentInput> {
        prop_oneof![
            (0u64..3).prop_map(AgentInput::Enter),
            (0u64..3).prop_map(AgentInput::Exit),
            any::<bool>().prop_map(AgentInput::Controllable),
            Just(AgentInput::Tick),
            Just(AgentInput::Tick),
        ]
    }

    /// Generate a sequence of agent inputs.
    pub fn arb_agent_inputs(max_len: usize) -> impl Strategy<Value = Vec<AgentInput>> {
        proptest::collection::vec(arb_agent_input(), 0..max_len)
    }

    /// Generate a gate occupancy event: `(enter, identity)`.
    pub fn arb_occupancy_event() -> impl Strategy<Value = (bool, EntityId)> {
        (any::<bool>(), 0u64..8)
    }
}
