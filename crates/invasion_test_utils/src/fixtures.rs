//! Test fixtures and helpers.
//!
//! Canned configurations, a scripted pathfinding service and a scenario
//! runner that plays the host's role around a bare [`Simulation`].

use std::collections::VecDeque;

use fixed::types::I32F32;
use invasion_core::components::{DamageEvent, EntityId};
use invasion_core::config::{AgentConfig, EngagementConfig, MovementConfig};
use invasion_core::error::Result;
use invasion_core::gate::{GateEvent, GateId};
use invasion_core::math::Vec2Fixed;
use invasion_core::pathfinding::{PathFailure, PathRequest, PathResult, PathService};
use invasion_core::simulation::{Simulation, TickEvents};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Shorthand for an integer position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Stock enemy: moves and attacks with delay 0.5 and recovery 1.0.
#[must_use]
pub fn enemy_config() -> AgentConfig {
    AgentConfig {
        movement: Some(MovementConfig {
            move_speed: fixed(100),
            movement_smoothing: fixed_f(0.1),
            next_waypoint_distance: fixed(1),
        }),
        engagement: Some(EngagementConfig {
            damage: 1,
            attack_delay: fixed_f(0.5),
            attack_recovery: fixed(1),
        }),
        path_update_interval: fixed_f(0.5),
        attack_radius: fixed_f(1.25),
    }
}

/// Training dummy: attacks but never moves.
#[must_use]
pub fn dummy_config() -> AgentConfig {
    enemy_config().stationary()
}

/// Stand-in for the external pathfinding service.
///
/// Answers with a straight line from origin to destination, subdivided
/// every `spacing` units, unless told to fail.
#[derive(Debug, Clone)]
pub struct ScriptedPathService {
    spacing: I32F32,
    queued: VecDeque<PathRequest>,
    failures_left: u32,
    /// Every request ever submitted, in order.
    pub history: Vec<PathRequest>,
}

impl ScriptedPathService {
    /// Service subdividing paths every `spacing` units.
    #[must_use]
    pub fn new(spacing: I32F32) -> Self {
        Self {
            spacing,
            queued: VecDeque::new(),
            failures_left: 0,
            history: Vec::new(),
        }
    }

    /// Fail the next `count` requests.
    pub fn fail_next(&mut self, count: u32) {
        self.failures_left = count;
    }

    /// Answer everything submitted so far.
    pub fn resolve_all(&mut self) -> Vec<PathResult> {
        let mut results = Vec::with_capacity(self.queued.len());
        while let Some(request) = self.queued.pop_front() {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                results.push(PathResult::failed(&request, PathFailure::NoRoute));
            } else {
                results.push(PathResult::found(&request, self.line(&request)));
            }
        }
        results
    }

    fn line(&self, request: &PathRequest) -> Vec<Vec2Fixed> {
        let length = request.origin.distance(request.destination);
        let mut waypoints = Vec::new();
        let mut travelled = self.spacing;
        while travelled < length {
            let direction = (request.destination - request.origin).normalize();
            waypoints.push(request.origin + direction * travelled);
            travelled += self.spacing;
        }
        waypoints.push(request.destination);
        waypoints
    }
}

impl Default for ScriptedPathService {
    fn default() -> Self {
        Self::new(fixed(2))
    }
}

impl PathService for ScriptedPathService {
    fn submit(&mut self, request: PathRequest) {
        self.history.push(request);
        self.queued.push_back(request);
    }
}

/// A simulation plus the collaborators a host would provide.
///
/// Path requests issued on one tick are answered before the next one,
/// mimicking an asynchronous service with one tick of latency.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    /// The simulation under test.
    pub sim: Simulation,
    /// Pathfinding stand-in.
    pub paths: ScriptedPathService,
    /// All damage dealt so far.
    pub damage: Vec<DamageEvent>,
    /// All gate transitions so far.
    pub gate_events: Vec<(GateId, GateEvent)>,
}

impl ScenarioRunner {
    /// Wrap `sim` with default collaborators.
    #[must_use]
    pub fn new(sim: Simulation) -> Self {
        Self {
            sim,
            paths: ScriptedPathService::default(),
            damage: Vec::new(),
            gate_events: Vec::new(),
        }
    }

    /// Answer outstanding path requests, then tick once.
    pub fn step(&mut self) -> TickEvents {
        for result in self.paths.resolve_all() {
            self.sim.deliver_path_result(result);
        }
        let events = self.sim.tick();
        for request in &events.path_requests {
            self.paths.submit(*request);
        }
        self.damage.extend(events.damage_events.iter().copied());
        self.gate_events.extend(events.gate_events.iter().copied());
        events
    }

    /// Step `ticks` times.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Step until `done` holds or `max_ticks` have elapsed.
    ///
    /// Returns whether `done` was reached.
    pub fn run_until<F>(&mut self, max_ticks: u64, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Damage dealt to `target` so far.
    #[must_use]
    pub fn damage_to(&self, target: EntityId) -> Vec<DamageEvent> {
        self.damage
            .iter()
            .filter(|event| event.target == target)
            .copied()
            .collect()
    }
}

/// One enemy chasing one hero across open ground.
///
/// Returns the simulation with proximity triggers enabled, the enemy id and
/// the hero id.
pub fn chase_scenario() -> Result<(Simulation, EntityId, EntityId)> {
    let mut sim = Simulation::new();
    sim.set_proximity_triggers(true);
    let hero = sim.add_actor(pos(12, 0));
    let enemy = sim.spawn_agent(pos(0, 0), &enemy_config())?;
    Ok((sim, enemy, hero))
}
