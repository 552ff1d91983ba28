//! # Invasion Dedicated Server
//!
//! Headless authoritative host for the interaction core.
//!
//! Drives the simulation at a fixed rate, answers path requests on a
//! background worker task and fans replication messages out to attached
//! observers as encoded frames.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod pathing;
pub mod session;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use invasion_core::components::EntityId;
use invasion_core::config::{AgentConfig, GateConfig, SimulationConfig};
use invasion_core::error::GameError;
use invasion_core::math::Vec2Fixed;
use invasion_core::simulation::Simulation;

use crate::pathing::{spawn_path_worker, NavigatorConfig};
use crate::session::Session;

/// Errors raised by the server host.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The simulation rejected a call.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Reading a file failed.
    #[error("Failed to read {0}: {1}")]
    Io(String, String),

    /// Configuration text failed to parse.
    #[error("Failed to parse {0}: {1}")]
    Parse(String, String),

    /// The observer cap has been reached.
    #[error("Observer limit reached ({0})")]
    TooManyObservers(usize),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation settings. `tick_rate` also paces the host loop.
    pub simulation: SimulationConfig,
    /// Settings for every spawned enemy.
    pub agent: AgentConfig,
    /// The gate placed in the arena.
    pub gate: GateConfig,
    /// Pathfinding worker settings.
    pub navigator: NavigatorConfig,
    /// Capacity of the request and result queues to the path worker.
    pub path_queue_capacity: usize,
    /// Maximum number of attached observers.
    pub max_observers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig {
                proximity_triggers: true,
                ..SimulationConfig::default()
            },
            agent: AgentConfig::default(),
            gate: GateConfig::default(),
            navigator: NavigatorConfig::default(),
            path_queue_capacity: 256,
            max_observers: 8,
        }
    }
}

impl ServerConfig {
    /// Parse a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ServerError> {
        let config: Self = ron::from_str(text)
            .map_err(|e| ServerError::Parse("server config".to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ServerError::Io(path.display().to_string(), e.to_string()))?;
        Self::from_ron_str(&content).map_err(|e| match e {
            ServerError::Parse(_, reason) => ServerError::Parse(path.display().to_string(), reason),
            other => other,
        })
    }

    /// Reject settings the host cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        self.simulation.validate()?;
        self.agent.validate()?;
        self.gate.validate()?;
        self.navigator.validate()?;
        if self.path_queue_capacity == 0 {
            return Err(GameError::InvalidConfig(
                "path_queue_capacity must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Wall-clock period of one tick.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.simulation.tick_rate.max(1)))
    }
}

/// Totals reported when the host loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks simulated.
    pub ticks: u64,
    /// Path requests forwarded to the worker.
    pub path_requests: usize,
    /// Strikes applied to the hero.
    pub strikes: usize,
    /// Damage the hero took.
    pub hero_damage: u64,
    /// Frames delivered to the built-in observer.
    pub frames: usize,
    /// Final state hash.
    pub state_hash: u64,
}

/// Build the demo arena: a hero at the origin, `agents` enemies on a line
/// north of it, and one gate between them.
pub fn demo_arena(
    config: &ServerConfig,
    agents: u32,
) -> Result<(Simulation, EntityId), ServerError> {
    config.validate()?;
    let mut sim = Simulation::with_config(config.simulation)?;
    let hero = sim.add_actor(Vec2Fixed::ZERO);
    for i in 0..agents {
        let offset = i32::try_from(i).unwrap_or(i32::MAX).saturating_mul(4);
        let enemy = sim.spawn_agent(Vec2Fixed::from_ints(offset - 6, 20), &config.agent)?;
        sim.set_target(enemy, Some(hero))?;
    }
    sim.add_gate(&config.gate);
    Ok((sim, hero))
}

/// Run the demo arena for `ticks` ticks paced by the wall clock.
///
/// One observer is attached for the whole run so replication traffic is
/// exercised end to end.
pub async fn run(config: ServerConfig, agents: u32, ticks: u64) -> Result<RunSummary, ServerError> {
    let (sim, hero) = demo_arena(&config, agents)?;
    let (paths, worker) = spawn_path_worker(config.navigator, config.path_queue_capacity);
    let mut session = Session::new(sim, paths, config.max_observers);

    let observer = 0;
    session.attach_observer(observer)?;

    let mut interval = tokio::time::interval(config.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        agents,
        ticks,
        tick_rate = config.simulation.tick_rate,
        "Starting simulation loop"
    );

    let mut summary = RunSummary::default();
    for _ in 0..ticks {
        interval.tick().await;
        // Let the worker answer requests queued last tick.
        tokio::task::yield_now().await;

        let events = session.step()?;
        summary.path_requests += events.path_requests.len();
        summary.strikes += events.damage_events.len();

        let frames = session.frames(observer)?;
        summary.frames += frames.len();
    }

    summary.ticks = session.simulation().get_tick();
    summary.hero_damage = session.damage().total_for(hero);
    summary.state_hash = session.simulation().state_hash();

    drop(session);
    worker.join().await;

    tracing::info!(
        ticks = summary.ticks,
        strikes = summary.strikes,
        hero_damage = summary.hero_damage,
        "Simulation loop finished"
    );
    Ok(summary)
}
