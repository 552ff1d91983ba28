//! # Invasion Core
//!
//! Server-authoritative interaction core: AI agents that chase and strike a
//! target, and shared gates that open while someone stands in front of
//! them.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No wall clock
//! - No floating-point math (uses fixed-point)
//!
//! Pathfinding, damage bookkeeping and the network transport are external
//! collaborators reached through narrow traits and message types.
//!
//! ## Crate Structure
//!
//! - [`pathfinding`] - Path requests and cached routes
//! - [`movement`] - Smoothed route following
//! - [`engagement`] - Attack state machine
//! - [`replication`] - Server-to-observer messages and client-side effects
//! - [`agent`] - Capability-composed agent
//! - [`gate`] - Occupancy gate
//! - [`triggers`] - Built-in proximity trigger source
//! - [`simulation`] - Core simulation loop
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agent;
pub mod components;
pub mod config;
pub mod engagement;
pub mod error;
pub mod gate;
pub mod math;
pub mod movement;
pub mod pathfinding;
pub mod replication;
pub mod simulation;
pub mod triggers;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::components::*;
    pub use crate::config::{
        AgentConfig, EngagementConfig, GateConfig, MovementConfig, SimulationConfig,
    };
    pub use crate::engagement::{AttackingChange, EngagementState};
    pub use crate::error::{GameError, Result};
    pub use crate::gate::{GateEvent, GateId, GateMode, OccupancyGate};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::pathfinding::{PathFailure, PathRequest, PathResult, PathService, PathTicket};
    pub use crate::replication::{EffectTrigger, ObserverId, ObserverView, ReplicationMessage};
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::triggers::RegionId;
}
