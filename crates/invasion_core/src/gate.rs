//! Shared access gate arbitrated by region occupancy.
//!
//! The gate tracks *who* is inside its trigger region, not how many
//! enter/exit events it has seen. Duplicate enters and exits for unknown
//! identities are therefore harmless.
//!
//! In `Normal` mode the gate is open exactly while someone is inside.
//! `Locked` and `Broken` gates stay closed until an external call to
//! [`OccupancyGate::unlock`] or [`OccupancyGate::fix`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;

/// Identifier of a gate inside a simulation.
pub type GateId = u64;

/// Static gate mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GateMode {
    /// Opens for occupants.
    #[default]
    Normal,
    /// Needs [`OccupancyGate::unlock`] first.
    Locked,
    /// Needs [`OccupancyGate::fix`] first.
    Broken,
}

/// Presentation trigger produced by an actual gate transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateEvent {
    /// Play the open transition.
    Opened,
    /// Play the close transition.
    Closed,
    /// Lock removed: hide the locked indicator, drop the obstacle.
    Unlocked,
    /// Repaired: drop the obstacle.
    Fixed,
}

/// Occupancy-driven gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccupancyGate {
    mode: GateMode,
    is_open: bool,
    occupants: BTreeSet<EntityId>,
    obstacle_active: bool,
    locked_indicator: bool,
}

impl OccupancyGate {
    /// Closed gate in `mode`, as placed at level setup.
    #[must_use]
    pub fn new(mode: GateMode) -> Self {
        Self {
            mode,
            is_open: false,
            occupants: BTreeSet::new(),
            obstacle_active: mode != GateMode::Normal,
            locked_indicator: mode == GateMode::Locked,
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> GateMode {
        self.mode
    }

    /// Whether the gate is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.is_open
    }

    /// Identities currently inside the region.
    #[must_use]
    pub const fn occupants(&self) -> &BTreeSet<EntityId> {
        &self.occupants
    }

    /// Whether the blocking obstacle is enabled.
    #[must_use]
    pub const fn obstacle_active(&self) -> bool {
        self.obstacle_active
    }

    /// Whether the "locked" indicator is shown.
    #[must_use]
    pub const fn locked_indicator(&self) -> bool {
        self.locked_indicator
    }

    /// An identity entered the region.
    ///
    /// Only a newly tracked identity can open the gate.
    pub fn on_enter(&mut self, identity: EntityId) -> Option<GateEvent> {
        if !self.occupants.insert(identity) {
            return None;
        }
        self.open()
    }

    /// An identity left the region.
    pub fn on_exit(&mut self, identity: EntityId) -> Option<GateEvent> {
        self.occupants.remove(&identity);
        if self.occupants.is_empty() {
            self.close()
        } else {
            None
        }
    }

    /// Open if `Normal` and currently closed.
    pub fn open(&mut self) -> Option<GateEvent> {
        if self.mode != GateMode::Normal || self.is_open {
            return None;
        }
        self.is_open = true;
        Some(GateEvent::Opened)
    }

    /// Close if `Normal` and currently open.
    pub fn close(&mut self) -> Option<GateEvent> {
        if self.mode != GateMode::Normal || !self.is_open {
            return None;
        }
        self.is_open = false;
        Some(GateEvent::Closed)
    }

    /// Locked → Normal. The gate stays closed until the next new occupant.
    pub fn unlock(&mut self) -> Option<GateEvent> {
        if self.mode != GateMode::Locked {
            return None;
        }
        self.mode = GateMode::Normal;
        self.locked_indicator = false;
        self.obstacle_active = false;
        Some(GateEvent::Unlocked)
    }

    /// Broken → Normal. Does not open the gate.
    pub fn fix(&mut self) -> Option<GateEvent> {
        if self.mode != GateMode::Broken {
            return None;
        }
        self.mode = GateMode::Normal;
        self.obstacle_active = false;
        Some(GateEvent::Fixed)
    }
}

impl Default for OccupancyGate {
    fn default() -> Self {
        Self::new(GateMode::Normal)
    }
}
