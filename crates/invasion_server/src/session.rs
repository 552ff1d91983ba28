//! A running match: the simulation plus the collaborators around it.

use std::collections::BTreeMap;

use invasion_core::components::{DamageReceiver, EntityId};
use invasion_core::pathfinding::PathService;
use invasion_core::replication::ObserverId;
use invasion_core::simulation::{Simulation, TickEvents};

use crate::pathing::ChannelPathService;
use crate::ServerError;

/// Damage totals per target, as the receiving side sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DamageLedger {
    totals: BTreeMap<EntityId, u64>,
    hits: usize,
}

impl DamageLedger {
    /// Total damage applied to `target`.
    #[must_use]
    pub fn total_for(&self, target: EntityId) -> u64 {
        self.totals.get(&target).copied().unwrap_or(0)
    }

    /// Number of individual hits applied.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }
}

impl DamageReceiver for DamageLedger {
    fn receive_damage(&mut self, target: EntityId, amount: u32, source: EntityId) {
        *self.totals.entry(target).or_insert(0) += u64::from(amount);
        self.hits += 1;
        tracing::debug!(victim = target, source, amount, "Damage applied");
    }
}

/// Owns one simulation and routes its inputs and outputs.
#[derive(Debug)]
pub struct Session {
    sim: Simulation,
    paths: ChannelPathService,
    damage: DamageLedger,
    max_observers: usize,
}

impl Session {
    /// Wrap a simulation.
    #[must_use]
    pub fn new(sim: Simulation, paths: ChannelPathService, max_observers: usize) -> Self {
        Self {
            sim,
            paths,
            damage: DamageLedger::default(),
            max_observers,
        }
    }

    /// The simulation.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Mutable access for host commands (targets, gates, actor moves).
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Damage applied so far.
    #[must_use]
    pub fn damage(&self) -> &DamageLedger {
        &self.damage
    }

    /// Attach an observer, refusing once the cap is reached.
    pub fn attach_observer(&mut self, observer: ObserverId) -> Result<(), ServerError> {
        if self.sim.replication().observer_count() >= self.max_observers {
            tracing::warn!(observer, "Observer refused, server full");
            return Err(ServerError::TooManyObservers(self.max_observers));
        }
        self.sim.attach_observer(observer)?;
        tracing::info!(observer, "Observer attached");
        Ok(())
    }

    /// Detach an observer.
    pub fn detach_observer(&mut self, observer: ObserverId) -> Result<(), ServerError> {
        self.sim.detach_observer(observer)?;
        tracing::info!(observer, "Observer detached");
        Ok(())
    }

    /// Deliver path answers, tick once, then forward the tick's outputs.
    pub fn step(&mut self) -> Result<TickEvents, ServerError> {
        for result in self.paths.drain_results() {
            self.sim.deliver_path_result(result);
        }

        let events = self.sim.tick();

        for request in &events.path_requests {
            self.paths.submit(*request);
        }
        for event in &events.damage_events {
            self.damage
                .receive_damage(event.target, event.amount, event.source);
        }
        for (gate, event) in &events.gate_events {
            tracing::info!(gate, ?event, "Gate changed");
        }
        Ok(events)
    }

    /// Encode every message queued for `observer` into wire frames.
    pub fn frames(&mut self, observer: ObserverId) -> Result<Vec<Vec<u8>>, ServerError> {
        let messages = self.sim.drain_observer(observer)?;
        let frames = messages
            .iter()
            .map(|message| message.encode())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frames)
    }
}
