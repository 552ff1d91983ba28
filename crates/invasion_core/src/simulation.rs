//! Core simulation loop.
//!
//! The simulation owns every agent, actor and gate of one server shard and
//! advances them on a fixed tick. It performs no IO: path requests and
//! damage leave through [`TickEvents`], path results and trigger events
//! come back in through inboxes drained at the start of the next tick.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`](crate::math::Fixed))
//! - Simulation time is derived from the tick count, never accumulated
//! - Consistent iteration order (`BTreeMap` keyed by id)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use invasion_core::config::AgentConfig;
//! use invasion_core::math::Vec2Fixed;
//! use invasion_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new();
//! let hero = sim.add_actor(Vec2Fixed::from_ints(20, 0));
//! let enemy = sim.spawn_agent(Vec2Fixed::ZERO, &AgentConfig::default()).unwrap();
//!
//! let events = sim.tick();
//!
//! // The enemy picked the hero and asked for a path to it
//! assert_eq!(sim.agent(enemy).unwrap().target(), Some(hero));
//! assert_eq!(events.path_requests.len(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, TickContext};
use crate::components::{DamageEvent, EntityId, Seconds};
use crate::config::{AgentConfig, GateConfig, SimulationConfig};
use crate::engagement::AttackingChange;
use crate::error::{GameError, Result};
use crate::gate::{GateEvent, GateId, OccupancyGate};
use crate::math::Vec2Fixed;
use crate::pathfinding::{PathRequest, PathResult};
use crate::replication::{ObserverId, ReplicationChannel, ReplicationMessage};
use crate::triggers::{CircleRegion, ProximityTracker, RegionId, TriggerEvent};

/// A gate and the trigger region in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateSite {
    /// Gate state.
    pub gate: OccupancyGate,
    /// Threshold region.
    pub region: CircleRegion,
}

/// Outbound effects of one tick, for the host to forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Requests for the pathfinding service.
    pub path_requests: Vec<PathRequest>,
    /// Strikes for the damage-receiving collaborator.
    pub damage_events: Vec<DamageEvent>,
    /// Gate transitions caused by occupancy.
    pub gate_events: Vec<(GateId, GateEvent)>,
}

/// The authoritative interaction simulation.
///
/// # Tick Order
///
/// 1. **Proximity** - derive trigger events from positions, if enabled
/// 2. **Path results** - install delivered routes
/// 3. **Triggers** - apply enter/exit events in arrival order
/// 4. **Agents** - engagement, path refresh, movement (ascending id)
/// 5. **Integration** - `position += velocity * dt`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    config: SimulationConfig,
    /// Current simulation tick.
    tick: u64,
    next_id: EntityId,
    agents: BTreeMap<EntityId, Agent>,
    actors: BTreeMap<EntityId, Vec2Fixed>,
    gates: BTreeMap<GateId, GateSite>,
    pending_triggers: VecDeque<TriggerEvent>,
    pending_paths: VecDeque<PathResult>,
    proximity: ProximityTracker,
    replication: ReplicationChannel,
}

impl Simulation {
    /// Create an empty simulation with the stock configuration.
    ///
    /// ```
    /// use invasion_core::simulation::Simulation;
    ///
    /// let sim = Simulation::new();
    /// assert_eq!(sim.get_tick(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::build(SimulationConfig::default())
    }

    /// Create an empty simulation after validating `config`.
    pub fn with_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimulationConfig) -> Self {
        Self {
            config,
            tick: 0,
            next_id: 1,
            agents: BTreeMap::new(),
            actors: BTreeMap::new(),
            gates: BTreeMap::new(),
            pending_triggers: VecDeque::new(),
            pending_paths: VecDeque::new(),
            proximity: ProximityTracker::new(),
            replication: ReplicationChannel::new(),
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation time at the start of the next tick.
    #[must_use]
    pub fn now(&self) -> Seconds {
        self.config.time_at(self.tick)
    }

    /// Enable or disable the built-in proximity trigger source.
    pub fn set_proximity_triggers(&mut self, enabled: bool) {
        self.config.proximity_triggers = enabled;
    }

    // --- entities ---

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn is_known(&self, id: EntityId) -> bool {
        self.agents.contains_key(&id) || self.actors.contains_key(&id) || self.gates.contains_key(&id)
    }

    /// Spawn an agent built from `config`.
    pub fn spawn_agent(&mut self, position: Vec2Fixed, config: &AgentConfig) -> Result<EntityId> {
        config.validate()?;
        let id = self.allocate_id();
        self.agents.insert(id, Agent::new(id, position, config));
        tracing::debug!(
            agent = id,
            stationary = config.movement.is_none(),
            "Spawned agent"
        );
        Ok(id)
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// All agents in ascending id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Register a targetable actor under a fresh id.
    pub fn add_actor(&mut self, position: Vec2Fixed) -> EntityId {
        let id = self.allocate_id();
        self.actors.insert(id, position);
        id
    }

    /// Register a targetable actor under an id chosen by the host.
    pub fn insert_actor(&mut self, id: EntityId, position: Vec2Fixed) -> Result<()> {
        if self.is_known(id) {
            return Err(GameError::DuplicateEntity(id));
        }
        self.actors.insert(id, position);
        self.next_id = self.next_id.max(id.saturating_add(1));
        Ok(())
    }

    /// Forget an actor. Agent references to it become absent.
    pub fn remove_actor(&mut self, id: EntityId) -> Result<Vec2Fixed> {
        self.actors
            .remove(&id)
            .ok_or(GameError::EntityNotFound(id))
    }

    /// Move an actor.
    pub fn set_actor_position(&mut self, id: EntityId, position: Vec2Fixed) -> Result<()> {
        let slot = self
            .actors
            .get_mut(&id)
            .ok_or(GameError::EntityNotFound(id))?;
        *slot = position;
        Ok(())
    }

    /// Current position of an actor.
    #[must_use]
    pub fn actor_position(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.actors.get(&id).copied()
    }

    /// Place a gate.
    pub fn add_gate(&mut self, config: &GateConfig) -> GateId {
        let id = self.allocate_id();
        self.gates.insert(
            id,
            GateSite {
                gate: OccupancyGate::new(config.mode),
                region: CircleRegion::new(config.center(), config.radius),
            },
        );
        tracing::debug!(gate = id, mode = ?config.mode, "Placed gate");
        id
    }

    /// Look up a gate.
    #[must_use]
    pub fn gate(&self, id: GateId) -> Option<&OccupancyGate> {
        self.gates.get(&id).map(|site| &site.gate)
    }

    // --- commands ---

    fn gate_mut(&mut self, id: GateId) -> Result<&mut OccupancyGate> {
        self.gates
            .get_mut(&id)
            .map(|site| &mut site.gate)
            .ok_or(GameError::EntityNotFound(id))
    }

    /// Point an agent at `target`, or clear its target.
    pub fn set_target(&mut self, agent: EntityId, target: Option<EntityId>) -> Result<()> {
        let replication = &mut self.replication;
        self.agents
            .get_mut(&agent)
            .ok_or(GameError::EntityNotFound(agent))?
            .set_target(target, replication);
        Ok(())
    }

    /// Enable or disable an agent.
    pub fn set_controllable(&mut self, agent: EntityId, controllable: bool) -> Result<()> {
        let replication = &mut self.replication;
        self.agents
            .get_mut(&agent)
            .ok_or(GameError::EntityNotFound(agent))?
            .set_controllable(controllable, replication);
        Ok(())
    }

    /// External unlock. `Ok(None)` when the gate was not locked.
    pub fn unlock_gate(&mut self, gate: GateId) -> Result<Option<GateEvent>> {
        let event = self.gate_mut(gate)?.unlock();
        if event.is_some() {
            tracing::info!(gate, "Gate unlocked");
        }
        Ok(event)
    }

    /// External repair. `Ok(None)` when the gate was not broken.
    pub fn fix_gate(&mut self, gate: GateId) -> Result<Option<GateEvent>> {
        let event = self.gate_mut(gate)?.fix();
        if event.is_some() {
            tracing::info!(gate, "Gate fixed");
        }
        Ok(event)
    }

    // --- inputs ---

    /// Queue an enter event from an external trigger source.
    pub fn region_entered(&mut self, region: RegionId, identity: EntityId) {
        self.pending_triggers
            .push_back(TriggerEvent::Enter { region, identity });
    }

    /// Queue an exit event from an external trigger source.
    pub fn region_exited(&mut self, region: RegionId, identity: EntityId) {
        self.pending_triggers
            .push_back(TriggerEvent::Exit { region, identity });
    }

    /// Queue a result from the pathfinding service for the next tick.
    pub fn deliver_path_result(&mut self, result: PathResult) {
        self.pending_paths.push_back(result);
    }

    // --- observers ---

    /// Attach an observer and send it the current attacking baseline.
    pub fn attach_observer(&mut self, observer: ObserverId) -> Result<()> {
        self.replication.attach(observer)?;
        let baseline = AttackingChange {
            previous: false,
            current: true,
        };
        for agent in self.agents.values().filter(|agent| agent.attacking()) {
            self.replication.send_to(
                observer,
                ReplicationMessage::attacking_changed(agent.id(), baseline),
            )?;
        }
        Ok(())
    }

    /// Detach an observer.
    pub fn detach_observer(&mut self, observer: ObserverId) -> Result<()> {
        self.replication.detach(observer)
    }

    /// Take every message queued for `observer`.
    pub fn drain_observer(&mut self, observer: ObserverId) -> Result<Vec<ReplicationMessage>> {
        self.replication.drain(observer)
    }

    /// Outbound replication queues.
    #[must_use]
    pub const fn replication(&self) -> &ReplicationChannel {
        &self.replication
    }

    // --- tick ---

    /// Advance the simulation by one tick.
    ///
    /// ```
    /// use invasion_core::simulation::Simulation;
    ///
    /// let mut sim = Simulation::new();
    /// sim.tick();
    /// assert_eq!(sim.get_tick(), 1);
    /// ```
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        let now = self.now();
        let dt = self.config.tick_duration();

        // 1. Built-in trigger source
        if self.config.proximity_triggers {
            let regions = self.trigger_regions();
            let changes = self.proximity.update(&regions, &self.actors);
            self.pending_triggers.extend(changes);
        }

        // 2. Path results
        while let Some(result) = self.pending_paths.pop_front() {
            let requester = result.requester;
            if let Some(agent) = self.agents.get_mut(&requester) {
                agent.complete_path(result);
            } else {
                tracing::warn!(agent = requester, "Dropping path result for unknown agent");
            }
        }

        // 3. Trigger events, in arrival order
        while let Some(event) = self.pending_triggers.pop_front() {
            self.apply_trigger(event, now, &mut events.gate_events);
        }

        // 4. Agents
        let mut ctx = TickContext {
            now,
            dt,
            world: &self.actors,
            replication: &mut self.replication,
            path_service: &mut events.path_requests,
            damage: &mut events.damage_events,
        };
        for agent in self.agents.values_mut() {
            agent.tick(&mut ctx);
        }

        // 5. Integration
        for agent in self.agents.values_mut() {
            agent.integrate(dt);
        }

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    fn trigger_regions(&self) -> Vec<(RegionId, CircleRegion)> {
        let ranges = self
            .agents
            .values()
            .filter(|agent| agent.engagement().is_some())
            .map(|agent| {
                (
                    RegionId::AttackRange(agent.id()),
                    CircleRegion::new(agent.position().value, agent.attack_radius()),
                )
            });
        let thresholds = self
            .gates
            .iter()
            .map(|(id, site)| (RegionId::Gate(*id), site.region));
        ranges.chain(thresholds).collect()
    }

    fn apply_trigger(
        &mut self,
        event: TriggerEvent,
        now: Seconds,
        gate_events: &mut Vec<(GateId, GateEvent)>,
    ) {
        match event {
            TriggerEvent::Enter {
                region: RegionId::AttackRange(id),
                identity,
            } => match self.agents.get_mut(&id) {
                Some(agent) => agent.on_attack_range_enter(identity, now, &mut self.replication),
                None => tracing::warn!(agent = id, "Enter event for unknown agent"),
            },
            TriggerEvent::Exit {
                region: RegionId::AttackRange(id),
                identity,
            } => match self.agents.get_mut(&id) {
                Some(agent) => agent.on_attack_range_exit(identity, &mut self.replication),
                None => tracing::warn!(agent = id, "Exit event for unknown agent"),
            },
            TriggerEvent::Enter {
                region: RegionId::Gate(id),
                identity,
            } => match self.gates.get_mut(&id) {
                Some(site) => {
                    if let Some(change) = site.gate.on_enter(identity) {
                        tracing::debug!(gate = id, identity, ?change, "Gate transition");
                        gate_events.push((id, change));
                    }
                }
                None => tracing::warn!(gate = id, "Enter event for unknown gate"),
            },
            TriggerEvent::Exit {
                region: RegionId::Gate(id),
                identity,
            } => match self.gates.get_mut(&id) {
                Some(site) => {
                    if let Some(change) = site.gate.on_exit(identity) {
                        tracing::debug!(gate = id, identity, ?change, "Gate transition");
                        gate_events.push((id, change));
                    }
                }
                None => tracing::warn!(gate = id, "Exit event for unknown gate"),
            },
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations with identical state produce identical hashes.
    /// Inboxes and replication queues are transient and not included.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.config.hash(&mut hasher);
        self.agents.hash(&mut hasher);
        self.actors.hash(&mut hasher);
        self.gates.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the simulation state for snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Codec(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::Codec(format!("Failed to deserialize simulation: {e}")))
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
