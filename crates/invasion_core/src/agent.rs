//! Capability-composed simulated agent.
//!
//! An [`Agent`] is a generic simulated entity holding optional behavior
//! modules:
//!
//! - [`Navigation`]: path requests plus the movement controller. Absent on
//!   stationary agents (training dummies, turrets).
//! - [`EngagementStateMachine`]: attack behavior. Absent on agents that
//!   only move.
//!
//! The stock enemy is simply an agent with both modules populated.
//!
//! # Per-tick order
//!
//! 1. Engagement: drop an absent target, engage a target already in range,
//!    evaluate the strike.
//! 2. Path refresh: acquire a target if none, request a path when the
//!    refresh instant has been reached.
//! 3. Movement: step along the route unless recovering.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{DamageReceiver, EntityId, Position, Seconds, Velocity};
use crate::config::AgentConfig;
use crate::engagement::{AttackingChange, EngagementStateMachine, Evaluation};
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{integrate, MovementController, MovementStep, SuspendReason};
use crate::pathfinding::{PathCompletion, PathRequestClient, PathResult, PathService, Route};
use crate::replication::ReplicationChannel;

/// Weak lookup of potential targets by identity.
pub trait TargetLookup {
    /// Position of `id`, or `None` when it no longer exists.
    fn position_of(&self, id: EntityId) -> Option<Vec2Fixed>;

    /// Closest candidate to `point`. Ties go to the lowest id.
    fn nearest_to(&self, point: Vec2Fixed) -> Option<EntityId>;
}

impl TargetLookup for BTreeMap<EntityId, Vec2Fixed> {
    fn position_of(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.get(&id).copied()
    }

    fn nearest_to(&self, point: Vec2Fixed) -> Option<EntityId> {
        let mut best: Option<(EntityId, Fixed)> = None;
        // Ascending ids, strict comparison: the first of equals wins
        for (&id, &position) in self {
            let distance = point.distance_squared(position);
            if best.map_or(true, |(_, closest)| distance < closest) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Everything an agent may touch during its tick.
pub struct TickContext<'a> {
    /// Current simulation time.
    pub now: Seconds,
    /// Tick duration.
    pub dt: Seconds,
    /// Target lookup.
    pub world: &'a dyn TargetLookup,
    /// Outbound replication.
    pub replication: &'a mut ReplicationChannel,
    /// Pathfinding service.
    pub path_service: &'a mut dyn PathService,
    /// Damage-receiving collaborator.
    pub damage: &'a mut dyn DamageReceiver,
}

/// Movement capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Navigation {
    /// Path requests and the cached route.
    pub paths: PathRequestClient,
    /// Route follower.
    pub movement: MovementController,
}

/// A server-simulated actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    id: EntityId,
    position: Position,
    velocity: Velocity,
    target: Option<EntityId>,
    controllable: bool,
    #[serde(with = "crate::math::fixed_serde")]
    next_path_update_at: Seconds,
    #[serde(with = "crate::math::fixed_serde")]
    path_update_interval: Seconds,
    #[serde(with = "crate::math::fixed_serde")]
    attack_radius: Fixed,
    /// Identities inside the attack range, tracked even while disabled.
    range_occupants: BTreeSet<EntityId>,
    navigation: Option<Navigation>,
    engagement: Option<EngagementStateMachine>,
}

impl Agent {
    /// Build an agent at `position` with the modules `config` enables.
    #[must_use]
    pub fn new(id: EntityId, position: Vec2Fixed, config: &AgentConfig) -> Self {
        Self {
            id,
            position: Position::new(position),
            velocity: Velocity::ZERO,
            target: None,
            controllable: true,
            next_path_update_at: Fixed::ZERO,
            path_update_interval: config.path_update_interval,
            attack_radius: config.attack_radius,
            range_occupants: BTreeSet::new(),
            navigation: config.movement.map(|movement| Navigation {
                paths: PathRequestClient::new(),
                movement: MovementController::new(movement),
            }),
            engagement: config.engagement.map(EngagementStateMachine::new),
        }
    }

    /// Identity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Current velocity.
    #[must_use]
    pub const fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Current target, which may no longer exist.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Whether the agent is driven by the tick.
    #[must_use]
    pub const fn controllable(&self) -> bool {
        self.controllable
    }

    /// The authoritative `attacking` flag.
    #[must_use]
    pub fn attacking(&self) -> bool {
        self.engagement
            .as_ref()
            .is_some_and(EngagementStateMachine::attacking)
    }

    /// Next instant a path may be requested.
    #[must_use]
    pub const fn next_path_update_at(&self) -> Seconds {
        self.next_path_update_at
    }

    /// Attack range radius.
    #[must_use]
    pub const fn attack_radius(&self) -> Fixed {
        self.attack_radius
    }

    /// Identities currently inside the attack range.
    #[must_use]
    pub const fn range_occupants(&self) -> &BTreeSet<EntityId> {
        &self.range_occupants
    }

    /// True when the agent has no movement module.
    #[must_use]
    pub const fn is_stationary(&self) -> bool {
        self.navigation.is_none()
    }

    /// Movement capability, if any.
    #[must_use]
    pub const fn navigation(&self) -> Option<&Navigation> {
        self.navigation.as_ref()
    }

    /// Engagement capability, if any.
    #[must_use]
    pub const fn engagement(&self) -> Option<&EngagementStateMachine> {
        self.engagement.as_ref()
    }

    /// Cached route, if one was ever installed.
    #[must_use]
    pub fn route(&self) -> Option<&Route> {
        self.navigation.as_ref().and_then(|nav| nav.paths.route())
    }

    /// Point the agent at `target`.
    ///
    /// Switching targets while attacking disengages; the tick re-engages if
    /// the new target is already inside the attack range.
    pub fn set_target(&mut self, target: Option<EntityId>, replication: &mut ReplicationChannel) {
        if self.target == target {
            return;
        }
        self.target = target;
        if let Some(esm) = self.engagement.as_mut() {
            if let Some(change) = esm.disengage() {
                publish(replication, self.id, change);
            }
        }
    }

    /// Enable or disable tick processing.
    ///
    /// Disabling clears `attacking`, zeroes every timer and halts movement
    /// in one step. Enabling only flips the flag, so the agent resumes
    /// from the same state as a fresh one.
    pub fn set_controllable(&mut self, controllable: bool, replication: &mut ReplicationChannel) {
        if self.controllable == controllable {
            return;
        }
        self.controllable = controllable;
        if controllable {
            tracing::debug!(agent = self.id, "Agent enabled");
            return;
        }

        if let Some(esm) = self.engagement.as_mut() {
            if let Some(change) = esm.reset() {
                publish(replication, self.id, change);
            }
        }
        self.next_path_update_at = Fixed::ZERO;
        match self.navigation.as_mut() {
            Some(nav) => {
                nav.movement
                    .suspend(&mut self.velocity, SuspendReason::Disabled);
            }
            None => self.velocity = Velocity::ZERO,
        }
        tracing::debug!(agent = self.id, "Agent disabled");
    }

    /// `identity` entered the attack range.
    pub fn on_attack_range_enter(
        &mut self,
        identity: EntityId,
        now: Seconds,
        replication: &mut ReplicationChannel,
    ) {
        self.range_occupants.insert(identity);
        if !self.controllable {
            return;
        }
        if let Some(esm) = self.engagement.as_mut() {
            if let Some(change) = esm.on_region_enter(identity, self.target, now) {
                tracing::debug!(agent = self.id, target = identity, "Target entered range");
                publish(replication, self.id, change);
            }
        }
    }

    /// `identity` left the attack range.
    pub fn on_attack_range_exit(&mut self, identity: EntityId, replication: &mut ReplicationChannel) {
        self.range_occupants.remove(&identity);
        if let Some(esm) = self.engagement.as_mut() {
            if let Some(change) = esm.on_region_exit(identity, self.target) {
                tracing::debug!(agent = self.id, target = identity, "Target left range");
                publish(replication, self.id, change);
            }
        }
    }

    /// Apply a pathfinding result. `None` when the agent cannot move.
    ///
    /// Results are accepted while disabled so a request issued before the
    /// disable is not lost.
    pub fn complete_path(&mut self, result: PathResult) -> Option<PathCompletion> {
        self.navigation
            .as_mut()
            .map(|nav| nav.paths.complete(result))
    }

    /// Run one tick of decisions. Does not integrate the position.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        if !self.controllable {
            return;
        }
        self.evaluate_engagement(ctx);
        self.refresh_path(ctx);
        if let Some(MovementStep::Advanced {
            waypoint_reached: true,
        }) = self.step_movement(ctx)
        {
            tracing::trace!(agent = self.id, "Waypoint reached");
        }
    }

    /// Apply the tick's velocity to the position.
    pub fn integrate(&mut self, dt: Seconds) {
        self.position = integrate(self.position, self.velocity, dt);
    }

    fn evaluate_engagement(&mut self, ctx: &mut TickContext<'_>) {
        let present = self
            .target
            .filter(|target| ctx.world.position_of(*target).is_some());
        if self.target.is_some() && present.is_none() {
            tracing::debug!(agent = self.id, target = ?self.target, "Target no longer exists");
            self.target = None;
        }

        let Some(esm) = self.engagement.as_mut() else {
            return;
        };

        if let Some(target) = present {
            if self.range_occupants.contains(&target) {
                if let Some(change) = esm.engage(ctx.now) {
                    tracing::debug!(agent = self.id, target, "Engaged target already in range");
                    publish(ctx.replication, self.id, change);
                }
            }
        }

        match esm.evaluate(present, ctx.now) {
            Evaluation::Struck(strike) => {
                tracing::debug!(
                    agent = self.id,
                    target = strike.target,
                    damage = strike.damage,
                    "Strike"
                );
                ctx.damage
                    .receive_damage(strike.target, strike.damage, self.id);
                ctx.replication.broadcast_attack_succeeded(self.id);
            }
            Evaluation::TargetLost(change) => publish(ctx.replication, self.id, change),
            Evaluation::Idle | Evaluation::WindingUp => {}
        }
    }

    fn refresh_path(&mut self, ctx: &mut TickContext<'_>) {
        if ctx.now < self.next_path_update_at {
            return;
        }
        self.next_path_update_at = ctx.now + self.path_update_interval;

        if self.target.is_none() {
            self.target = ctx.world.nearest_to(self.position.value);
            if let Some(target) = self.target {
                tracing::debug!(agent = self.id, target, "Acquired target");
            }
        }

        let Some(nav) = self.navigation.as_mut() else {
            return;
        };
        let Some(destination) = self.target.and_then(|target| ctx.world.position_of(target))
        else {
            return;
        };
        nav.paths
            .request(self.id, self.position.value, destination, ctx.path_service);
    }

    fn step_movement(&mut self, ctx: &mut TickContext<'_>) -> Option<MovementStep> {
        let nav = self.navigation.as_mut()?;
        let recovering = self
            .engagement
            .as_ref()
            .is_some_and(|esm| esm.is_recovering(ctx.now));
        if recovering {
            return Some(
                nav.movement
                    .suspend(&mut self.velocity, SuspendReason::Recovering),
            );
        }
        Some(nav.movement.step(
            nav.paths.route_mut(),
            self.position,
            &mut self.velocity,
            ctx.dt,
        ))
    }
}

fn publish(replication: &mut ReplicationChannel, agent: EntityId, change: AttackingChange) {
    replication.publish_attacking(agent, change);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::DamageEvent;
    use crate::config::{EngagementConfig, MovementConfig};
    use crate::pathfinding::PathRequest;
    use crate::replication::ReplicationMessage;

    const AGENT: EntityId = 1;
    const HERO: EntityId = 10;

    struct Harness {
        ticks: u32,
        now: Seconds,
        dt: Seconds,
        world: BTreeMap<EntityId, Vec2Fixed>,
        replication: ReplicationChannel,
        requests: Vec<PathRequest>,
        damage: Vec<DamageEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let mut replication = ReplicationChannel::new();
            replication.attach(0).unwrap();
            Self {
                ticks: 0,
                now: Fixed::ZERO,
                dt: Fixed::ONE / Fixed::from_num(20),
                world: BTreeMap::new(),
                replication,
                requests: Vec::new(),
                damage: Vec::new(),
            }
        }

        fn tick(&mut self, agent: &mut Agent) {
            let mut ctx = TickContext {
                now: self.now,
                dt: self.dt,
                world: &self.world,
                replication: &mut self.replication,
                path_service: &mut self.requests,
                damage: &mut self.damage,
            };
            agent.tick(&mut ctx);
            agent.integrate(self.dt);
            self.ticks += 1;
            self.now = Fixed::from_num(self.ticks) / Fixed::from_num(20);
        }

        fn messages(&mut self) -> Vec<ReplicationMessage> {
            self.replication.drain(0).unwrap()
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            movement: Some(MovementConfig {
                move_speed: Fixed::from_num(100),
                ..MovementConfig::default()
            }),
            engagement: Some(EngagementConfig {
                damage: 2,
                attack_delay: Fixed::from_num(0.5),
                attack_recovery: Fixed::ONE,
            }),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_nearest_lookup_breaks_ties_by_id() {
        let world: BTreeMap<EntityId, Vec2Fixed> = [
            (7, Vec2Fixed::from_ints(3, 0)),
            (4, Vec2Fixed::from_ints(0, 3)),
            (9, Vec2Fixed::from_ints(10, 0)),
        ]
        .into_iter()
        .collect();

        assert_eq!(world.nearest_to(Vec2Fixed::ZERO), Some(4));
        assert_eq!(world.nearest_to(Vec2Fixed::from_ints(9, 0)), Some(9));
        assert_eq!(BTreeMap::new().nearest_to(Vec2Fixed::ZERO), None);
    }

    #[test]
    fn test_acquires_target_and_requests_path() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(20, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());

        harness.tick(&mut agent);

        assert_eq!(agent.target(), Some(HERO));
        assert_eq!(harness.requests.len(), 1);
        assert_eq!(harness.requests[0].destination, Vec2Fixed::from_ints(20, 0));
        assert_eq!(agent.next_path_update_at(), Fixed::from_num(0.5));
    }

    #[test]
    fn test_refresh_waits_for_interval() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(20, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());

        harness.tick(&mut agent);
        let request = harness.requests[0];
        agent.complete_path(PathResult::found(&request, vec![Vec2Fixed::from_ints(20, 0)]));

        // 0.05 .. 0.45: no new request
        for _ in 0..9 {
            harness.tick(&mut agent);
        }
        assert_eq!(harness.requests.len(), 1);

        harness.tick(&mut agent);
        assert_eq!(harness.requests.len(), 2);
    }

    #[test]
    fn test_stationary_agent_never_moves_or_requests() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config().stationary());

        for _ in 0..20 {
            harness.tick(&mut agent);
        }

        assert!(agent.is_stationary());
        assert_eq!(agent.target(), Some(HERO));
        assert!(harness.requests.is_empty());
        assert_eq!(agent.position().value, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_enter_engages_and_strikes_after_delay() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config().stationary());
        agent.set_target(Some(HERO), &mut harness.replication);

        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);
        assert!(agent.attacking());

        // Strike lands on the tick where now reaches 0.5
        for _ in 0..10 {
            harness.tick(&mut agent);
        }
        assert!(harness.damage.is_empty());
        harness.tick(&mut agent);

        assert_eq!(
            harness.damage,
            vec![DamageEvent {
                target: HERO,
                source: AGENT,
                amount: 2
            }]
        );
        assert_eq!(
            harness.messages(),
            vec![
                ReplicationMessage::AttackingChanged {
                    entity: AGENT,
                    previous: false,
                    new_value: true
                },
                ReplicationMessage::AttackSucceeded { entity: AGENT },
            ]
        );
    }

    #[test]
    fn test_enter_by_bystander_does_not_engage() {
        let mut harness = Harness::new();
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        agent.set_target(Some(HERO), &mut harness.replication);

        agent.on_attack_range_enter(99, harness.now, &mut harness.replication);

        assert!(!agent.attacking());
        assert!(agent.range_occupants().contains(&99));
    }

    #[test]
    fn test_destroyed_target_is_implicit_exit() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config().stationary());
        agent.set_target(Some(HERO), &mut harness.replication);
        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);
        harness.messages();

        harness.world.remove(&HERO);
        harness.tick(&mut agent);

        assert!(!agent.attacking());
        assert_eq!(agent.target(), None);
        assert!(harness.damage.is_empty());
        let ready_at = agent.engagement().unwrap().next_attack_ready_at();
        assert_eq!(ready_at, Fixed::ZERO);
        assert_eq!(
            harness.messages(),
            vec![ReplicationMessage::AttackingChanged {
                entity: AGENT,
                previous: true,
                new_value: false
            }]
        );
    }

    #[test]
    fn test_retarget_while_attacking_disengages() {
        let mut harness = Harness::new();
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        agent.set_target(Some(HERO), &mut harness.replication);
        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);

        agent.set_target(Some(HERO + 1), &mut harness.replication);

        assert!(!agent.attacking());
    }

    #[test]
    fn test_target_already_in_range_is_engaged_on_tick() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config().stationary());

        // Hero walks in before the agent has picked it
        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);
        assert!(!agent.attacking());

        harness.tick(&mut agent); // acquires
        harness.tick(&mut agent); // engages

        assert!(agent.attacking());
    }

    #[test]
    fn test_disable_clears_state_and_enable_matches_fresh() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        agent.set_target(Some(HERO), &mut harness.replication);
        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);
        for _ in 0..12 {
            harness.tick(&mut agent);
        }
        assert!(!harness.damage.is_empty());

        agent.set_controllable(false, &mut harness.replication);
        assert!(!agent.attacking());
        assert!(agent.velocity().is_stationary());

        agent.set_controllable(true, &mut harness.replication);
        let fresh = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        assert_eq!(agent.next_path_update_at(), fresh.next_path_update_at());
        assert_eq!(agent.engagement(), fresh.engagement());
    }

    #[test]
    fn test_disabled_agent_ignores_tick_and_enter() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        agent.set_controllable(false, &mut harness.replication);
        agent.set_target(Some(HERO), &mut harness.replication);

        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);
        harness.tick(&mut agent);

        assert!(!agent.attacking());
        assert!(harness.requests.is_empty());
        // Occupancy is still tracked for when control returns
        assert!(agent.range_occupants().contains(&HERO));
    }

    #[test]
    fn test_recovery_suspends_movement() {
        let mut harness = Harness::new();
        harness.world.insert(HERO, Vec2Fixed::from_ints(1, 0));
        let mut agent = Agent::new(AGENT, Vec2Fixed::ZERO, &config());
        harness.tick(&mut agent);
        let request = harness.requests[0];
        agent.complete_path(PathResult::found(&request, vec![Vec2Fixed::from_ints(30, 0)]));
        agent.on_attack_range_enter(HERO, harness.now, &mut harness.replication);

        // Move until the strike lands
        while harness.damage.is_empty() {
            harness.tick(&mut agent);
        }
        assert!(agent.velocity().is_stationary());

        agent.on_attack_range_exit(HERO, &mut harness.replication);
        harness.tick(&mut agent);
        assert!(agent.velocity().is_stationary());
        let position = agent.position();
        harness.tick(&mut agent);
        assert_eq!(agent.position(), position);
    }
}
