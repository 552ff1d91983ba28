//! Gate tests driven through the simulation's proximity triggers.

use invasion_core::config::GateConfig;
use invasion_core::error::GameError;
use invasion_core::gate::{GateEvent, GateId, GateMode};
use invasion_core::simulation::Simulation;
use invasion_core::triggers::RegionId;
use invasion_test_utils::determinism::strategies::arb_occupancy_event;
use invasion_test_utils::fixtures::pos;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn arena(mode: GateMode) -> (Simulation, GateId) {
    let mut sim = Simulation::new();
    sim.set_proximity_triggers(true);
    let gate = sim.add_gate(&GateConfig {
        mode,
        ..GateConfig::default()
    });
    (sim, gate)
}

#[test]
fn test_normal_gate_follows_occupancy() {
    let (mut sim, gate) = arena(GateMode::Normal);
    let a = sim.add_actor(pos(0, 1));
    let b = sim.add_actor(pos(20, 0));

    assert_eq!(sim.tick().gate_events, vec![(gate, GateEvent::Opened)]);

    sim.set_actor_position(b, pos(1, 0)).unwrap();
    assert!(sim.tick().gate_events.is_empty());

    sim.set_actor_position(a, pos(0, 20)).unwrap();
    assert!(sim.tick().gate_events.is_empty());
    assert!(sim.gate(gate).unwrap().is_open());

    sim.remove_actor(b).unwrap();
    assert_eq!(sim.tick().gate_events, vec![(gate, GateEvent::Closed)]);
    assert!(sim.gate(gate).unwrap().occupants().is_empty());
}

#[test]
fn test_locked_gate_opens_only_for_new_arrival_after_unlock() {
    let (mut sim, gate) = arena(GateMode::Locked);
    let actor = sim.add_actor(pos(0, 1));

    assert!(sim.tick().gate_events.is_empty());
    let state = sim.gate(gate).unwrap();
    assert!(!state.is_open());
    assert!(state.locked_indicator());
    assert!(state.obstacle_active());
    assert!(state.occupants().contains(&actor));

    assert_eq!(sim.unlock_gate(gate).unwrap(), Some(GateEvent::Unlocked));
    let state = sim.gate(gate).unwrap();
    assert_eq!(state.mode(), GateMode::Normal);
    assert!(!state.locked_indicator());
    assert!(!state.obstacle_active());
    assert!(!state.is_open());

    // Someone already standing there does not count as arriving.
    assert!(sim.tick().gate_events.is_empty());
    assert!(!sim.gate(gate).unwrap().is_open());

    sim.set_actor_position(actor, pos(0, 10)).unwrap();
    assert!(sim.tick().gate_events.is_empty());

    sim.set_actor_position(actor, pos(0, 1)).unwrap();
    assert_eq!(sim.tick().gate_events, vec![(gate, GateEvent::Opened)]);
}

#[test]
fn test_broken_gate_needs_fix_not_unlock() {
    let (mut sim, gate) = arena(GateMode::Broken);
    sim.add_actor(pos(0, 1));
    sim.tick();

    assert_eq!(sim.unlock_gate(gate).unwrap(), None);
    assert_eq!(sim.gate(gate).unwrap().mode(), GateMode::Broken);

    assert_eq!(sim.fix_gate(gate).unwrap(), Some(GateEvent::Fixed));
    assert_eq!(sim.fix_gate(gate).unwrap(), None);
    assert!(!sim.gate(gate).unwrap().is_open());
    assert!(!sim.gate(gate).unwrap().obstacle_active());
}

#[test]
fn test_unknown_gate_is_an_error() {
    let (mut sim, gate) = arena(GateMode::Locked);
    let missing = gate + 100;

    assert!(matches!(
        sim.unlock_gate(missing),
        Err(GameError::EntityNotFound(id)) if id == missing
    ));
    assert!(matches!(sim.fix_gate(missing), Err(GameError::EntityNotFound(_))));
}

#[test]
fn test_manual_triggers_drive_gate() {
    let mut sim = Simulation::new();
    let gate = sim.add_gate(&GateConfig::default());
    let region = RegionId::Gate(gate);

    sim.region_entered(region, 50);
    sim.region_entered(region, 50);
    sim.region_exited(region, 51);
    assert_eq!(sim.tick().gate_events, vec![(gate, GateEvent::Opened)]);

    sim.region_exited(region, 50);
    sim.region_exited(region, 50);
    assert_eq!(sim.tick().gate_events, vec![(gate, GateEvent::Closed)]);
}

proptest! {
    #[test]
    fn test_normal_gate_open_iff_occupied(
        events in proptest::collection::vec(arb_occupancy_event(), 0..40)
    ) {
        let mut sim = Simulation::new();
        let gate = sim.add_gate(&GateConfig::default());
        let mut inside = BTreeSet::new();

        for (enter, identity) in events {
            if enter {
                sim.region_entered(RegionId::Gate(gate), identity);
                inside.insert(identity);
            } else {
                sim.region_exited(RegionId::Gate(gate), identity);
                inside.remove(&identity);
            }
            sim.tick();

            let state = sim.gate(gate).unwrap();
            prop_assert_eq!(state.occupants(), &inside);
            prop_assert_eq!(state.is_open(), !inside.is_empty());
        }
    }
}
