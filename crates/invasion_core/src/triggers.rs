//! Built-in spatial trigger source.
//!
//! Hosts that do not run a physics engine can let the simulation derive
//! enter/exit events from positions. [`ProximityTracker`] remembers which
//! identities were inside each circular region on the previous update and
//! reports the difference.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::gate::GateId;
use crate::math::{Fixed, Vec2Fixed};

/// A trigger region known to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegionId {
    /// Attack range of an agent.
    AttackRange(EntityId),
    /// Threshold region of a gate.
    Gate(GateId),
}

/// Membership change of one identity in one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEvent {
    /// `identity` is now inside `region`.
    Enter {
        /// Region entered.
        region: RegionId,
        /// Actor that entered.
        identity: EntityId,
    },
    /// `identity` is no longer inside `region`.
    Exit {
        /// Region left.
        region: RegionId,
        /// Actor that left.
        identity: EntityId,
    },
}

impl TriggerEvent {
    /// Region the event belongs to.
    #[must_use]
    pub const fn region(&self) -> RegionId {
        match *self {
            Self::Enter { region, .. } | Self::Exit { region, .. } => region,
        }
    }
}

/// Circle in world space. The boundary counts as inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircleRegion {
    /// Center.
    pub center: Vec2Fixed,
    /// Radius.
    #[serde(with = "crate::math::fixed_serde")]
    pub radius: Fixed,
}

impl CircleRegion {
    /// Circle around `center`.
    #[must_use]
    pub const fn new(center: Vec2Fixed, radius: Fixed) -> Self {
        Self { center, radius }
    }

    /// True when `point` lies inside or on the circle.
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        self.center.distance_squared(point) <= self.radius.saturating_mul(self.radius)
    }
}

/// Previous-update membership of every region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProximityTracker {
    inside: BTreeMap<RegionId, BTreeSet<EntityId>>,
}

impl ProximityTracker {
    /// Tracker with no remembered membership.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities that were inside `region` after the last update.
    pub fn members(&self, region: RegionId) -> impl Iterator<Item = EntityId> + '_ {
        self.inside.get(&region).into_iter().flatten().copied()
    }

    /// Recompute membership and report changes.
    ///
    /// All exits come before all enters. Within each group events are
    /// ordered by region, then identity. A region missing from `regions`
    /// reports an exit for everything it held.
    pub fn update(
        &mut self,
        regions: &[(RegionId, CircleRegion)],
        actors: &BTreeMap<EntityId, Vec2Fixed>,
    ) -> Vec<TriggerEvent> {
        let mut current: BTreeMap<RegionId, BTreeSet<EntityId>> = BTreeMap::new();
        for (region, circle) in regions {
            let members = actors
                .iter()
                .filter(|(_, position)| circle.contains(**position))
                .map(|(identity, _)| *identity)
                .collect();
            current.insert(*region, members);
        }

        let empty = BTreeSet::new();
        let mut exits = Vec::new();
        for (region, before) in &self.inside {
            let now = current.get(region).unwrap_or(&empty);
            exits.extend(before.difference(now).map(|identity| TriggerEvent::Exit {
                region: *region,
                identity: *identity,
            }));
        }

        let mut enters = Vec::new();
        for (region, now) in &current {
            let before = self.inside.get(region).unwrap_or(&empty);
            enters.extend(now.difference(before).map(|identity| TriggerEvent::Enter {
                region: *region,
                identity: *identity,
            }));
        }

        current.retain(|_, members| !members.is_empty());
        self.inside = current;

        exits.extend(enters);
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(x: i32, y: i32, radius: i32) -> CircleRegion {
        CircleRegion::new(Vec2Fixed::from_ints(x, y), Fixed::from_num(radius))
    }

    fn actors(entries: &[(EntityId, i32, i32)]) -> BTreeMap<EntityId, Vec2Fixed> {
        entries
            .iter()
            .map(|&(id, x, y)| (id, Vec2Fixed::from_ints(x, y)))
            .collect()
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let region = circle(0, 0, 2);
        assert!(region.contains(Vec2Fixed::from_ints(2, 0)));
        assert!(!region.contains(Vec2Fixed::from_ints(2, 1)));
    }

    #[test]
    fn test_reports_enter_once() {
        let mut tracker = ProximityTracker::new();
        let regions = [(RegionId::Gate(1), circle(0, 0, 2))];
        let world = actors(&[(7, 1, 0), (8, 10, 0)]);

        let first = tracker.update(&regions, &world);
        let second = tracker.update(&regions, &world);

        assert_eq!(
            first,
            vec![TriggerEvent::Enter {
                region: RegionId::Gate(1),
                identity: 7
            }]
        );
        assert!(second.is_empty());
        assert_eq!(tracker.members(RegionId::Gate(1)).collect::<Vec<_>>(), [7]);
    }

    #[test]
    fn test_exits_precede_enters() {
        let mut tracker = ProximityTracker::new();
        let regions = [
            (RegionId::AttackRange(1), circle(0, 0, 2)),
            (RegionId::Gate(2), circle(10, 0, 2)),
        ];
        tracker.update(&regions, &actors(&[(7, 0, 0)]));

        let events = tracker.update(&regions, &actors(&[(7, 10, 0)]));

        assert_eq!(
            events,
            vec![
                TriggerEvent::Exit {
                    region: RegionId::AttackRange(1),
                    identity: 7
                },
                TriggerEvent::Enter {
                    region: RegionId::Gate(2),
                    identity: 7
                },
            ]
        );
    }

    #[test]
    fn test_removed_actor_exits() {
        let mut tracker = ProximityTracker::new();
        let regions = [(RegionId::Gate(1), circle(0, 0, 2))];
        tracker.update(&regions, &actors(&[(7, 0, 0)]));

        let events = tracker.update(&regions, &BTreeMap::new());

        assert_eq!(
            events,
            vec![TriggerEvent::Exit {
                region: RegionId::Gate(1),
                identity: 7
            }]
        );
    }

    #[test]
    fn test_vanished_region_reports_exits() {
        let mut tracker = ProximityTracker::new();
        let world = actors(&[(7, 0, 0)]);
        tracker.update(&[(RegionId::AttackRange(3), circle(0, 0, 2))], &world);

        let events = tracker.update(&[], &world);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].region(), RegionId::AttackRange(3));
    }
}
