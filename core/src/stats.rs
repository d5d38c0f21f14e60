//! Immutable descriptors loaded by the hosting application and handed to the
//! core: stat blocks for units and structures plus the wave table.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Identifier of a unit stat block inside a [`Catalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKind(u16);

impl UnitKind {
    /// Creates a new unit kind identifier.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

/// Identifier of a structure stat block inside a [`Catalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureKind(u16);

impl StructureKind {
    /// Creates a new structure kind identifier.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

/// Stat block describing a unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum health.
    pub health: u32,
    /// Travel speed measured in cells per second.
    pub speed: f32,
    /// Lives the defender loses when the unit reaches the goal.
    pub leak_damage: u32,
    /// Reward granted for destroying the unit.
    pub bounty: u32,
}

/// Strategy a structure uses to choose among units in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetingPolicy {
    /// Prefer the unit closest to the structure.
    Closest,
    /// Prefer the unit that travelled furthest along the path.
    MostProgressed,
}

/// Stat block describing a structure.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureStats {
    /// Maximum health.
    pub health: u32,
    /// Damage dealt per shot.
    pub damage: u32,
    /// Minimum time between shots.
    pub cooldown: Duration,
    /// Attack radius measured in cells.
    pub radius: f32,
    /// Build cost.
    pub cost: u32,
    /// Target selection strategy.
    pub targeting: TargetingPolicy,
}

/// Lookup table from kind identifiers to stat blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    units: BTreeMap<UnitKind, UnitStats>,
    structures: BTreeMap<StructureKind, StructureStats>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit stat block, replacing any previous entry for the kind.
    #[must_use]
    pub fn with_unit(mut self, kind: UnitKind, stats: UnitStats) -> Self {
        let _ = self.units.insert(kind, stats);
        self
    }

    /// Registers a structure stat block, replacing any previous entry for the kind.
    #[must_use]
    pub fn with_structure(mut self, kind: StructureKind, stats: StructureStats) -> Self {
        let _ = self.structures.insert(kind, stats);
        self
    }

    /// Stat block registered for the unit kind.
    #[must_use]
    pub fn unit(&self, kind: UnitKind) -> Option<&UnitStats> {
        self.units.get(&kind)
    }

    /// Stat block registered for the structure kind.
    #[must_use]
    pub fn structure(&self, kind: StructureKind) -> Option<&StructureStats> {
        self.structures.get(&kind)
    }
}

/// One entry of the wave table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveSpec {
    /// Number of units spawned by the wave.
    pub count: u32,
    /// Delay between successive spawns within the wave.
    pub interval: Duration,
    /// Stat block used for every unit in the wave.
    pub unit: UnitKind,
}

/// Ordered, finite list of waves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTable {
    waves: Vec<WaveSpec>,
}

impl WaveTable {
    /// Creates a wave table from the provided waves.
    #[must_use]
    pub fn new(waves: Vec<WaveSpec>) -> Self {
        Self { waves }
    }

    /// Wave at the provided index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&WaveSpec> {
        self.waves.get(index)
    }

    /// Number of waves in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    /// Reports whether the table contains no waves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Current and maximum health of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    current: u32,
    max: u32,
}

impl Health {
    /// Creates full health with the provided maximum.
    #[must_use]
    pub const fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Current health.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Maximum health.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Reports whether health has been exhausted.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.current == 0
    }

    /// Subtracts damage, saturating at zero. Returns the health actually removed.
    pub fn damage(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.current);
        self.current -= removed;
        removed
    }

    /// Adds health, saturating at the maximum. Returns the health actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max - self.current);
        self.current += restored;
        restored
    }

    /// Overwrites current health with a replicated value, clamped to the maximum.
    pub fn set_current(&mut self, value: u32) {
        self.current = value.min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_saturates_at_zero() {
        let mut health = Health::full(10);
        assert_eq!(health.damage(4), 4);
        assert_eq!(health.current(), 6);
        assert_eq!(health.damage(50), 6);
        assert_eq!(health.current(), 0);
        assert!(health.is_depleted());
    }

    #[test]
    fn heal_saturates_at_max() {
        let mut health = Health::full(10);
        let _ = health.damage(3);
        assert_eq!(health.heal(10), 3);
        assert_eq!(health.current(), 10);
    }

    #[test]
    fn replicated_health_is_clamped() {
        let mut health = Health::full(10);
        health.set_current(25);
        assert_eq!(health.current(), 10);
    }

    #[test]
    fn catalog_resolves_registered_kinds() {
        let catalog = Catalog::new().with_unit(
            UnitKind::new(3),
            UnitStats {
                health: 20,
                speed: 1.5,
                leak_damage: 1,
                bounty: 4,
            },
        );
        assert_eq!(catalog.unit(UnitKind::new(3)).map(|stats| stats.health), Some(20));
        assert!(catalog.unit(UnitKind::new(4)).is_none());
        assert!(catalog.structure(StructureKind::new(3)).is_none());
    }
}
