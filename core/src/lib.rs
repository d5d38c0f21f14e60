#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Duel Defence engine.
//!
//! This crate defines the message surface that connects the hosting adapter,
//! the per-board world state, and pure systems. Adapters submit [`Command`]
//! values describing desired mutations of a single board, the world executes
//! those commands via its `apply` entry point, and then broadcasts [`Event`]
//! values for systems to react to. Systems consume event streams, query
//! immutable views, and respond with new command batches or outbound
//! [`Invocation`] values destined for the other participant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod replication;
mod stats;

pub use error::{BoardError, FlowFieldError, GridError, PlacementError, WaveError};
pub use replication::{Invocation, OwnerPayload, Procedure, TargetScope, Transport};
pub use stats::{
    Catalog, Health, StructureKind, StructureStats, TargetingPolicy, UnitKind, UnitStats,
    WaveSpec, WaveTable,
};

/// Commands that express all permissible mutations of a single board.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the board's simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Spawns a new unit on the board with the local participant as authority.
    SpawnUnit {
        /// Stat block used to construct the unit.
        kind: UnitKind,
        /// Index into the board's spawn cells; `None` picks one at random.
        path_index: Option<u32>,
    },
    /// Places a structure on a buildable cell with the local participant as authority.
    PlaceStructure {
        /// Stat block used to construct the structure.
        kind: StructureKind,
        /// Cell that the structure occupies.
        cell: CellCoord,
    },
    /// Registers an entity spawned by another participant.
    Admit {
        /// Identifier allocated by the spawning participant.
        entity: EntityId,
        /// Prefab the spawning participant instantiated.
        prefab: Prefab,
        /// Cell where the entity was instantiated.
        cell: CellCoord,
        /// Ownership metadata carried by the instantiate call.
        payload: OwnerPayload,
    },
    /// Applies damage to an entity. Ignored unless the local participant is authoritative.
    ApplyDamage {
        /// Entity receiving the damage.
        target: EntityId,
        /// Magnitude of the damage; must be strictly positive.
        amount: i32,
    },
    /// Restores health to an entity. Ignored unless the local participant is authoritative.
    Heal {
        /// Entity receiving the heal.
        target: EntityId,
        /// Magnitude of the heal; must be strictly positive.
        amount: i32,
    },
    /// Toggles the entity's special state, optionally reverting after a duration.
    SetSpecialState {
        /// Entity whose special state changes.
        target: EntityId,
        /// Whether the special state should be active.
        active: bool,
        /// Optional duration after which the flag reverts to inactive.
        duration: Option<Duration>,
    },
    /// Toggles whether the entity may receive damage, optionally reverting after a duration.
    SetDamageable {
        /// Entity whose damageable flag changes.
        target: EntityId,
        /// Whether the entity may receive damage.
        damageable: bool,
        /// Optional duration after which the flag reverts to damageable.
        duration: Option<Duration>,
    },
    /// Orders a structure to fire at a unit if its cooldown allows.
    FireStructure {
        /// Structure attempting to fire.
        structure: EntityId,
        /// Unit targeted by the structure.
        target: EntityId,
    },
    /// Requests destruction of an entity owned by the local participant.
    RequestDestroy {
        /// Entity targeted for destruction.
        entity: EntityId,
        /// Destroy now when possible, otherwise defer until the next pass ends.
        immediate: bool,
    },
    /// Applies a replicated state snapshot received from the authority.
    MirrorSnapshot {
        /// Entity the snapshot describes.
        entity: EntityId,
        /// Replicated state published by the authority.
        snapshot: ReplicatedState,
    },
    /// Applies a replicated health value after the authority applied damage.
    MirrorHealth {
        /// Entity whose health changed.
        entity: EntityId,
        /// Health reported by the authority after the change.
        health: u32,
    },
    /// Removes an entity whose authority destroyed it.
    MirrorDestroy {
        /// Entity that the authority destroyed.
        entity: EntityId,
    },
    /// Removes a unit whose authority reported it reaching the goal and charges the life pool.
    MirrorLeak {
        /// Unit that reached the goal.
        entity: EntityId,
        /// Lives the board owner loses.
        amount: u32,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the board's simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that the local participant spawned an authoritative entity.
    EntitySpawned {
        /// Identifier allocated for the entity.
        entity: EntityId,
        /// Prefab that was instantiated.
        prefab: Prefab,
        /// Cell where the entity was instantiated.
        cell: CellCoord,
        /// Ownership metadata to mirror to other participants.
        payload: OwnerPayload,
    },
    /// Confirms that an entity owned elsewhere joined the board.
    EntityAdmitted {
        /// Identifier allocated by the remote authority.
        entity: EntityId,
        /// Prefab that was instantiated.
        prefab: Prefab,
    },
    /// Reports that an entity left the board outside of a tick pass.
    EntityRemoved {
        /// Removal that took effect.
        removal: Removal,
    },
    /// Reports the entities removed after a tick pass completed.
    EntitiesRemoved {
        /// Removals applied once the pass finished, in request order.
        removals: Vec<Removal>,
    },
    /// Confirms that an authoritative entity took damage.
    EntityDamaged {
        /// Entity that was damaged.
        entity: EntityId,
        /// Damage applied.
        amount: u32,
        /// Health remaining after the damage.
        health: u32,
    },
    /// Confirms that an authoritative entity was healed.
    EntityHealed {
        /// Entity that was healed.
        entity: EntityId,
        /// Health after healing.
        health: u32,
    },
    /// Edge-triggered notice that a replicated entity's health dropped.
    DamageReaction {
        /// Entity whose health dropped.
        entity: EntityId,
        /// Health held before the update.
        previous: u32,
        /// Health held after the update.
        current: u32,
    },
    /// Edge-triggered notice that an entity's special state flipped.
    SpecialStateChanged {
        /// Entity whose flag flipped.
        entity: EntityId,
        /// New value of the flag.
        active: bool,
    },
    /// Edge-triggered notice that an entity's damageable flag flipped.
    DamageableChanged {
        /// Entity whose flag flipped.
        entity: EntityId,
        /// New value of the flag.
        damageable: bool,
    },
    /// Confirms that a structure fired at a unit.
    StructureFired {
        /// Structure that fired.
        structure: EntityId,
        /// Unit that was targeted.
        target: EntityId,
    },
    /// Reports that an authoritative unit reached the goal.
    UnitLeaked {
        /// Unit that reached the goal.
        entity: EntityId,
        /// Lives charged to the board owner.
        amount: u32,
    },
    /// Reports the board's life pool after a change.
    LivesChanged {
        /// Remaining lives.
        lives: u32,
    },
    /// Announces that the board's life pool has been exhausted.
    BoardDefeated {
        /// Board that lost.
        board: BoardId,
    },
    /// Announces that an authoritative entity's state is due for publication.
    SnapshotDue {
        /// Entity whose state should be published.
        entity: EntityId,
        /// State captured for publication.
        snapshot: ReplicatedState,
    },
    /// Reports that a structure placement request was rejected.
    PlacementRejected {
        /// Kind of structure requested.
        kind: StructureKind,
        /// Cell provided in the request.
        cell: CellCoord,
        /// Specific reason the placement failed.
        reason: PlacementError,
    },
}

/// Reason an entity left its lifecycle manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalCause {
    /// The entity's health reached zero.
    Killed,
    /// The unit reached the goal cell.
    Leaked,
    /// The authority explicitly destroyed the entity.
    Destroyed,
    /// The remote authority reported the entity gone.
    Remote,
}

/// Single entity removal reported by a lifecycle manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Removal {
    /// Entity that left the collection.
    pub entity: EntityId,
    /// Reason the entity was removed.
    pub cause: RemovalCause,
}

/// Numeric identity of a participant in a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(u32);

impl ParticipantId {
    /// Creates a new participant identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Small integer identifying a board within a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardId(u8);

impl BoardId {
    /// Creates a new board identifier.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }
}

/// Unique identifier assigned to a simulated entity.
///
/// Identifiers pair the spawning participant with a serial allocated by that
/// participant, so two participants never hand out the same value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    spawner: ParticipantId,
    serial: u32,
}

impl EntityId {
    /// Creates a new entity identifier.
    #[must_use]
    pub const fn new(spawner: ParticipantId, serial: u32) -> Self {
        Self { spawner, serial }
    }

    /// Participant that allocated the identifier.
    #[must_use]
    pub const fn spawner(&self) -> ParticipantId {
        self.spawner
    }

    /// Serial allocated by the spawning participant.
    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }
}

/// Broad category of a simulated entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Mobile entity that follows the flow field toward the goal.
    Unit,
    /// Stationary entity that attacks units.
    Structure,
}

/// Template reference used when instantiating an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prefab {
    /// Unit built from the referenced stat block.
    Unit(UnitKind),
    /// Structure built from the referenced stat block.
    Structure(StructureKind),
}

impl Prefab {
    /// Category of entity the prefab produces.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::Unit(_) => EntityKind::Unit,
            Self::Structure(_) => EntityKind::Structure,
        }
    }
}

/// Role assigned to an occupied grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellRole {
    /// Decorative cell that neither units nor structures use.
    Cosmetic,
    /// Cell that accepts structures.
    Buildable,
    /// Path cell that units walk along.
    Traversable,
    /// Path cell where units enter the board.
    Spawn,
    /// Path cell that units try to reach.
    Goal,
}

impl CellRole {
    /// Reports whether units may travel through the cell.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        matches!(self, Self::Traversable | Self::Spawn | Self::Goal)
    }
}

/// Cardinal directions between adjacent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    North,
    /// Movement toward increasing column indices.
    East,
    /// Movement toward increasing row indices.
    South,
    /// Movement toward decreasing column indices.
    West,
}

impl Direction {
    /// Directions in the fixed order used for neighbor expansion.
    pub const ALL: [Direction; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Direction that leads from `from` to the adjacent cell `to`, if they touch.
    #[must_use]
    pub fn between(from: CellCoord, to: CellCoord) -> Option<Self> {
        let column_diff = from.column().abs_diff(to.column());
        let row_diff = from.row().abs_diff(to.row());

        if column_diff + row_diff != 1 {
            return None;
        }

        if column_diff == 1 {
            if to.column() > from.column() {
                Some(Self::East)
            } else {
                Some(Self::West)
            }
        } else if to.row() > from.row() {
            Some(Self::South)
        } else {
            Some(Self::North)
        }
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Adjacent cell in the provided direction, if it does not underflow.
    #[must_use]
    pub fn neighbor(self, direction: Direction) -> Option<CellCoord> {
        match direction {
            Direction::North => self.row.checked_sub(1).map(|row| Self::new(self.column, row)),
            Direction::East => self
                .column
                .checked_add(1)
                .map(|column| Self::new(column, self.row)),
            Direction::South => self.row.checked_add(1).map(|row| Self::new(self.column, row)),
            Direction::West => self
                .column
                .checked_sub(1)
                .map(|column| Self::new(column, self.row)),
        }
    }
}

/// State an authority publishes so observers can mirror an entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedState {
    /// Continuous travel progress measured in cells.
    pub progress: f32,
    /// Whether the entity currently accepts damage.
    pub damageable: bool,
    /// Whether the entity's special state is active.
    pub special_active: bool,
    /// Current integer health.
    pub health: u32,
}

/// Read-only snapshot of a single entity used for targeting queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntitySnapshot {
    /// Identifier of the entity.
    pub id: EntityId,
    /// Category of the entity.
    pub kind: EntityKind,
    /// Cell the entity occupies.
    pub cell: CellCoord,
    /// Continuous travel progress; zero for structures.
    pub progress: f32,
    /// Current health.
    pub health: Health,
    /// Whether the local participant is authoritative for the entity.
    pub authoritative: bool,
}

/// Cooldown readiness of a single structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureCooldownSnapshot {
    /// Structure described by the snapshot.
    pub structure: EntityId,
    /// Remaining time until the structure may fire again.
    pub ready_in: Duration,
    /// Whether the structure is suppressed by its special state.
    pub disabled: bool,
}

/// Read-only snapshot describing the cooldowns of every structure on a board.
#[derive(Clone, Debug, Default)]
pub struct StructureCooldownView {
    snapshots: Vec<StructureCooldownSnapshot>,
}

impl StructureCooldownView {
    /// Creates a new view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<StructureCooldownSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.structure);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &StructureCooldownSnapshot> {
        self.snapshots.iter()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<StructureCooldownSnapshot> {
        self.snapshots
    }
}

/// Target assignment computed for a structure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StructureTarget {
    /// Structure that will fire.
    pub structure: EntityId,
    /// Unit selected as the target.
    pub unit: EntityId,
}
