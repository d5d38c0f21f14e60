#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative board state management for Duel Defence.
//!
//! A [`Board`] owns the classified grid, the flow field, both lifecycle
//! managers, the life pool, and the timer queue of one player's board. Every
//! participant keeps a copy of every board; the [`AuthorityModel`] decides
//! which copy's outcome counts for each entity.

pub mod authority;
pub mod entity;
pub mod grid;
pub mod lifecycle;
pub mod navigation;
pub mod registry;
pub mod timers;

use std::time::Duration;

use duel_defence_core::{
    BoardError, BoardId, Catalog, CellCoord, CellRole, Command, EntityId, EntityKind, Event,
    OwnerPayload, ParticipantId, PlacementError, Prefab, ReplicatedState, RemovalCause,
    StructureKind, StructureStats, UnitKind,
};
use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    authority::{AuthorityModel, ReplicaEffects},
    entity::{Body, DamageOutcome, Entity, HealOutcome, TravelOutcome},
    grid::{classify, ClassifiedGrid, TileMap},
    lifecycle::{DestroyOutcome, LifecycleManager, PassReport},
    navigation::FlowField,
    timers::TimerQueue,
};

pub use registry::BoardRegistry;

const DEFAULT_STARTING_LIVES: u32 = 20;
const DEFAULT_PUBLISH_PERIOD: Duration = Duration::from_millis(100);
const DEFAULT_RNG_SEED: u64 = 0x5eed_d0e1_2024_0001;

/// Tunables applied when a board is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardConfig {
    /// Lives the board owner starts with.
    pub starting_lives: u32,
    /// Interval between state publications of authoritative entities.
    pub publish_period: Duration,
    /// Seed for the board's spawn-cell generator.
    pub rng_seed: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            starting_lives: DEFAULT_STARTING_LIVES,
            publish_period: DEFAULT_PUBLISH_PERIOD,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimedEffect {
    ExpireSpecial { entity: EntityId },
    RestoreDamageable { entity: EntityId },
}

/// State of a single player's board.
#[derive(Debug)]
pub struct Board {
    id: BoardId,
    owner: ParticipantId,
    authority: AuthorityModel,
    catalog: Catalog,
    grid: ClassifiedGrid,
    flow: FlowField,
    units: LifecycleManager,
    structures: LifecycleManager,
    timers: TimerQueue<TimedEffect>,
    rng: ChaCha8Rng,
    next_serial: u32,
    lives: u32,
    defeated: bool,
    publish_period: Duration,
}

impl Board {
    /// Classifies the tile map, builds the flow field and readies an empty board.
    ///
    /// Fails when the map is malformed, when it does not hold exactly one
    /// reachable goal, or when it has no spawn cell.
    pub fn new(
        id: BoardId,
        owner: ParticipantId,
        map: &TileMap,
        catalog: Catalog,
        config: BoardConfig,
        authority: AuthorityModel,
    ) -> Result<Self, BoardError> {
        let grid = classify(map)?;
        let flow = FlowField::build(&grid)?;
        if flow.spawn_cells().is_empty() {
            return Err(BoardError::NoSpawnCell);
        }

        info!(
            "board {id:?} ready: {}x{} cells, {} spawn cells, goal at {:?}",
            grid.columns(),
            grid.rows(),
            flow.spawn_cells().len(),
            flow.goal()
        );

        Ok(Self {
            id,
            owner,
            authority,
            catalog,
            grid,
            flow,
            units: LifecycleManager::new(id, EntityKind::Unit),
            structures: LifecycleManager::new(id, EntityKind::Structure),
            timers: TimerQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            next_serial: 0,
            lives: config.starting_lives,
            defeated: false,
            publish_period: config.publish_period,
        })
    }

    fn allocate_id(&mut self) -> EntityId {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        EntityId::new(self.authority.local(), serial)
    }

    fn manager_mut(&mut self, entity: EntityId) -> Option<&mut LifecycleManager> {
        if self.units.contains(entity) {
            Some(&mut self.units)
        } else if self.structures.contains(entity) {
            Some(&mut self.structures)
        } else {
            None
        }
    }

    fn entity_mut(&mut self, entity: EntityId) -> Option<&mut Entity> {
        self.manager_mut(entity)
            .and_then(|manager| manager.get_mut(entity))
    }

    fn tick(&mut self, dt: Duration, out: &mut Vec<Event>) {
        out.push(Event::TimeAdvanced { dt });
        self.expire_timers(dt, out);

        let model = self.authority;
        let period = self.publish_period;
        let flow = &self.flow;
        let mut leaked = 0_u32;

        let report = self.units.tick(dt, |unit, context| {
            if !unit.authorize(&model) {
                unit.smooth(&model, dt, flow);
                return;
            }

            let delta = unit.speed() * dt.as_secs_f32();
            if unit.advance_progress(&model, delta, flow) == TravelOutcome::ReachedGoal {
                let amount = match unit.body() {
                    Body::Unit(state) => state.stats().leak_damage,
                    Body::Structure(_) => 0,
                };
                if context.request_destroy(unit.id(), RemovalCause::Leaked) {
                    out.push(Event::UnitLeaked {
                        entity: unit.id(),
                        amount,
                    });
                    leaked = leaked.saturating_add(amount);
                }
                return;
            }

            if let Some(snapshot) = unit.publish_due(dt, period) {
                out.push(Event::SnapshotDue {
                    entity: unit.id(),
                    snapshot,
                });
            }
        });
        announce_pass(&self.units, report, out);
        self.lose_lives(leaked, out);

        let report = self.structures.tick(dt, |structure, _| {
            structure.cool_down(dt);
            if let Some(snapshot) = structure.publish_due(dt, period) {
                out.push(Event::SnapshotDue {
                    entity: structure.id(),
                    snapshot,
                });
            }
        });
        announce_pass(&self.structures, report, out);
    }

    fn expire_timers(&mut self, dt: Duration, out: &mut Vec<Event>) {
        let model = self.authority;
        for (_, effect) in self.timers.advance(dt) {
            match effect {
                TimedEffect::ExpireSpecial { entity } => {
                    let Some(target) = self.entity_mut(entity) else {
                        trace!("special state expired for departed entity {entity:?}");
                        continue;
                    };
                    let _ = target.replace_special_timer(None);
                    if let Some(active) = target.set_special(&model, false) {
                        out.push(Event::SpecialStateChanged { entity, active });
                    }
                }
                TimedEffect::RestoreDamageable { entity } => {
                    let Some(target) = self.entity_mut(entity) else {
                        trace!("invulnerability expired for departed entity {entity:?}");
                        continue;
                    };
                    let _ = target.replace_damageable_timer(None);
                    if let Some(damageable) = target.set_damageable(&model, true) {
                        out.push(Event::DamageableChanged { entity, damageable });
                    }
                }
            }
        }
    }

    fn spawn_unit(&mut self, kind: UnitKind, path_index: Option<u32>, out: &mut Vec<Event>) {
        let Some(stats) = self.catalog.unit(kind).copied() else {
            warn!("board {:?} cannot spawn unknown unit kind {kind:?}", self.id);
            return;
        };

        let chosen = match path_index {
            Some(index) => self.flow.spawn_cell(index).map(|cell| (index, cell)),
            None => self.flow.random_spawn_cell(&mut self.rng),
        };
        let Some((path_index, origin)) = chosen else {
            warn!("board {:?} has no spawn cell for a new unit", self.id);
            return;
        };

        let id = self.allocate_id();
        let local = self.authority.local();
        let unit = Entity::unit(
            id,
            self.id,
            kind,
            stats,
            path_index,
            origin,
            self.authority.record_for(local),
        );
        if self.units.spawn(unit).is_none() {
            return;
        }

        debug!("board {:?} spawned unit {id:?} at {origin:?}", self.id);
        out.push(Event::EntitySpawned {
            entity: id,
            prefab: Prefab::Unit(kind),
            cell: origin,
            payload: OwnerPayload {
                owner_board: self.id,
                authority: local,
                path_index,
            },
        });
    }

    fn check_placement(
        &self,
        kind: StructureKind,
        cell: CellCoord,
    ) -> Result<StructureStats, PlacementError> {
        if self.owner != self.authority.local() {
            return Err(PlacementError::ForeignBoard);
        }
        let stats = self
            .catalog
            .structure(kind)
            .copied()
            .ok_or(PlacementError::UnknownKind)?;
        if !self.grid.contains(cell) {
            return Err(PlacementError::OutOfBounds);
        }
        if self.grid.role(cell) != Some(CellRole::Buildable) {
            return Err(PlacementError::NotBuildable);
        }
        if self.structures.iter().any(|structure| structure.cell() == cell) {
            return Err(PlacementError::Occupied);
        }
        Ok(stats)
    }

    fn place_structure(&mut self, kind: StructureKind, cell: CellCoord, out: &mut Vec<Event>) {
        let stats = match self.check_placement(kind, cell) {
            Ok(stats) => stats,
            Err(reason) => {
                debug!("board {:?} rejected placement at {cell:?}: {reason:?}", self.id);
                out.push(Event::PlacementRejected { kind, cell, reason });
                return;
            }
        };

        let id = self.allocate_id();
        let local = self.authority.local();
        let structure = Entity::structure(
            id,
            self.id,
            kind,
            stats,
            cell,
            self.authority.record_for(local),
        );
        if self.structures.spawn(structure).is_none() {
            return;
        }

        out.push(Event::EntitySpawned {
            entity: id,
            prefab: Prefab::Structure(kind),
            cell,
            payload: OwnerPayload {
                owner_board: self.id,
                authority: local,
                path_index: 0,
            },
        });
    }

    fn admit(
        &mut self,
        entity: EntityId,
        prefab: Prefab,
        cell: CellCoord,
        payload: OwnerPayload,
        out: &mut Vec<Event>,
    ) {
        if payload.owner_board != self.id {
            warn!(
                "board {:?} refused entity {entity:?} addressed to board {:?}",
                self.id, payload.owner_board
            );
            return;
        }

        if payload.authority == self.authority.local() {
            debug!("board {:?} ignoring echo of local entity {entity:?}", self.id);
            return;
        }

        let record = self.authority.record_for(payload.authority);
        let admitted = match prefab {
            Prefab::Unit(kind) => {
                let Some(stats) = self.catalog.unit(kind).copied() else {
                    warn!("board {:?} cannot admit unknown unit kind {kind:?}", self.id);
                    return;
                };
                self.units.spawn(Entity::unit(
                    entity,
                    self.id,
                    kind,
                    stats,
                    payload.path_index,
                    cell,
                    record,
                ))
            }
            Prefab::Structure(kind) => {
                let Some(stats) = self.catalog.structure(kind).copied() else {
                    warn!(
                        "board {:?} cannot admit unknown structure kind {kind:?}",
                        self.id
                    );
                    return;
                };
                self.structures.spawn(Entity::structure(
                    entity, self.id, kind, stats, cell, record,
                ))
            }
        };

        if admitted.is_some() {
            out.push(Event::EntityAdmitted { entity, prefab });
        }
    }

    fn apply_damage(&mut self, target: EntityId, amount: i32, out: &mut Vec<Event>) {
        let model = self.authority;
        let Some(entity) = self.entity_mut(target) else {
            warn!("damage requested for unknown entity {target:?}");
            return;
        };

        match entity.apply_damage(&model, amount) {
            DamageOutcome::Applied {
                amount,
                health,
                killed,
            } => {
                out.push(Event::EntityDamaged {
                    entity: target,
                    amount,
                    health,
                });
                if killed {
                    self.destroy(target, true, RemovalCause::Killed, out);
                }
            }
            DamageOutcome::Rejected => {}
            DamageOutcome::Ignored => trace!("damage against {target:?} ignored"),
        }
    }

    fn heal(&mut self, target: EntityId, amount: i32, out: &mut Vec<Event>) {
        let model = self.authority;
        let Some(entity) = self.entity_mut(target) else {
            warn!("heal requested for unknown entity {target:?}");
            return;
        };

        if let HealOutcome::Applied { health } = entity.heal(&model, amount) {
            out.push(Event::EntityHealed {
                entity: target,
                health,
            });
        }
    }

    fn set_special(
        &mut self,
        target: EntityId,
        active: bool,
        duration: Option<Duration>,
        out: &mut Vec<Event>,
    ) {
        let model = self.authority;
        let Some(entity) = self.entity_mut(target) else {
            warn!("special state requested for unknown entity {target:?}");
            return;
        };
        if !entity.authorize(&model) {
            return;
        }

        if let Some(active) = entity.set_special(&model, active) {
            out.push(Event::SpecialStateChanged {
                entity: target,
                active,
            });
        }
        if let Some(previous) = entity.replace_special_timer(None) {
            let _ = self.timers.cancel(previous);
        }

        if let (true, Some(duration)) = (active, duration) {
            let timer = self
                .timers
                .schedule(duration, TimedEffect::ExpireSpecial { entity: target });
            if let Some(entity) = self.entity_mut(target) {
                let _ = entity.replace_special_timer(Some(timer));
            }
        }
    }

    fn set_damageable(
        &mut self,
        target: EntityId,
        damageable: bool,
        duration: Option<Duration>,
        out: &mut Vec<Event>,
    ) {
        let model = self.authority;
        let Some(entity) = self.entity_mut(target) else {
            warn!("damageable flag requested for unknown entity {target:?}");
            return;
        };
        if !entity.authorize(&model) {
            return;
        }

        if let Some(damageable) = entity.set_damageable(&model, damageable) {
            out.push(Event::DamageableChanged {
                entity: target,
                damageable,
            });
        }
        if let Some(previous) = entity.replace_damageable_timer(None) {
            let _ = self.timers.cancel(previous);
        }

        if let (false, Some(duration)) = (damageable, duration) {
            let timer = self
                .timers
                .schedule(duration, TimedEffect::RestoreDamageable { entity: target });
            if let Some(entity) = self.entity_mut(target) {
                let _ = entity.replace_damageable_timer(Some(timer));
            }
        }
    }

    fn fire(&mut self, structure: EntityId, target: EntityId, out: &mut Vec<Event>) {
        if !self.units.iter().any(|unit| unit.id() == target) {
            debug!("structure {structure:?} has no live target {target:?}");
            return;
        }

        let Some(shooter) = self.structures.get_mut(structure) else {
            warn!("fire requested for unknown structure {structure:?}");
            return;
        };
        let Some(damage) = shooter.try_fire() else {
            return;
        };

        out.push(Event::StructureFired { structure, target });
        if damage == 0 {
            return;
        }
        let amount = i32::try_from(damage).unwrap_or(i32::MAX);
        self.apply_damage(target, amount, out);
    }

    fn destroy(
        &mut self,
        entity: EntityId,
        immediate: bool,
        cause: RemovalCause,
        out: &mut Vec<Event>,
    ) {
        let board = self.id;
        let Some(manager) = self.manager_mut(entity) else {
            warn!("destroy requested for unknown entity {entity:?} on board {board:?}");
            return;
        };

        match manager.request_destroy(entity, immediate, cause) {
            DestroyOutcome::Removed(removal) => {
                trace!("board {board:?} removed {entity:?} ({cause:?})");
                out.push(Event::EntityRemoved { removal });
            }
            DestroyOutcome::Deferred => {
                trace!("board {board:?} deferred removal of {entity:?}");
            }
            DestroyOutcome::AlreadyPending => {
                debug!("removal of {entity:?} already pending on board {board:?}");
            }
            DestroyOutcome::Missing => {}
        }
    }

    fn request_destroy(&mut self, entity: EntityId, immediate: bool, out: &mut Vec<Event>) {
        let model = self.authority;
        let Some(target) = self.entity_mut(entity) else {
            warn!("destroy requested for unknown entity {entity:?}");
            return;
        };
        if !model.permits(target.authority()) {
            return;
        }
        target.mark_dead();
        self.destroy(entity, immediate, RemovalCause::Destroyed, out);
    }

    fn mirror_snapshot(&mut self, entity: EntityId, snapshot: ReplicatedState, out: &mut Vec<Event>) {
        let model = self.authority;
        let period = self.publish_period;
        let Some(target) = self.entity_mut(entity) else {
            trace!("snapshot for departed entity {entity:?}");
            return;
        };
        let effects = target.apply_snapshot(&model, snapshot, period);
        announce_effects(entity, effects, out);
    }

    fn mirror_health(&mut self, entity: EntityId, health: u32, out: &mut Vec<Event>) {
        let model = self.authority;
        let Some(target) = self.entity_mut(entity) else {
            trace!("health update for departed entity {entity:?}");
            return;
        };
        let effects = target.mirror_health(&model, health);
        announce_effects(entity, effects, out);
    }

    fn mirror_destroy(&mut self, entity: EntityId, cause: RemovalCause, out: &mut Vec<Event>) {
        let model = self.authority;
        let Some(target) = self.entity_mut(entity) else {
            trace!("remote destroy for departed entity {entity:?}");
            return;
        };
        if model.permits(target.authority()) {
            warn!("ignoring remote destroy of locally owned entity {entity:?}");
            return;
        }
        target.mark_dead();
        self.destroy(entity, true, cause, out);
    }

    fn mirror_leak(&mut self, entity: EntityId, amount: u32, out: &mut Vec<Event>) {
        if entity.spawner() == self.authority.local() {
            warn!("ignoring remote leak report for locally owned unit {entity:?}");
            return;
        }
        self.mirror_destroy(entity, RemovalCause::Leaked, out);
        self.lose_lives(amount, out);
    }

    fn lose_lives(&mut self, amount: u32, out: &mut Vec<Event>) {
        if amount == 0 {
            return;
        }

        self.lives = self.lives.saturating_sub(amount);
        out.push(Event::LivesChanged { lives: self.lives });

        if self.lives == 0 && !self.defeated {
            self.defeated = true;
            info!("board {:?} owned by {:?} has been defeated", self.id, self.owner);
            out.push(Event::BoardDefeated { board: self.id });
        }
    }
}

fn announce_pass(manager: &LifecycleManager, report: PassReport, out: &mut Vec<Event>) {
    for entity in report.joined {
        if let Some(joined) = manager.get(entity) {
            out.push(Event::EntityAdmitted {
                entity,
                prefab: joined.prefab(),
            });
        }
    }

    if !report.removals.is_empty() {
        out.push(Event::EntitiesRemoved {
            removals: report.removals,
        });
    }
}

fn announce_effects(entity: EntityId, effects: ReplicaEffects, out: &mut Vec<Event>) {
    if let Some((previous, current)) = effects.damaged {
        out.push(Event::DamageReaction {
            entity,
            previous,
            current,
        });
    }
    if let Some(active) = effects.special {
        out.push(Event::SpecialStateChanged { entity, active });
    }
    if let Some(damageable) = effects.damageable {
        out.push(Event::DamageableChanged { entity, damageable });
    }
}

/// Applies the provided command to the board, mutating state deterministically.
pub fn apply(board: &mut Board, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => board.tick(dt, out_events),
        Command::SpawnUnit { kind, path_index } => board.spawn_unit(kind, path_index, out_events),
        Command::PlaceStructure { kind, cell } => board.place_structure(kind, cell, out_events),
        Command::Admit {
            entity,
            prefab,
            cell,
            payload,
        } => board.admit(entity, prefab, cell, payload, out_events),
        Command::ApplyDamage { target, amount } => board.apply_damage(target, amount, out_events),
        Command::Heal { target, amount } => board.heal(target, amount, out_events),
        Command::SetSpecialState {
            target,
            active,
            duration,
        } => board.set_special(target, active, duration, out_events),
        Command::SetDamageable {
            target,
            damageable,
            duration,
        } => board.set_damageable(target, damageable, duration, out_events),
        Command::FireStructure { structure, target } => board.fire(structure, target, out_events),
        Command::RequestDestroy { entity, immediate } => {
            board.request_destroy(entity, immediate, out_events);
        }
        Command::MirrorSnapshot { entity, snapshot } => {
            board.mirror_snapshot(entity, snapshot, out_events);
        }
        Command::MirrorHealth { entity, health } => board.mirror_health(entity, health, out_events),
        Command::MirrorDestroy { entity } => {
            board.mirror_destroy(entity, RemovalCause::Remote, out_events);
        }
        Command::MirrorLeak { entity, amount } => board.mirror_leak(entity, amount, out_events),
    }
}

/// Query functions that provide read-only access to the board state.
pub mod query {
    use std::time::Duration;

    use duel_defence_core::{
        BoardId, EntityId, EntitySnapshot, ParticipantId, StructureCooldownView,
    };

    use super::Board;
    use crate::{
        authority::AuthorityModel, entity::Entity, grid::ClassifiedGrid,
        lifecycle::LifecycleManager, navigation::FlowField,
    };

    /// Identifier of the board.
    #[must_use]
    pub fn board_id(board: &Board) -> BoardId {
        board.id
    }

    /// Participant defending the board.
    #[must_use]
    pub fn owner(board: &Board) -> ParticipantId {
        board.owner
    }

    /// Authority model of the participant holding this copy of the board.
    #[must_use]
    pub fn authority(board: &Board) -> AuthorityModel {
        board.authority
    }

    /// Lives remaining in the board's pool.
    #[must_use]
    pub fn lives(board: &Board) -> u32 {
        board.lives
    }

    /// Reports whether the board's life pool has been exhausted.
    #[must_use]
    pub fn is_defeated(board: &Board) -> bool {
        board.defeated
    }

    /// Simulated time the board has advanced through.
    #[must_use]
    pub fn now(board: &Board) -> Duration {
        board.timers.now()
    }

    /// Number of timed effects waiting to expire.
    #[must_use]
    pub fn pending_timers(board: &Board) -> usize {
        board.timers.len()
    }

    /// Classified cell roles of the board.
    #[must_use]
    pub fn grid(board: &Board) -> &ClassifiedGrid {
        &board.grid
    }

    /// Flow field that units follow toward the goal.
    #[must_use]
    pub fn flow_field(board: &Board) -> &FlowField {
        &board.flow
    }

    /// Lifecycle manager holding the board's units.
    #[must_use]
    pub fn units(board: &Board) -> &LifecycleManager {
        &board.units
    }

    /// Lifecycle manager holding the board's structures.
    #[must_use]
    pub fn structures(board: &Board) -> &LifecycleManager {
        &board.structures
    }

    /// Entity with the provided identifier, whichever collection holds it.
    #[must_use]
    pub fn entity(board: &Board, entity: EntityId) -> Option<&Entity> {
        board
            .units
            .get(entity)
            .or_else(|| board.structures.get(entity))
    }

    /// Snapshots of every live unit, ordered by identifier.
    #[must_use]
    pub fn unit_snapshots(board: &Board) -> Vec<EntitySnapshot> {
        let mut snapshots: Vec<EntitySnapshot> = board.units.iter().map(Entity::snapshot).collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Cooldown readiness of every live structure.
    #[must_use]
    pub fn structure_cooldowns(board: &Board) -> StructureCooldownView {
        StructureCooldownView::from_snapshots(
            board
                .structures
                .iter()
                .filter_map(Entity::cooldown_snapshot)
                .collect(),
        )
    }
}
