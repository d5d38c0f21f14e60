//! Simulated entities and their authority-checked mutators.

use std::time::Duration;

use duel_defence_core::{
    BoardId, CellCoord, EntityId, EntityKind, EntitySnapshot, Health, Prefab, ReplicatedState,
    StructureCooldownSnapshot, StructureKind, StructureStats, UnitKind, UnitStats,
};
use glam::Vec2;
use log::{debug, warn};

use crate::{
    authority::{AuthorityModel, AuthorityRecord, ProgressSmoother, ReplicaEffects},
    navigation::{cell_center, FlowField},
    timers::TimerId,
};

const HASTE_MULTIPLIER: f32 = 2.0;

/// Result of a damage request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Damage was applied by the authority.
    Applied {
        /// Health actually removed.
        amount: u32,
        /// Health remaining.
        health: u32,
        /// Whether the damage exhausted the entity's health.
        killed: bool,
    },
    /// The magnitude was not strictly positive.
    Rejected,
    /// The entity is dead, invulnerable, or owned by another participant.
    Ignored,
}

/// Result of a heal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealOutcome {
    /// Health was restored by the authority.
    Applied {
        /// Health after healing.
        health: u32,
    },
    /// The magnitude was not strictly positive.
    Rejected,
    /// The entity is dead or owned by another participant.
    Ignored,
}

/// Result of advancing a unit along the flow field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TravelOutcome {
    /// The unit moved and has not reached the goal.
    Travelling,
    /// The unit stands on the goal cell.
    ReachedGoal,
    /// The request did not apply to this entity.
    Ignored,
}

/// Unit-specific state.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitState {
    kind: UnitKind,
    stats: UnitStats,
    path_index: u32,
    origin: CellCoord,
    cell: CellCoord,
    hops: u32,
    progress: f32,
    smoother: ProgressSmoother,
}

impl UnitState {
    /// Stat block the unit was built from.
    #[must_use]
    pub const fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Stats applied to the unit.
    #[must_use]
    pub const fn stats(&self) -> &UnitStats {
        &self.stats
    }

    /// Index of the spawn cell the unit entered through.
    #[must_use]
    pub const fn path_index(&self) -> u32 {
        self.path_index
    }

    /// Spawn cell the unit entered through.
    #[must_use]
    pub const fn origin(&self) -> CellCoord {
        self.origin
    }

    /// Number of whole hops taken from the origin.
    #[must_use]
    pub const fn hops(&self) -> u32 {
        self.hops
    }

    fn sync_cell(&mut self, flow: &FlowField) -> bool {
        let whole = self.progress.max(0.0).floor();
        let target_hops = if whole >= u32::MAX as f32 {
            u32::MAX
        } else {
            whole as u32
        };

        if target_hops < self.hops {
            self.hops = 0;
            self.cell = self.origin;
        }

        while self.hops < target_hops && !flow.is_goal(self.cell) {
            match flow.step(self.cell) {
                Ok(next) => {
                    self.cell = next;
                    self.hops += 1;
                }
                Err(error) => {
                    warn!("unit stalled off the flow field: {error}");
                    break;
                }
            }
        }

        flow.is_goal(self.cell)
    }

    fn position(&self, flow: &FlowField) -> Vec2 {
        flow.position(self.cell, self.progress - self.hops as f32)
    }
}

/// Structure-specific state.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureState {
    kind: StructureKind,
    stats: StructureStats,
    cell: CellCoord,
    cooldown: Duration,
}

impl StructureState {
    /// Stat block the structure was built from.
    #[must_use]
    pub const fn kind(&self) -> StructureKind {
        self.kind
    }

    /// Stats applied to the structure.
    #[must_use]
    pub const fn stats(&self) -> &StructureStats {
        &self.stats
    }

    /// Remaining time until the structure may fire.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Kind-specific attributes of an entity.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Mobile unit state.
    Unit(UnitState),
    /// Stationary structure state.
    Structure(StructureState),
}

/// A unit or structure living on a board.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    id: EntityId,
    board: BoardId,
    health: Health,
    authority: AuthorityRecord,
    position: Vec2,
    damageable: bool,
    special_active: bool,
    alive: bool,
    special_timer: Option<TimerId>,
    damageable_timer: Option<TimerId>,
    body: Body,
}

impl Entity {
    /// Creates a unit standing on its spawn cell.
    #[must_use]
    pub fn unit(
        id: EntityId,
        board: BoardId,
        kind: UnitKind,
        stats: UnitStats,
        path_index: u32,
        origin: CellCoord,
        authority: AuthorityRecord,
    ) -> Self {
        Self {
            id,
            board,
            health: Health::full(stats.health),
            authority,
            position: cell_center(origin),
            damageable: true,
            special_active: false,
            alive: true,
            special_timer: None,
            damageable_timer: None,
            body: Body::Unit(UnitState {
                kind,
                stats,
                path_index,
                origin,
                cell: origin,
                hops: 0,
                progress: 0.0,
                smoother: ProgressSmoother::new(0.0),
            }),
        }
    }

    /// Creates a structure occupying `cell`, ready to fire.
    #[must_use]
    pub fn structure(
        id: EntityId,
        board: BoardId,
        kind: StructureKind,
        stats: StructureStats,
        cell: CellCoord,
        authority: AuthorityRecord,
    ) -> Self {
        Self {
            id,
            board,
            health: Health::full(stats.health),
            authority,
            position: cell_center(cell),
            damageable: true,
            special_active: false,
            alive: true,
            special_timer: None,
            damageable_timer: None,
            body: Body::Structure(StructureState {
                kind,
                stats,
                cell,
                cooldown: Duration::ZERO,
            }),
        }
    }

    /// Unique identifier of the entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Board the entity lives on.
    #[must_use]
    pub const fn board(&self) -> BoardId {
        self.board
    }

    /// Category of the entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self.body {
            Body::Unit(_) => EntityKind::Unit,
            Body::Structure(_) => EntityKind::Structure,
        }
    }

    /// Template the entity was instantiated from.
    #[must_use]
    pub const fn prefab(&self) -> Prefab {
        match &self.body {
            Body::Unit(unit) => Prefab::Unit(unit.kind),
            Body::Structure(structure) => Prefab::Structure(structure.kind),
        }
    }

    /// Kind-specific state.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Current and maximum health.
    #[must_use]
    pub const fn health(&self) -> Health {
        self.health
    }

    /// Authority record consulted by every mutator.
    #[must_use]
    pub const fn authority(&self) -> &AuthorityRecord {
        &self.authority
    }

    /// World-space position measured in cells.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Cell the entity occupies.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        match &self.body {
            Body::Unit(unit) => unit.cell,
            Body::Structure(structure) => structure.cell,
        }
    }

    /// Continuous travel progress measured in cells; zero for structures.
    #[must_use]
    pub const fn progress(&self) -> f32 {
        match &self.body {
            Body::Unit(unit) => unit.progress,
            Body::Structure(_) => 0.0,
        }
    }

    /// Whether the entity still takes part in gameplay.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the entity accepts damage.
    #[must_use]
    pub const fn is_damageable(&self) -> bool {
        self.damageable
    }

    /// Whether the special state is active: hasted units, disabled structures.
    #[must_use]
    pub const fn special_active(&self) -> bool {
        self.special_active
    }

    /// Travel speed in cells per second, including the haste bonus.
    #[must_use]
    pub fn speed(&self) -> f32 {
        match &self.body {
            Body::Unit(unit) if self.special_active => unit.stats.speed * HASTE_MULTIPLIER,
            Body::Unit(unit) => unit.stats.speed,
            Body::Structure(_) => 0.0,
        }
    }

    /// State an authority publishes for this entity.
    #[must_use]
    pub fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState {
            progress: self.progress(),
            damageable: self.damageable,
            special_active: self.special_active,
            health: self.health.current(),
        }
    }

    /// Read-only snapshot used by targeting systems.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            kind: self.kind(),
            cell: self.cell(),
            progress: self.progress(),
            health: self.health,
            authoritative: self.authority.is_authority(),
        }
    }

    /// Cooldown readiness, for structures only.
    #[must_use]
    pub fn cooldown_snapshot(&self) -> Option<StructureCooldownSnapshot> {
        match &self.body {
            Body::Structure(structure) => Some(StructureCooldownSnapshot {
                structure: self.id,
                ready_in: structure.cooldown,
                disabled: self.special_active,
            }),
            Body::Unit(_) => None,
        }
    }

    /// Reports whether `model` may mutate this entity.
    #[must_use]
    pub fn authorize(&self, model: &AuthorityModel) -> bool {
        self.alive && model.permits(&self.authority)
    }

    /// Applies damage, saturating health at zero.
    ///
    /// Non-positive magnitudes are rejected and logged. Requests from a
    /// participant without authority, or against a dead or invulnerable
    /// entity, are ignored.
    pub fn apply_damage(&mut self, model: &AuthorityModel, amount: i32) -> DamageOutcome {
        if amount <= 0 {
            warn!(
                "rejected non-positive damage {amount} against entity {:?}",
                self.id
            );
            return DamageOutcome::Rejected;
        }

        if !self.authorize(model) {
            return DamageOutcome::Ignored;
        }

        if !self.damageable {
            debug!("entity {:?} is not damageable", self.id);
            return DamageOutcome::Ignored;
        }

        let removed = self.health.damage(amount.unsigned_abs());
        let killed = self.health.is_depleted();
        if killed {
            self.alive = false;
        }

        DamageOutcome::Applied {
            amount: removed,
            health: self.health.current(),
            killed,
        }
    }

    /// Restores health, saturating at the maximum.
    pub fn heal(&mut self, model: &AuthorityModel, amount: i32) -> HealOutcome {
        if amount <= 0 {
            warn!(
                "rejected non-positive heal {amount} for entity {:?}",
                self.id
            );
            return HealOutcome::Rejected;
        }

        if !self.authorize(model) {
            return HealOutcome::Ignored;
        }

        let _ = self.health.heal(amount.unsigned_abs());
        HealOutcome::Applied {
            health: self.health.current(),
        }
    }

    /// Sets the special state. Returns the new value when it changed.
    pub fn set_special(&mut self, model: &AuthorityModel, active: bool) -> Option<bool> {
        if !self.authorize(model) || self.special_active == active {
            return None;
        }
        self.special_active = active;
        Some(active)
    }

    /// Sets the damageable flag. Returns the new value when it changed.
    pub fn set_damageable(&mut self, model: &AuthorityModel, damageable: bool) -> Option<bool> {
        if !self.authorize(model) || self.damageable == damageable {
            return None;
        }
        self.damageable = damageable;
        Some(damageable)
    }

    /// Advances a unit's travel progress by `delta` cells.
    pub fn advance_progress(
        &mut self,
        model: &AuthorityModel,
        delta: f32,
        flow: &FlowField,
    ) -> TravelOutcome {
        if !self.authorize(model) {
            return TravelOutcome::Ignored;
        }

        if !delta.is_finite() || delta < 0.0 {
            warn!("rejected progress delta {delta} for entity {:?}", self.id);
            return TravelOutcome::Ignored;
        }

        let Body::Unit(unit) = &mut self.body else {
            return TravelOutcome::Ignored;
        };

        unit.progress += delta;
        let reached = unit.sync_cell(flow);
        self.position = unit.position(flow);

        if reached {
            TravelOutcome::ReachedGoal
        } else {
            TravelOutcome::Travelling
        }
    }

    /// Moves a replica's displayed progress toward the last received snapshot.
    pub fn smooth(&mut self, model: &AuthorityModel, dt: Duration, flow: &FlowField) {
        if !self.alive || model.permits(&self.authority) {
            return;
        }

        if let Body::Unit(unit) = &mut self.body {
            unit.progress = unit.smoother.advance(dt);
            let _ = unit.sync_cell(flow);
            self.position = unit.position(flow);
        }
    }

    /// Applies a snapshot received from the authority.
    ///
    /// Discrete fields apply immediately and report edge-triggered effects.
    /// Progress is handed to the smoother, which catches up over one publish
    /// period.
    pub fn apply_snapshot(
        &mut self,
        model: &AuthorityModel,
        snapshot: ReplicatedState,
        publish_period: Duration,
    ) -> ReplicaEffects {
        if !self.alive || model.permits(&self.authority) {
            return ReplicaEffects::default();
        }

        let mut effects = self.apply_replicated_health(snapshot.health);

        if self.special_active != snapshot.special_active {
            self.special_active = snapshot.special_active;
            effects.special = Some(snapshot.special_active);
        }

        if self.damageable != snapshot.damageable {
            self.damageable = snapshot.damageable;
            effects.damageable = Some(snapshot.damageable);
        }

        if let Body::Unit(unit) = &mut self.body {
            unit.smoother.receive(snapshot.progress, publish_period);
        }

        self.authority.remember(snapshot);
        effects
    }

    /// Applies a health value mirrored from the authority.
    pub fn mirror_health(&mut self, model: &AuthorityModel, health: u32) -> ReplicaEffects {
        if !self.alive || model.permits(&self.authority) {
            return ReplicaEffects::default();
        }
        self.apply_replicated_health(health)
    }

    fn apply_replicated_health(&mut self, health: u32) -> ReplicaEffects {
        let previous = self.health.current();
        self.health.set_current(health);
        let current = self.health.current();

        ReplicaEffects {
            damaged: (current < previous).then_some((previous, current)),
            ..ReplicaEffects::default()
        }
    }

    pub(crate) fn publish_due(&mut self, dt: Duration, period: Duration) -> Option<ReplicatedState> {
        if !self.alive || !self.authority.publish_due(dt, period) {
            return None;
        }
        let state = self.replicated_state();
        self.authority.remember(state);
        Some(state)
    }

    pub(crate) fn cool_down(&mut self, dt: Duration) {
        if let Body::Structure(structure) = &mut self.body {
            structure.cooldown = structure.cooldown.saturating_sub(dt);
        }
    }

    /// Consumes the cooldown and reports the damage of the shot.
    ///
    /// Cooldowns are local state: every participant runs them for every
    /// structure, while the shot's damage only lands where the target's
    /// authority lives.
    pub(crate) fn try_fire(&mut self) -> Option<u32> {
        if !self.alive || self.special_active {
            return None;
        }
        let Body::Structure(structure) = &mut self.body else {
            return None;
        };
        if !structure.cooldown.is_zero() {
            return None;
        }
        structure.cooldown = structure.stats.cooldown;
        Some(structure.stats.damage)
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }

    pub(crate) fn replace_special_timer(&mut self, timer: Option<TimerId>) -> Option<TimerId> {
        std::mem::replace(&mut self.special_timer, timer)
    }

    pub(crate) fn replace_damageable_timer(&mut self, timer: Option<TimerId>) -> Option<TimerId> {
        std::mem::replace(&mut self.damageable_timer, timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{classify, TileMap};
    use duel_defence_core::{ParticipantId, TargetingPolicy};

    const LOCAL: ParticipantId = ParticipantId::new(1);
    const REMOTE: ParticipantId = ParticipantId::new(2);
    const PERIOD: Duration = Duration::from_millis(100);

    fn model() -> AuthorityModel {
        AuthorityModel::new(LOCAL, LOCAL)
    }

    fn flow() -> FlowField {
        let grid = classify(&TileMap::from_rows(["S###G"])).expect("valid map");
        FlowField::build(&grid).expect("valid field")
    }

    fn unit(authority: ParticipantId) -> Entity {
        Entity::unit(
            EntityId::new(authority, 0),
            BoardId::new(0),
            UnitKind::new(0),
            UnitStats {
                health: 10,
                speed: 1.0,
                leak_damage: 1,
                bounty: 0,
            },
            0,
            CellCoord::new(0, 0),
            model().record_for(authority),
        )
    }

    fn structure() -> Entity {
        Entity::structure(
            EntityId::new(LOCAL, 1),
            BoardId::new(0),
            StructureKind::new(0),
            StructureStats {
                health: 50,
                damage: 4,
                cooldown: Duration::from_millis(500),
                radius: 2.0,
                cost: 10,
                targeting: TargetingPolicy::Closest,
            },
            CellCoord::new(1, 1),
            model().record_for(LOCAL),
        )
    }

    #[test]
    fn damage_saturates_and_kills() {
        let mut entity = unit(LOCAL);
        assert_eq!(
            entity.apply_damage(&model(), 4),
            DamageOutcome::Applied {
                amount: 4,
                health: 6,
                killed: false,
            }
        );
        assert_eq!(
            entity.apply_damage(&model(), 40),
            DamageOutcome::Applied {
                amount: 6,
                health: 0,
                killed: true,
            }
        );
        assert!(!entity.is_alive());
        assert_eq!(entity.apply_damage(&model(), 1), DamageOutcome::Ignored);
    }

    #[test]
    fn non_positive_damage_is_rejected() {
        let mut entity = unit(LOCAL);
        assert_eq!(entity.apply_damage(&model(), 0), DamageOutcome::Rejected);
        assert_eq!(entity.apply_damage(&model(), -3), DamageOutcome::Rejected);
        assert_eq!(entity.heal(&model(), 0), HealOutcome::Rejected);
        assert_eq!(entity.health().current(), 10);
    }

    #[test]
    fn non_authority_mutations_leave_state_unchanged() {
        let flow = flow();
        let mut entity = unit(REMOTE);
        let before = entity.clone();

        assert_eq!(entity.apply_damage(&model(), 3), DamageOutcome::Ignored);
        assert_eq!(entity.heal(&model(), 3), HealOutcome::Ignored);
        assert_eq!(entity.set_special(&model(), true), None);
        assert_eq!(entity.set_damageable(&model(), false), None);
        assert_eq!(
            entity.advance_progress(&model(), 2.0, &flow),
            TravelOutcome::Ignored
        );

        assert_eq!(entity, before);
    }

    #[test]
    fn invulnerable_entities_ignore_damage() {
        let mut entity = unit(LOCAL);
        assert_eq!(entity.set_damageable(&model(), false), Some(false));
        assert_eq!(entity.apply_damage(&model(), 5), DamageOutcome::Ignored);
        assert_eq!(entity.health().current(), 10);
    }

    #[test]
    fn progress_walks_the_flow_field() {
        let flow = flow();
        let mut entity = unit(LOCAL);

        assert_eq!(
            entity.advance_progress(&model(), 1.5, &flow),
            TravelOutcome::Travelling
        );
        assert_eq!(entity.cell(), CellCoord::new(1, 0));
        assert!((entity.position().x - 2.0).abs() < 1e-5);

        assert_eq!(
            entity.advance_progress(&model(), 2.5, &flow),
            TravelOutcome::ReachedGoal
        );
        assert_eq!(entity.cell(), CellCoord::new(4, 0));
    }

    #[test]
    fn haste_doubles_speed() {
        let mut entity = unit(LOCAL);
        assert_eq!(entity.speed(), 1.0);
        let _ = entity.set_special(&model(), true);
        assert_eq!(entity.speed(), 2.0);
    }

    #[test]
    fn snapshot_applies_discrete_fields_with_edges() {
        let flow = flow();
        let mut replica = unit(REMOTE);
        let effects = replica.apply_snapshot(
            &model(),
            ReplicatedState {
                progress: 2.0,
                damageable: false,
                special_active: true,
                health: 7,
            },
            PERIOD,
        );

        assert_eq!(effects.damaged, Some((10, 7)));
        assert_eq!(effects.special, Some(true));
        assert_eq!(effects.damageable, Some(false));
        assert_eq!(replica.progress(), 0.0, "progress is smoothed, not snapped");

        replica.smooth(&model(), PERIOD, &flow);
        assert!((replica.progress() - 2.0).abs() < 1e-5);
        assert_eq!(replica.cell(), CellCoord::new(2, 0));

        let repeat = replica.apply_snapshot(
            &model(),
            ReplicatedState {
                progress: 2.0,
                damageable: false,
                special_active: true,
                health: 7,
            },
            PERIOD,
        );
        assert!(repeat.is_empty());
    }

    #[test]
    fn snapshots_do_not_override_the_authority() {
        let mut entity = unit(LOCAL);
        let effects = entity.apply_snapshot(
            &model(),
            ReplicatedState {
                progress: 3.0,
                damageable: true,
                special_active: false,
                health: 1,
            },
            PERIOD,
        );
        assert!(effects.is_empty());
        assert_eq!(entity.health().current(), 10);
    }

    #[test]
    fn authority_publishes_on_period() {
        let mut entity = unit(LOCAL);
        assert!(entity.publish_due(Duration::from_millis(50), PERIOD).is_none());
        let state = entity
            .publish_due(Duration::from_millis(50), PERIOD)
            .expect("publication due");
        assert_eq!(state.health, 10);
        assert_eq!(entity.authority().last_published(), Some(state));
    }

    #[test]
    fn structure_fires_on_cooldown() {
        let mut structure = structure();
        assert_eq!(structure.try_fire(), Some(4));
        assert_eq!(structure.try_fire(), None);
        structure.cool_down(Duration::from_millis(499));
        assert_eq!(structure.try_fire(), None);
        structure.cool_down(Duration::from_millis(1));
        assert_eq!(structure.try_fire(), Some(4));
    }

    #[test]
    fn disabled_structure_holds_fire() {
        let mut structure = structure();
        let _ = structure.set_special(&model(), true);
        assert_eq!(structure.try_fire(), None);
        assert_eq!(
            structure.cooldown_snapshot().map(|snapshot| snapshot.disabled),
            Some(true)
        );
    }
}
