//! Per-board entity collections with deferred removal.
//!
//! A [`LifecycleManager`] owns every entity of one kind on one board. Ticking
//! walks the collection in insertion order. Removal requested while a pass is
//! running is deferred until the pass completes, entities pending removal are
//! skipped for the rest of the pass, and entities created during the pass
//! join the collection only after it ends.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use duel_defence_core::{BoardId, EntityId, EntityKind, Removal, RemovalCause};
use glam::Vec2;
use log::{debug, warn};

use crate::entity::Entity;

/// Outcome of a destroy request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The entity left the collection immediately.
    Removed(Removal),
    /// The entity will leave the collection when the current or next pass ends.
    Deferred,
    /// A removal for the entity was already queued.
    AlreadyPending,
    /// The collection does not hold the entity.
    Missing,
}

/// Summary of the structural changes applied when a pass ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Removals applied, in request order. Each entity appears at most once.
    pub removals: Vec<Removal>,
    /// Entities that joined the collection after being created mid-pass.
    pub joined: Vec<EntityId>,
}

/// Handle passed to the per-entity callback during a pass.
#[derive(Debug)]
pub struct TickContext<'a> {
    dt: Duration,
    board: BoardId,
    kind: EntityKind,
    slots: &'a HashMap<EntityId, usize>,
    pending: &'a mut Vec<Removal>,
    staged: &'a mut Vec<Entity>,
}

impl TickContext<'_> {
    /// Simulated time covered by the pass.
    #[must_use]
    pub const fn dt(&self) -> Duration {
        self.dt
    }

    /// Queues removal of an entity; it is skipped for the rest of the pass.
    ///
    /// Returns `false` when a removal was already queued or the collection
    /// does not hold the entity.
    pub fn request_destroy(&mut self, entity: EntityId, cause: RemovalCause) -> bool {
        if !self.holds(entity) {
            warn!(
                "destroy requested mid-pass for unknown {:?} {entity:?} on board {:?}",
                self.kind, self.board
            );
            return false;
        }
        if self.is_pending(entity) {
            return false;
        }
        self.pending.push(Removal { entity, cause });
        true
    }

    /// Reports whether a removal for the entity is queued.
    #[must_use]
    pub fn is_pending(&self, entity: EntityId) -> bool {
        self.pending.iter().any(|removal| removal.entity == entity)
    }

    /// Stages a new entity that joins the collection once the pass ends.
    ///
    /// Identifiers already live or staged are refused.
    pub fn spawn(&mut self, entity: Entity) -> Option<EntityId> {
        let id = entity.id();
        if self.holds(id) {
            warn!(
                "refusing duplicate {:?} {id:?} staged on board {:?}",
                self.kind, self.board
            );
            return None;
        }
        self.staged.push(entity);
        Some(id)
    }

    fn holds(&self, entity: EntityId) -> bool {
        self.slots.contains_key(&entity) || self.staged.iter().any(|staged| staged.id() == entity)
    }
}

/// Owns the entities of one kind on one board.
#[derive(Clone, Debug)]
pub struct LifecycleManager {
    board: BoardId,
    kind: EntityKind,
    entities: Vec<Entity>,
    slots: HashMap<EntityId, usize>,
    pending: Vec<Removal>,
    staged: Vec<Entity>,
    active: usize,
}

impl LifecycleManager {
    /// Creates an empty collection for entities of `kind` on `board`.
    #[must_use]
    pub fn new(board: BoardId, kind: EntityKind) -> Self {
        Self {
            board,
            kind,
            entities: Vec::new(),
            slots: HashMap::new(),
            pending: Vec::new(),
            staged: Vec::new(),
            active: 0,
        }
    }

    /// Category of entity held by the collection.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Adds an entity to the collection. Duplicate identifiers are refused.
    pub fn spawn(&mut self, entity: Entity) -> Option<EntityId> {
        let id = entity.id();
        if self.slots.contains_key(&id) || self.staged.iter().any(|staged| staged.id() == id) {
            warn!(
                "refusing duplicate {:?} {id:?} on board {:?}",
                self.kind, self.board
            );
            return None;
        }
        let _ = self.slots.insert(id, self.entities.len());
        self.entities.push(entity);
        self.active += 1;
        Some(id)
    }

    /// Walks every live entity in insertion order, then applies deferred changes.
    ///
    /// Entities whose removal is pending when their turn comes are not
    /// visited. Each entity is visited at most once per pass.
    pub fn tick<F>(&mut self, dt: Duration, mut visit: F) -> PassReport
    where
        F: FnMut(&mut Entity, &mut TickContext<'_>),
    {
        let mut context = TickContext {
            dt,
            board: self.board,
            kind: self.kind,
            slots: &self.slots,
            pending: &mut self.pending,
            staged: &mut self.staged,
        };

        for entity in self.entities.iter_mut() {
            if context.is_pending(entity.id()) {
                continue;
            }
            visit(entity, &mut context);
        }

        self.flush()
    }

    /// Handles a destroy request issued outside a pass.
    ///
    /// Non-immediate requests are always deferred to the end of the next
    /// pass, or to an explicit [`flush`](Self::flush).
    pub fn request_destroy(
        &mut self,
        entity: EntityId,
        immediate: bool,
        cause: RemovalCause,
    ) -> DestroyOutcome {
        if !self.contains(entity) {
            warn!(
                "destroy requested for unknown {:?} {entity:?} on board {:?}",
                self.kind, self.board
            );
            return DestroyOutcome::Missing;
        }

        if self.is_pending(entity) {
            return DestroyOutcome::AlreadyPending;
        }

        let removal = Removal { entity, cause };
        if !immediate {
            self.pending.push(removal);
            return DestroyOutcome::Deferred;
        }

        if let Some(position) = self.staged.iter().position(|staged| staged.id() == entity) {
            let _ = self.staged.remove(position);
            return DestroyOutcome::Removed(removal);
        }

        if let Some(slot) = self.slots.get(&entity).copied() {
            let _ = self.entities.remove(slot);
            self.release();
            self.reindex();
        }
        DestroyOutcome::Removed(removal)
    }

    /// Applies queued removals, then lets staged entities join.
    pub fn flush(&mut self) -> PassReport {
        let requested = std::mem::take(&mut self.pending);
        let mut removals = Vec::with_capacity(requested.len());
        let mut gone = HashSet::with_capacity(requested.len());

        for removal in requested {
            if let Some(position) = self
                .staged
                .iter()
                .position(|staged| staged.id() == removal.entity)
            {
                let _ = self.staged.remove(position);
                removals.push(removal);
            } else if self.slots.contains_key(&removal.entity) && gone.insert(removal.entity) {
                self.release();
                removals.push(removal);
            }
        }

        if !gone.is_empty() {
            self.entities.retain(|entity| !gone.contains(&entity.id()));
        }

        let mut joined = Vec::with_capacity(self.staged.len());
        for entity in self.staged.drain(..) {
            joined.push(entity.id());
            self.entities.push(entity);
            self.active += 1;
        }

        if !gone.is_empty() || !joined.is_empty() {
            self.reindex();
        }

        if !removals.is_empty() {
            debug!(
                "board {:?} removed {} {:?} entities",
                self.board,
                removals.len(),
                self.kind
            );
        }

        PassReport { removals, joined }
    }

    /// Reports whether the collection holds the entity, including staged ones.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.slots.contains_key(&entity) || self.staged.iter().any(|staged| staged.id() == entity)
    }

    /// Reports whether a removal for the entity is queued.
    #[must_use]
    pub fn is_pending(&self, entity: EntityId) -> bool {
        self.pending.iter().any(|removal| removal.entity == entity)
    }

    /// Entity with the provided identifier, unless it is still staged.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&Entity> {
        self.slots
            .get(&entity)
            .and_then(|slot| self.entities.get(*slot))
    }

    pub(crate) fn get_mut(&mut self, entity: EntityId) -> Option<&mut Entity> {
        let slot = *self.slots.get(&entity)?;
        self.entities.get_mut(slot)
    }

    /// Live entities in insertion order, excluding those pending removal.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities
            .iter()
            .filter(move |entity| entity.is_alive() && !self.is_pending(entity.id()))
    }

    /// Number of entities that joined and have not yet been removed.
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active
    }

    /// Live entities within `radius` cells of `center`, nearest first.
    ///
    /// Ties are broken by identifier. A negative or non-finite radius yields
    /// no entities.
    #[must_use]
    pub fn within_radius(&self, center: Vec2, radius: f32) -> Vec<&Entity> {
        if !radius.is_finite() || radius < 0.0 {
            warn!("ignoring range query with radius {radius}");
            return Vec::new();
        }

        let mut found: Vec<(f32, &Entity)> = self
            .iter()
            .map(|entity| (entity.position().distance(center), entity))
            .filter(|(distance, _)| *distance <= radius)
            .collect();
        found.sort_by(|(left_distance, left), (right_distance, right)| {
            left_distance
                .total_cmp(right_distance)
                .then_with(|| left.id().cmp(&right.id()))
        });
        found.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Live entity within `radius` that is closest to `center`.
    #[must_use]
    pub fn closest(&self, center: Vec2, radius: f32) -> Option<&Entity> {
        self.within_radius(center, radius).into_iter().next()
    }

    /// Live entity within `radius` of `center` that travelled the furthest.
    #[must_use]
    pub fn most_progressed(&self, center: Vec2, radius: f32) -> Option<&Entity> {
        self.within_radius(center, radius)
            .into_iter()
            .min_by(|left, right| {
                right
                    .progress()
                    .total_cmp(&left.progress())
                    .then_with(|| left.id().cmp(&right.id()))
            })
    }

    fn release(&mut self) {
        match self.active.checked_sub(1) {
            Some(active) => self.active = active,
            None => warn!(
                "active {:?} count underflow on board {:?}",
                self.kind, self.board
            ),
        }
    }

    fn reindex(&mut self) {
        self.slots.clear();
        for (slot, entity) in self.entities.iter().enumerate() {
            let _ = self.slots.insert(entity.id(), slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::AuthorityModel;
    use duel_defence_core::{CellCoord, ParticipantId, UnitKind, UnitStats};

    const LOCAL: ParticipantId = ParticipantId::new(1);
    const BOARD: BoardId = BoardId::new(0);
    const DT: Duration = Duration::from_millis(100);

    fn unit(serial: u32, cell: CellCoord) -> Entity {
        let model = AuthorityModel::new(LOCAL, LOCAL);
        Entity::unit(
            EntityId::new(LOCAL, serial),
            BOARD,
            UnitKind::new(0),
            UnitStats {
                health: 10,
                speed: 1.0,
                leak_damage: 1,
                bounty: 0,
            },
            0,
            cell,
            model.record_for(LOCAL),
        )
    }

    fn manager(count: u32) -> LifecycleManager {
        let mut manager = LifecycleManager::new(BOARD, EntityKind::Unit);
        for serial in 0..count {
            let _ = manager.spawn(unit(serial, CellCoord::new(serial, 0)));
        }
        manager
    }

    fn id(serial: u32) -> EntityId {
        EntityId::new(LOCAL, serial)
    }

    #[test]
    fn destroy_during_pass_skips_the_target() {
        let mut manager = manager(3);
        let mut visits: HashMap<EntityId, u32> = HashMap::new();

        let report = manager.tick(DT, |entity, context| {
            *visits.entry(entity.id()).or_default() += 1;
            if entity.id() == id(0) {
                assert!(context.request_destroy(id(1), RemovalCause::Destroyed));
                assert!(!context.request_destroy(id(1), RemovalCause::Destroyed));
            }
        });

        assert_eq!(visits.get(&id(0)), Some(&1));
        assert_eq!(visits.get(&id(1)), None);
        assert_eq!(visits.get(&id(2)), Some(&1));
        assert_eq!(
            report.removals,
            vec![Removal {
                entity: id(1),
                cause: RemovalCause::Destroyed,
            }]
        );
        assert_eq!(manager.active_count(), 2);
        assert!(manager.get(id(1)).is_none());
        assert_eq!(manager.get(id(2)).map(Entity::id), Some(id(2)));
    }

    #[test]
    fn self_destroy_is_applied_after_the_pass() {
        let mut manager = manager(2);
        let report = manager.tick(DT, |entity, context| {
            let _ = context.request_destroy(entity.id(), RemovalCause::Killed);
            assert!(context.is_pending(entity.id()));
        });
        assert_eq!(report.removals.len(), 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.iter().count(), 0);
    }

    #[test]
    fn spawned_entities_join_after_the_pass() {
        let mut manager = manager(1);
        let mut visited = Vec::new();

        let report = manager.tick(DT, |entity, context| {
            visited.push(entity.id());
            let _ = context.spawn(unit(9, CellCoord::new(3, 3)));
        });

        assert_eq!(visited, vec![id(0)]);
        assert_eq!(report.joined, vec![id(9)]);
        assert_eq!(manager.active_count(), 2);

        visited.clear();
        let _ = manager.tick(DT, |entity, _| visited.push(entity.id()));
        assert_eq!(visited, vec![id(0), id(9)]);
    }

    #[test]
    fn staging_a_live_id_is_refused() {
        let mut manager = manager(1);
        let mut staged = Vec::new();

        let report = manager.tick(DT, |_, context| {
            staged.push(context.spawn(unit(0, CellCoord::new(4, 4))));
            staged.push(context.spawn(unit(6, CellCoord::new(4, 4))));
            staged.push(context.spawn(unit(6, CellCoord::new(5, 5))));
        });

        assert_eq!(staged, vec![None, Some(id(6)), None]);
        assert_eq!(report.joined, vec![id(6)]);
        assert_eq!(manager.active_count(), 2);
        let order: Vec<_> = manager.iter().map(Entity::id).collect();
        assert_eq!(order, vec![id(0), id(6)]);
    }

    #[test]
    fn destroying_an_unknown_id_mid_pass_is_rejected() {
        let mut manager = manager(2);
        let mut queued = Vec::new();

        let report = manager.tick(DT, |entity, context| {
            if entity.id() == id(0) {
                queued.push(context.request_destroy(id(99), RemovalCause::Destroyed));
                queued.push(context.is_pending(id(99)));
            }
        });

        assert_eq!(queued, vec![false, false]);
        assert!(report.removals.is_empty());
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn non_immediate_destroy_is_deferred() {
        let mut manager = manager(2);
        assert_eq!(
            manager.request_destroy(id(0), false, RemovalCause::Destroyed),
            DestroyOutcome::Deferred
        );
        assert_eq!(
            manager.request_destroy(id(0), true, RemovalCause::Destroyed),
            DestroyOutcome::AlreadyPending
        );
        assert_eq!(manager.iter().count(), 1);
        assert_eq!(manager.active_count(), 2);

        let report = manager.flush();
        assert_eq!(report.removals.len(), 1);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn immediate_destroy_keeps_order() {
        let mut manager = manager(3);
        assert_eq!(
            manager.request_destroy(id(1), true, RemovalCause::Remote),
            DestroyOutcome::Removed(Removal {
                entity: id(1),
                cause: RemovalCause::Remote,
            })
        );
        let order: Vec<_> = manager.iter().map(Entity::id).collect();
        assert_eq!(order, vec![id(0), id(2)]);
        assert_eq!(manager.get(id(2)).map(Entity::id), Some(id(2)));
    }

    #[test]
    fn unknown_entities_are_reported_missing() {
        let mut manager = manager(1);
        assert_eq!(
            manager.request_destroy(id(7), true, RemovalCause::Destroyed),
            DestroyOutcome::Missing
        );
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut manager = manager(1);
        assert_eq!(manager.spawn(unit(0, CellCoord::new(5, 5))), None);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn range_queries_break_ties_by_id() {
        let mut manager = LifecycleManager::new(BOARD, EntityKind::Unit);
        let _ = manager.spawn(unit(4, CellCoord::new(2, 1)));
        let _ = manager.spawn(unit(3, CellCoord::new(0, 1)));
        let _ = manager.spawn(unit(5, CellCoord::new(6, 6)));

        let center = Vec2::new(1.5, 1.5);
        let found: Vec<_> = manager
            .within_radius(center, 1.0)
            .into_iter()
            .map(Entity::id)
            .collect();
        assert_eq!(found, vec![id(3), id(4)]);
        assert_eq!(manager.closest(center, 1.0).map(Entity::id), Some(id(3)));
        assert_eq!(
            manager.most_progressed(center, 1.0).map(Entity::id),
            Some(id(3))
        );
    }

    #[test]
    fn negative_radius_returns_nothing() {
        let manager = manager(2);
        assert!(manager.within_radius(Vec2::ZERO, -1.0).is_empty());
        assert!(manager.closest(Vec2::ZERO, f32::NAN).is_none());
    }
}
