#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that computes deterministic structure targets from lifecycle queries.

use duel_defence_core::{EntityId, StructureTarget, TargetingPolicy};
use duel_defence_world::{entity::Body, lifecycle::LifecycleManager};
use glam::Vec2;

/// Structure targeting system that reuses scratch buffers to avoid repeated allocations.
#[derive(Debug, Default)]
pub struct TowerTargeting {
    structure_workspace: Vec<StructureWorkspace>,
}

impl TowerTargeting {
    /// Creates a new targeting system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes targets for every structure able to fire.
    ///
    /// The output buffer is cleared before populating it with the latest
    /// assignments. Structures are visited in identifier order; each picks at
    /// most one unit according to its targeting policy, with ties broken by
    /// the smaller unit identifier.
    pub fn handle(
        &mut self,
        structures: &LifecycleManager,
        units: &LifecycleManager,
        out: &mut Vec<StructureTarget>,
    ) {
        out.clear();

        if structures.iter().next().is_none() || units.iter().next().is_none() {
            return;
        }

        self.prepare_structure_workspace(structures);
        if self.structure_workspace.is_empty() {
            return;
        }

        for structure in &self.structure_workspace {
            let chosen = match structure.policy {
                TargetingPolicy::Closest => units.closest(structure.center, structure.radius),
                TargetingPolicy::MostProgressed => {
                    units.most_progressed(structure.center, structure.radius)
                }
            };

            if let Some(unit) = chosen {
                out.push(StructureTarget {
                    structure: structure.id,
                    unit: unit.id(),
                });
            }
        }
    }

    fn prepare_structure_workspace(&mut self, structures: &LifecycleManager) {
        self.structure_workspace.clear();
        let (lower, _) = structures.iter().size_hint();
        self.structure_workspace.reserve(lower);

        for entity in structures.iter() {
            if entity.special_active() {
                continue;
            }
            let Body::Structure(state) = entity.body() else {
                continue;
            };
            let radius = state.stats().radius;
            if !radius.is_finite() || radius <= 0.0 {
                continue;
            }

            self.structure_workspace.push(StructureWorkspace {
                id: entity.id(),
                center: entity.position(),
                radius,
                policy: state.stats().targeting,
            });
        }

        self.structure_workspace.sort_by_key(|workspace| workspace.id);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct StructureWorkspace {
    id: EntityId,
    center: Vec2,
    radius: f32,
    policy: TargetingPolicy,
}
