#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that turns target assignments into firing orders.
//!
//! It runs on every copy of a board. Whether a shot's damage lands is decided
//! by the world, which only mutates units whose authority is local.

use duel_defence_core::{
    Command, EntityId, StructureCooldownSnapshot, StructureCooldownView, StructureTarget,
};

/// Structure combat system that queues firing commands for ready structures.
#[derive(Debug, Default)]
pub struct TowerCombat {
    scratch: Vec<Command>,
}

impl TowerCombat {
    /// Creates a new combat system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `Command::FireStructure` entries for structures ready to fire.
    ///
    /// Structures that are still cooling down, disabled, or missing from the
    /// cooldown view are skipped.
    pub fn handle(
        &mut self,
        cooldowns: StructureCooldownView,
        targets: &[StructureTarget],
        out: &mut Vec<Command>,
    ) {
        if targets.is_empty() {
            return;
        }

        let cooldowns = cooldowns.into_vec();
        if cooldowns.is_empty() {
            return;
        }

        self.scratch.clear();

        for target in targets {
            let Some(snapshot) = find_cooldown(&cooldowns, target.structure) else {
                continue;
            };
            if snapshot.ready_in.is_zero() && !snapshot.disabled {
                self.scratch.push(Command::FireStructure {
                    structure: target.structure,
                    target: target.unit,
                });
            }
        }

        if self.scratch.is_empty() {
            return;
        }

        out.reserve(self.scratch.len());
        out.append(&mut self.scratch);
    }
}

fn find_cooldown(
    cooldowns: &[StructureCooldownSnapshot],
    structure: EntityId,
) -> Option<&StructureCooldownSnapshot> {
    cooldowns
        .binary_search_by_key(&structure, |snapshot| snapshot.structure)
        .ok()
        .map(|index| &cooldowns[index])
}
