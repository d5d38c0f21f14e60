#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Replication system that bridges board events and transport invocations.
//!
//! The [`Publisher`] turns the events an authoritative board copy emits into
//! outbound [`Invocation`]s. [`dispatch`] turns inbound invocations into the
//! world commands that mirror them on the receiving participant.

use std::collections::BTreeMap;

use duel_defence_core::{
    BoardId, Command, Direction, EntityId, Event, Invocation, ParticipantId, Procedure,
    RemovalCause, TargetScope,
};
use duel_defence_world::{query, Board};
use log::{debug, trace};

/// Names of every procedure with an inbound handler.
pub const HANDLED_PROCEDURES: [&str; 6] = [
    "instantiate",
    "start_wave",
    "damaged",
    "destroy",
    "publish_state",
    "leaked",
];

/// Work requested by an inbound invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Command to apply to the local copy of a board.
    Board {
        /// Board the command targets.
        board: BoardId,
        /// Mirroring command.
        command: Command,
    },
    /// Start the wave at the index on the local wave scheduler.
    StartWave {
        /// Index into the wave table.
        index: usize,
    },
}

/// Converts an inbound invocation into local work.
#[must_use]
pub fn dispatch(invocation: &Invocation) -> Inbound {
    trace!(
        "dispatching {} from {:?}",
        invocation.procedure.name(),
        invocation.sender
    );

    match invocation.procedure {
        Procedure::Instantiate {
            entity,
            prefab,
            position,
            payload,
            ..
        } => Inbound::Board {
            board: payload.owner_board,
            command: Command::Admit {
                entity,
                prefab,
                cell: position,
                payload,
            },
        },
        Procedure::StartWave { index } => Inbound::StartWave { index },
        Procedure::Damaged {
            entity,
            board,
            health,
            ..
        } => Inbound::Board {
            board,
            command: Command::MirrorHealth { entity, health },
        },
        Procedure::Destroy { entity, board } => Inbound::Board {
            board,
            command: Command::MirrorDestroy { entity },
        },
        Procedure::PublishState {
            entity,
            board,
            snapshot,
        } => Inbound::Board {
            board,
            command: Command::MirrorSnapshot { entity, snapshot },
        },
        Procedure::Leaked {
            entity,
            board,
            amount,
        } => Inbound::Board {
            board,
            command: Command::MirrorLeak { entity, amount },
        },
    }
}

/// Maps authoritative board events to outbound invocations.
#[derive(Debug, Default)]
pub struct Publisher {
    published: BTreeMap<&'static str, u64>,
}

impl Publisher {
    /// Creates a publisher with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations issued for the named procedure.
    #[must_use]
    pub fn published(&self, procedure: &str) -> u64 {
        self.published.get(procedure).copied().unwrap_or(0)
    }

    /// Translates the events `board` emitted this frame into invocations.
    ///
    /// Only effects decided locally are published: removals that mirror a
    /// remote decision and leak removals (covered by `UnitLeaked`) are
    /// skipped, so a mirrored effect is never echoed back.
    pub fn handle(&mut self, board: &Board, events: &[Event], out: &mut Vec<Invocation>) {
        let board_id = query::board_id(board);
        let sender = query::authority(board).local();
        let start = out.len();

        for event in events {
            match event {
                Event::EntitySpawned {
                    entity,
                    prefab,
                    cell,
                    payload,
                } => {
                    let rotation = query::flow_field(board)
                        .direction(*cell)
                        .unwrap_or(Direction::North);
                    out.push(Invocation::new(
                        sender,
                        TargetScope::Others,
                        Procedure::Instantiate {
                            entity: *entity,
                            prefab: *prefab,
                            position: *cell,
                            rotation,
                            payload: *payload,
                        },
                    ));
                }
                Event::EntityDamaged {
                    entity,
                    amount,
                    health,
                } => out.push(Invocation::new(
                    sender,
                    TargetScope::Others,
                    Procedure::Damaged {
                        entity: *entity,
                        board: board_id,
                        amount: *amount,
                        health: *health,
                    },
                )),
                Event::EntityRemoved { removal } => {
                    publish_removal(sender, board_id, removal.entity, removal.cause, out);
                }
                Event::EntitiesRemoved { removals } => {
                    for removal in removals {
                        publish_removal(sender, board_id, removal.entity, removal.cause, out);
                    }
                }
                Event::UnitLeaked { entity, amount } => out.push(Invocation::new(
                    sender,
                    TargetScope::Others,
                    Procedure::Leaked {
                        entity: *entity,
                        board: board_id,
                        amount: *amount,
                    },
                )),
                Event::SnapshotDue { entity, snapshot } => out.push(Invocation::new(
                    sender,
                    TargetScope::Others,
                    Procedure::PublishState {
                        entity: *entity,
                        board: board_id,
                        snapshot: *snapshot,
                    },
                )),
                _ => {}
            }
        }

        for invocation in &out[start..] {
            *self.published.entry(invocation.procedure.name()).or_insert(0) += 1;
        }
        if out.len() > start {
            debug!(
                "board {board_id:?} queued {} invocations",
                out.len() - start
            );
        }
    }
}

fn publish_removal(
    sender: ParticipantId,
    board: BoardId,
    entity: EntityId,
    cause: RemovalCause,
    out: &mut Vec<Invocation>,
) {
    match cause {
        RemovalCause::Killed | RemovalCause::Destroyed => out.push(Invocation::new(
            sender,
            TargetScope::Others,
            Procedure::Destroy { entity, board },
        )),
        RemovalCause::Leaked | RemovalCause::Remote => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_defence_core::{CellCoord, OwnerPayload, Prefab, ReplicatedState, UnitKind};

    const HOST: ParticipantId = ParticipantId::new(1);
    const BOARD: BoardId = BoardId::new(1);

    fn invocation(procedure: Procedure) -> Invocation {
        Invocation::new(HOST, TargetScope::Others, procedure)
    }

    #[test]
    fn instantiate_routes_to_the_owner_board() {
        let entity = EntityId::new(HOST, 3);
        let payload = OwnerPayload {
            owner_board: BOARD,
            authority: HOST,
            path_index: 1,
        };

        let inbound = dispatch(&invocation(Procedure::Instantiate {
            entity,
            prefab: Prefab::Unit(UnitKind::new(0)),
            position: CellCoord::new(2, 0),
            rotation: Direction::South,
            payload,
        }));

        assert_eq!(
            inbound,
            Inbound::Board {
                board: BOARD,
                command: Command::Admit {
                    entity,
                    prefab: Prefab::Unit(UnitKind::new(0)),
                    cell: CellCoord::new(2, 0),
                    payload,
                },
            }
        );
    }

    #[test]
    fn mirrored_procedures_become_mirror_commands() {
        let entity = EntityId::new(HOST, 8);
        let snapshot = ReplicatedState {
            progress: 1.5,
            damageable: true,
            special_active: false,
            health: 4,
        };

        let cases = [
            (
                Procedure::Damaged {
                    entity,
                    board: BOARD,
                    amount: 2,
                    health: 4,
                },
                Command::MirrorHealth { entity, health: 4 },
            ),
            (
                Procedure::Destroy {
                    entity,
                    board: BOARD,
                },
                Command::MirrorDestroy { entity },
            ),
            (
                Procedure::PublishState {
                    entity,
                    board: BOARD,
                    snapshot,
                },
                Command::MirrorSnapshot { entity, snapshot },
            ),
            (
                Procedure::Leaked {
                    entity,
                    board: BOARD,
                    amount: 3,
                },
                Command::MirrorLeak { entity, amount: 3 },
            ),
        ];

        for (procedure, command) in cases {
            assert!(HANDLED_PROCEDURES.contains(&procedure.name()));
            assert_eq!(
                dispatch(&invocation(procedure)),
                Inbound::Board {
                    board: BOARD,
                    command
                }
            );
        }
    }

    #[test]
    fn start_wave_is_routed_to_the_scheduler() {
        let inbound = dispatch(&Invocation::new(
            HOST,
            TargetScope::All,
            Procedure::StartWave { index: 2 },
        ));
        assert_eq!(inbound, Inbound::StartWave { index: 2 });
    }
}
