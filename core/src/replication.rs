//! Replicated invocation contract consumed from the transport collaborator.
//!
//! Every state change that must be mirrored on the other participant is
//! expressed as a [`Procedure`] wrapped in an [`Invocation`] that names the
//! sender and the [`TargetScope`]. The transport is assumed to deliver
//! invocations in order and without loss, with arbitrary delay.

use serde::{Deserialize, Serialize};

use crate::{BoardId, CellCoord, Direction, EntityId, ParticipantId, Prefab, ReplicatedState};

/// Participants that receive an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetScope {
    /// Every participant, including the sender.
    All,
    /// Every participant except the sender.
    Others,
    /// Only the designated master participant.
    MasterOnly,
}

impl TargetScope {
    /// Reports whether `recipient` receives an invocation sent by `sender`.
    #[must_use]
    pub fn includes(
        self,
        sender: ParticipantId,
        recipient: ParticipantId,
        master: ParticipantId,
    ) -> bool {
        match self {
            Self::All => true,
            Self::Others => sender != recipient,
            Self::MasterOnly => recipient == master,
        }
    }
}

/// Ownership metadata carried by a replicated instantiate call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerPayload {
    /// Board the entity lives on.
    pub owner_board: BoardId,
    /// Participant authoritative for the entity.
    pub authority: ParticipantId,
    /// Index of the spawn cell the entity entered through; zero for structures.
    pub path_index: u32,
}

/// Procedures mirrored between participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Procedure {
    /// Creates a locally-owned instance of a logical entity on every recipient.
    Instantiate {
        /// Identifier allocated by the authority.
        entity: EntityId,
        /// Template to instantiate.
        prefab: Prefab,
        /// Cell where the entity appears.
        position: CellCoord,
        /// Facing of the entity when it appears.
        rotation: Direction,
        /// Ownership metadata.
        payload: OwnerPayload,
    },
    /// Starts the wave at the provided index.
    StartWave {
        /// Index into the wave table.
        index: usize,
    },
    /// Mirrors damage applied by the authority.
    Damaged {
        /// Entity that was damaged.
        entity: EntityId,
        /// Board holding the entity.
        board: BoardId,
        /// Damage applied.
        amount: u32,
        /// Health remaining after the damage.
        health: u32,
    },
    /// Mirrors the destruction of an entity.
    Destroy {
        /// Entity that was destroyed.
        entity: EntityId,
        /// Board holding the entity.
        board: BoardId,
    },
    /// Periodic state publication from the authority.
    PublishState {
        /// Entity the state describes.
        entity: EntityId,
        /// Board holding the entity.
        board: BoardId,
        /// Published state.
        snapshot: ReplicatedState,
    },
    /// Mirrors a unit reaching the goal.
    Leaked {
        /// Unit that reached the goal.
        entity: EntityId,
        /// Board holding the unit.
        board: BoardId,
        /// Lives the board owner loses.
        amount: u32,
    },
}

impl Procedure {
    /// Stable name used to key inbound handlers.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Instantiate { .. } => "instantiate",
            Self::StartWave { .. } => "start_wave",
            Self::Damaged { .. } => "damaged",
            Self::Destroy { .. } => "destroy",
            Self::PublishState { .. } => "publish_state",
            Self::Leaked { .. } => "leaked",
        }
    }
}

/// A procedure issued by one participant and mirrored to a scope of recipients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Participant that issued the procedure.
    pub sender: ParticipantId,
    /// Recipients of the procedure.
    pub scope: TargetScope,
    /// Procedure to execute.
    pub procedure: Procedure,
}

impl Invocation {
    /// Creates a new invocation.
    #[must_use]
    pub const fn new(sender: ParticipantId, scope: TargetScope, procedure: Procedure) -> Self {
        Self {
            sender,
            scope,
            procedure,
        }
    }
}

/// Ordered, reliable group-messaging channel with a designated master.
pub trait Transport {
    /// Error produced when an invocation cannot be handed to the channel.
    type Error;

    /// Queues an invocation for delivery to its scope.
    fn invoke(&mut self, invocation: &Invocation) -> Result<(), Self::Error>;

    /// Participant currently designated as master.
    fn master(&self) -> ParticipantId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_membership_follows_sender_and_master() {
        let one = ParticipantId::new(1);
        let two = ParticipantId::new(2);

        assert!(TargetScope::All.includes(one, one, one));
        assert!(!TargetScope::Others.includes(one, one, one));
        assert!(TargetScope::Others.includes(one, two, one));
        assert!(TargetScope::MasterOnly.includes(two, one, one));
        assert!(!TargetScope::MasterOnly.includes(one, two, one));
    }

    #[test]
    fn invocation_round_trips_through_bincode() {
        let invocation = Invocation::new(
            ParticipantId::new(2),
            TargetScope::Others,
            Procedure::PublishState {
                entity: EntityId::new(ParticipantId::new(2), 9),
                board: BoardId::new(1),
                snapshot: ReplicatedState {
                    progress: 3.25,
                    damageable: true,
                    special_active: false,
                    health: 17,
                },
            },
        );

        let bytes = bincode::serialize(&invocation).expect("serialize");
        let restored: Invocation = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, invocation);
        assert_eq!(restored.procedure.name(), "publish_state");
    }
}
