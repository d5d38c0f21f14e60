//! Explicit lookup of the boards held by one participant.

use std::collections::BTreeMap;

use duel_defence_core::{BoardError, BoardId, Catalog, Command, Event, ParticipantId};
use log::warn;

use crate::{apply, authority::AuthorityModel, grid::TileMap, Board, BoardConfig};

/// Boards known to the local participant, keyed by board identifier.
///
/// Every participant holds a copy of every board in the match. The registry
/// is handed to systems and adapters explicitly instead of being reachable
/// through global state.
#[derive(Debug)]
pub struct BoardRegistry {
    authority: AuthorityModel,
    boards: BTreeMap<BoardId, Board>,
}

impl BoardRegistry {
    /// Creates an empty registry for the local participant.
    #[must_use]
    pub fn new(authority: AuthorityModel) -> Self {
        Self {
            authority,
            boards: BTreeMap::new(),
        }
    }

    /// Authority model shared by every board in the registry.
    #[must_use]
    pub const fn authority(&self) -> AuthorityModel {
        self.authority
    }

    /// Builds a board defended by `owner` and registers it under `id`.
    ///
    /// An existing board with the same identifier is replaced.
    pub fn create(
        &mut self,
        id: BoardId,
        owner: ParticipantId,
        map: &TileMap,
        catalog: Catalog,
        config: BoardConfig,
    ) -> Result<(), BoardError> {
        let board = Board::new(id, owner, map, catalog, config, self.authority)?;
        if self.boards.insert(id, board).is_some() {
            warn!("board {id:?} was replaced");
        }
        Ok(())
    }

    /// Board registered under `id`.
    #[must_use]
    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.boards.get(&id)
    }

    /// Identifiers of every registered board in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = BoardId> + '_ {
        self.boards.keys().copied()
    }

    /// Every registered board in ascending identifier order.
    pub fn boards(&self) -> impl Iterator<Item = &Board> + '_ {
        self.boards.values()
    }

    /// Board defended by the provided participant.
    #[must_use]
    pub fn board_of(&self, owner: ParticipantId) -> Option<BoardId> {
        self.boards
            .iter()
            .find(|(_, board)| board.owner == owner)
            .map(|(id, _)| *id)
    }

    /// First board other than `id`, which in a duel is the opponent's.
    #[must_use]
    pub fn opponent_of(&self, id: BoardId) -> Option<BoardId> {
        self.boards.keys().copied().find(|candidate| *candidate != id)
    }

    /// Routes a command to the board registered under `id`.
    ///
    /// Returns `false` and logs a warning when no such board exists.
    pub fn apply(&mut self, id: BoardId, command: Command, out_events: &mut Vec<Event>) -> bool {
        let Some(board) = self.boards.get_mut(&id) else {
            warn!("dropping command for unknown board {id:?}");
            return false;
        };
        apply(board, command, out_events);
        true
    }
}
