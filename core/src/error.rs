//! Configuration errors reported to callers of the board initialization and
//! wave contracts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CellCoord;

/// Reasons a tile map cannot be classified into cell roles.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GridError {
    /// The tile map contained no rows or no columns.
    #[error("tile map is empty")]
    EmptyGrid,
    /// A row's length differs from the first row's length.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based index of the offending row.
        row: u32,
        /// Number of cells in the first row.
        expected: u32,
        /// Number of cells found in the offending row.
        found: u32,
    },
    /// A glyph outside the tile table was encountered.
    #[error("unknown tile glyph {glyph:?} at {cell:?}")]
    UnknownGlyph {
        /// Cell holding the glyph.
        cell: CellCoord,
        /// Glyph that could not be classified.
        glyph: char,
    },
}

/// Reasons a flow field cannot be built or queried.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FlowFieldError {
    /// The grid does not contain a goal cell.
    #[error("grid contains no goal cell")]
    NoGoalFound,
    /// The grid contains more than one goal cell.
    #[error("grid contains {} goal cells, exactly one is required", goals.len())]
    MultipleGoals {
        /// Every goal cell found, in row-major order.
        goals: Vec<CellCoord>,
    },
    /// Passable cells exist that cannot reach the goal.
    #[error("{} passable cells cannot reach the goal", cells.len())]
    Disconnected {
        /// Passable cells left unreached, in row-major order.
        cells: Vec<CellCoord>,
    },
    /// The queried cell has no flow entry.
    #[error("cell {cell:?} has no flow entry")]
    UnreachableCell {
        /// Cell that was queried.
        cell: CellCoord,
    },
}

/// Errors that prevent a board from initializing.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BoardError {
    /// The tile map could not be classified.
    #[error(transparent)]
    Grid(#[from] GridError),
    /// The flow field could not be built.
    #[error(transparent)]
    FlowField(#[from] FlowFieldError),
    /// The board has no spawn cell for units to enter through.
    #[error("board has no spawn cell")]
    NoSpawnCell,
}

/// Errors reported by the wave scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WaveError {
    /// The requested wave index lies outside the configured wave table.
    #[error("wave index {index} is out of range for a table of {len} waves")]
    OutOfRange {
        /// Requested wave index.
        index: usize,
        /// Number of waves in the table.
        len: usize,
    },
}

/// Reasons a structure placement request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementError {
    /// The requested cell lies outside the board.
    OutOfBounds,
    /// The requested cell does not accept structures.
    NotBuildable,
    /// Another structure already occupies the cell.
    Occupied,
    /// The catalog has no structure of the requested kind.
    UnknownKind,
    /// Structures may only be built on the local participant's own board.
    ForeignBoard,
}
