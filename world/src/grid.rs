//! Grid classifier that turns external tile-map rows into cell roles.

use duel_defence_core::{CellCoord, CellRole, GridError};

/// External tile-map data: one text row per grid row, one glyph per cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileMap {
    rows: Vec<String>,
}

impl TileMap {
    /// Captures the provided rows as a tile map.
    #[must_use]
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: rows.into_iter().map(Into::into).collect(),
        }
    }

    /// Raw rows of the tile map.
    #[must_use]
    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}

/// Role of every cell in a rectangular grid. Unoccupied cells carry no role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedGrid {
    columns: u32,
    rows: u32,
    roles: Vec<Option<CellRole>>,
}

impl ClassifiedGrid {
    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Reports whether the cell lies inside the grid bounds.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Role of the cell, or `None` when it is unoccupied or out of bounds.
    #[must_use]
    pub fn role(&self, cell: CellCoord) -> Option<CellRole> {
        self.index(cell)
            .and_then(|index| self.roles.get(index).copied().flatten())
    }

    /// Cells carrying the provided role in row-major order.
    pub fn cells_with(&self, role: CellRole) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells()
            .filter(move |(_, candidate)| *candidate == role)
            .map(|(cell, _)| cell)
    }

    /// Every occupied cell paired with its role, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellCoord, CellRole)> + '_ {
        let columns = self.columns.max(1);
        self.roles.iter().enumerate().filter_map(move |(index, role)| {
            let index = u32::try_from(index).ok()?;
            role.map(|role| (CellCoord::new(index % columns, index / columns), role))
        })
    }

    pub(crate) fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }
}

/// Classifies every occupied cell of the tile map.
///
/// The classifier is a pure read: it validates the map's shape and glyphs
/// but does not judge whether the roles form a playable board. Goal and
/// connectivity checks belong to the flow-field generator.
pub fn classify(map: &TileMap) -> Result<ClassifiedGrid, GridError> {
    let rows = map.rows();
    let Some(first) = rows.first() else {
        return Err(GridError::EmptyGrid);
    };

    let expected = first.chars().count();
    if expected == 0 {
        return Err(GridError::EmptyGrid);
    }

    let columns = u32::try_from(expected).map_err(|_| GridError::EmptyGrid)?;
    let row_count = u32::try_from(rows.len()).map_err(|_| GridError::EmptyGrid)?;
    let mut roles = Vec::with_capacity(expected.saturating_mul(rows.len()));

    for (row_index, row) in (0..row_count).zip(rows.iter()) {
        let found = row.chars().count();
        if found != expected {
            return Err(GridError::RaggedRow {
                row: row_index,
                expected: columns,
                found: u32::try_from(found).unwrap_or(u32::MAX),
            });
        }

        for (column_index, glyph) in (0..columns).zip(row.chars()) {
            let cell = CellCoord::new(column_index, row_index);
            roles.push(role_for_glyph(glyph).ok_or(GridError::UnknownGlyph { cell, glyph })?);
        }
    }

    Ok(ClassifiedGrid {
        columns,
        rows: row_count,
        roles,
    })
}

fn role_for_glyph(glyph: char) -> Option<Option<CellRole>> {
    match glyph {
        ' ' => Some(None),
        '~' => Some(Some(CellRole::Cosmetic)),
        '.' => Some(Some(CellRole::Buildable)),
        '#' => Some(Some(CellRole::Traversable)),
        'S' => Some(Some(CellRole::Spawn)),
        'G' => Some(Some(CellRole::Goal)),
        _ => None,
    }
}
