//! Static flow field builder used by the world crate.

use std::collections::VecDeque;

use duel_defence_core::{CellCoord, CellRole, Direction, FlowFieldError};
use glam::Vec2;
use rand::Rng;

use crate::grid::ClassifiedGrid;

/// Dense next-hop grid seeded from the board's goal.
///
/// The field stores, for every passable cell, the adjacent cell one hop
/// closer to the goal together with its breadth-first depth. The goal points
/// at itself. Cells without an entry are not part of the path. A field is
/// immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    next: Vec<Option<CellCoord>>,
    depths: Vec<Option<u32>>,
    goal: CellCoord,
    spawns: Vec<CellCoord>,
}

impl FlowField {
    /// Builds the flow field using a reverse breadth-first search from the goal.
    ///
    /// Fails when the grid has no goal, more than one goal, or passable cells
    /// that cannot reach the goal. No partial field is returned on failure.
    pub fn build(grid: &ClassifiedGrid) -> Result<Self, FlowFieldError> {
        let goals: Vec<CellCoord> = grid.cells_with(CellRole::Goal).collect();
        let goal = match goals.as_slice() {
            [] => return Err(FlowFieldError::NoGoalFound),
            [goal] => *goal,
            _ => return Err(FlowFieldError::MultipleGoals { goals }),
        };

        let width = grid.columns();
        let height = grid.rows();
        let width_usize = usize::try_from(width).unwrap_or(0);
        let cell_count = width_usize
            .checked_mul(usize::try_from(height).unwrap_or(0))
            .unwrap_or(0);

        let mut next = vec![None; cell_count];
        let mut depths: Vec<Option<u32>> = vec![None; cell_count];
        let mut queue = VecDeque::new();

        let Some(goal_index) = index(width_usize, goal) else {
            return Err(FlowFieldError::NoGoalFound);
        };
        next[goal_index] = Some(goal);
        depths[goal_index] = Some(0);
        queue.push_back(goal);

        while let Some(cell) = queue.pop_front() {
            let Some(current_index) = index(width_usize, cell) else {
                continue;
            };
            let Some(current_depth) = depths[current_index] else {
                continue;
            };

            for neighbor in neighbors(cell, width, height) {
                if !grid.role(neighbor).is_some_and(CellRole::is_passable) {
                    continue;
                }

                let Some(neighbor_index) = index(width_usize, neighbor) else {
                    continue;
                };

                if next[neighbor_index].is_some() {
                    continue;
                }

                next[neighbor_index] = Some(cell);
                depths[neighbor_index] = Some(current_depth.saturating_add(1));
                queue.push_back(neighbor);
            }
        }

        let disconnected: Vec<CellCoord> = grid
            .cells()
            .filter(|(_, role)| role.is_passable())
            .map(|(cell, _)| cell)
            .filter(|cell| index(width_usize, *cell).map_or(true, |slot| next[slot].is_none()))
            .collect();
        if !disconnected.is_empty() {
            return Err(FlowFieldError::Disconnected {
                cells: disconnected,
            });
        }

        Ok(Self {
            width,
            height,
            next,
            depths,
            goal,
            spawns: grid.cells_with(CellRole::Spawn).collect(),
        })
    }

    /// Width of the field in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the field in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Cell that units try to reach.
    #[must_use]
    pub const fn goal(&self) -> CellCoord {
        self.goal
    }

    /// Reports whether the cell is the goal.
    #[must_use]
    pub fn is_goal(&self, cell: CellCoord) -> bool {
        cell == self.goal
    }

    /// Adjacent cell one hop closer to the goal. The goal maps to itself.
    pub fn step(&self, cell: CellCoord) -> Result<CellCoord, FlowFieldError> {
        self.slot(cell)
            .and_then(|slot| self.next[slot])
            .ok_or(FlowFieldError::UnreachableCell { cell })
    }

    /// Direction of travel out of the cell, or `None` at the goal or off the path.
    #[must_use]
    pub fn direction(&self, cell: CellCoord) -> Option<Direction> {
        self.step(cell)
            .ok()
            .and_then(|next| Direction::between(cell, next))
    }

    /// Number of hops between the cell and the goal.
    #[must_use]
    pub fn depth(&self, cell: CellCoord) -> Option<u32> {
        self.slot(cell).and_then(|slot| self.depths[slot])
    }

    /// Spawn cells in row-major order.
    #[must_use]
    pub fn spawn_cells(&self) -> &[CellCoord] {
        &self.spawns
    }

    /// Spawn cell at the provided path index, wrapping around the spawn list.
    #[must_use]
    pub fn spawn_cell(&self, path_index: u32) -> Option<CellCoord> {
        if self.spawns.is_empty() {
            return None;
        }
        let index = usize::try_from(path_index).ok()? % self.spawns.len();
        self.spawns.get(index).copied()
    }

    /// Picks a spawn cell with the caller's seeded generator.
    ///
    /// Returns the chosen path index alongside the cell so the choice can be
    /// replicated without replaying the generator.
    pub fn random_spawn_cell<R: Rng>(&self, rng: &mut R) -> Option<(u32, CellCoord)> {
        if self.spawns.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.spawns.len());
        let path_index = u32::try_from(index).ok()?;
        Some((path_index, self.spawns[index]))
    }

    /// World-space position a `fraction` of the way from `cell` toward its next hop.
    ///
    /// Positions are measured in cells with cell centers at half offsets.
    #[must_use]
    pub fn position(&self, cell: CellCoord, fraction: f32) -> Vec2 {
        let from = cell_center(cell);
        match self.step(cell) {
            Ok(next) if next != cell => from.lerp(cell_center(next), fraction.clamp(0.0, 1.0)),
            _ => from,
        }
    }

    fn slot(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() >= self.width || cell.row() >= self.height {
            return None;
        }
        index(usize::try_from(self.width).ok()?, cell)
    }
}

/// Center of the cell in world space.
#[must_use]
pub fn cell_center(cell: CellCoord) -> Vec2 {
    Vec2::new(cell.column() as f32 + 0.5, cell.row() as f32 + 0.5)
}

fn neighbors(cell: CellCoord, width: u32, height: u32) -> impl Iterator<Item = CellCoord> {
    Direction::ALL
        .into_iter()
        .filter_map(move |direction| cell.neighbor(direction))
        .filter(move |neighbor| neighbor.column() < width && neighbor.row() < height)
}

fn index(width: usize, cell: CellCoord) -> Option<usize> {
    let column = usize::try_from(cell.column()).ok()?;
    let row = usize::try_from(cell.row()).ok()?;
    row.checked_mul(width)?.checked_add(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{classify, TileMap};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field(rows: &[&str]) -> Result<FlowField, FlowFieldError> {
        let grid = classify(&TileMap::from_rows(rows.iter().copied())).expect("valid map");
        FlowField::build(&grid)
    }

    #[test]
    fn step_points_one_hop_toward_goal() {
        let field = field(&["S##", "..#", "..G"]).expect("valid field");

        assert_eq!(field.step(CellCoord::new(0, 0)), Ok(CellCoord::new(1, 0)));
        assert_eq!(field.step(CellCoord::new(2, 0)), Ok(CellCoord::new(2, 1)));
        assert_eq!(field.step(CellCoord::new(2, 1)), Ok(CellCoord::new(2, 2)));
        assert_eq!(field.depth(CellCoord::new(0, 0)), Some(4));
    }

    #[test]
    fn goal_is_a_fixed_point() {
        let field = field(&["S#G"]).expect("valid field");
        let goal = field.goal();
        for _ in 0..3 {
            assert_eq!(field.step(goal), Ok(goal));
        }
        assert!(field.is_goal(goal));
        assert_eq!(field.direction(goal), None);
    }

    #[test]
    fn repeated_steps_reach_goal_in_depth_hops() {
        let field = field(&[
            "S###.",
            ".#.#.",
            ".####",
            "...#.",
            "S###G",
        ])
        .expect("valid field");

        for row in 0..field.height() {
            for column in 0..field.width() {
                let start = CellCoord::new(column, row);
                let Some(depth) = field.depth(start) else {
                    continue;
                };
                let mut cell = start;
                let mut hops = 0;
                while !field.is_goal(cell) {
                    cell = field.step(cell).expect("passable cell has entry");
                    hops += 1;
                    assert!(hops <= depth, "walk from {start:?} overshot depth");
                }
                assert_eq!(hops, depth, "walk from {start:?} did not match depth");
            }
        }
    }

    #[test]
    fn non_passable_cells_have_no_entry() {
        let field = field(&["S#G", "~.."]).expect("valid field");
        assert_eq!(
            field.step(CellCoord::new(1, 1)),
            Err(FlowFieldError::UnreachableCell {
                cell: CellCoord::new(1, 1)
            })
        );
        assert_eq!(
            field.step(CellCoord::new(9, 9)),
            Err(FlowFieldError::UnreachableCell {
                cell: CellCoord::new(9, 9)
            })
        );
    }

    #[test]
    fn missing_goal_is_rejected() {
        assert_eq!(field(&["S##"]), Err(FlowFieldError::NoGoalFound));
    }

    #[test]
    fn multiple_goals_are_rejected() {
        assert_eq!(
            field(&["G#S#G"]),
            Err(FlowFieldError::MultipleGoals {
                goals: vec![CellCoord::new(0, 0), CellCoord::new(4, 0)],
            })
        );
    }

    #[test]
    fn disconnected_path_is_reported() {
        assert_eq!(
            field(&["S#.G#"]),
            Err(FlowFieldError::Disconnected {
                cells: vec![CellCoord::new(0, 0), CellCoord::new(1, 0)],
            })
        );
    }

    #[test]
    fn unreachable_goal_is_rejected() {
        assert!(matches!(
            field(&["S#.G"]),
            Err(FlowFieldError::Disconnected { .. })
        ));
    }

    #[test]
    fn position_interpolates_toward_next_hop() {
        let field = field(&["S#G"]).expect("valid field");
        let halfway = field.position(CellCoord::new(0, 0), 0.5);
        assert!((halfway.x - 1.0).abs() < 1e-6);
        assert!((halfway.y - 0.5).abs() < 1e-6);
        assert_eq!(field.position(field.goal(), 0.7), cell_center(field.goal()));
    }

    #[test]
    fn random_spawn_cell_is_deterministic_for_seed() {
        let field = field(&["S#S", "#.#", "##G"]).expect("valid field");
        let mut first = ChaCha8Rng::seed_from_u64(11);
        let mut second = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..8 {
            let a = field.random_spawn_cell(&mut first).expect("spawn available");
            let b = field.random_spawn_cell(&mut second).expect("spawn available");
            assert_eq!(a, b);
            assert_eq!(field.spawn_cell(a.0), Some(a.1));
        }
    }
}
