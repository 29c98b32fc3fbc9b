use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

use anyhow::{anyhow, Context, Result};

use crate::common::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Free,
    Wall,
    Shelf,
}

/// The warehouse grid: passability plus shelf-access-cell bookkeeping.
/// Addressed as `(x, y)` with `x` the column and `y` the row, matching the
/// original grid loader's `grid[row][col]` convention transposed to tuples.
#[derive(Debug, Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    cells: Vec<Cell>,
    /// Maps a shelf cell to the walkable cell an agent parks at to pick up
    /// or drop off at that shelf.
    pub shelf_access: HashMap<Position, Position>,
}

impl Grid {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header = lines.next().context("map file is empty, expected a header line")??;
        let _ = header;

        let height_line = lines.next().context("missing height line")??;
        let height: usize = height_line
            .trim()
            .strip_prefix("height")
            .map(str::trim)
            .unwrap_or(height_line.trim())
            .parse()
            .with_context(|| format!("failed to parse height from line `{height_line}`"))?;

        let width_line = lines.next().context("missing width line")??;
        let width: usize = width_line
            .trim()
            .strip_prefix("width")
            .map(str::trim)
            .unwrap_or(width_line.trim())
            .parse()
            .with_context(|| format!("failed to parse width from line `{width_line}`"))?;

        let _separator = lines.next().context("missing map separator line")??;

        let mut cells = vec![Cell::Free; width * height];
        let mut shelf_access = HashMap::new();

        for row in 0..height {
            let line = lines
                .next()
                .with_context(|| format!("map body ended early at row {row}, expected {height} rows"))??;
            let chars: Vec<char> = line.chars().collect();
            if chars.len() < width {
                return Err(anyhow!("row {row} has {} columns, expected {width}", chars.len()));
            }
            for col in 0..width {
                let idx = row * width + col;
                match chars[col] {
                    'T' => cells[idx] = Cell::Wall,
                    'N' => {
                        cells[idx] = Cell::Shelf;
                        if row > 0 {
                            shelf_access.insert((col, row), (col, row - 1));
                        }
                    }
                    'S' => {
                        cells[idx] = Cell::Shelf;
                        shelf_access.insert((col, row), (col, row + 1));
                    }
                    _ => cells[idx] = Cell::Free,
                }
            }
        }

        Ok(Grid { width, height, cells, shelf_access })
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.0 < self.width && pos.1 < self.height
    }

    pub fn cell(&self, pos: Position) -> Cell {
        self.cells[pos.1 * self.width + pos.0]
    }

    pub fn passable(&self, pos: Position) -> bool {
        self.in_bounds(pos) && !matches!(self.cell(pos), Cell::Wall | Cell::Shelf)
    }

    /// Resolve a task endpoint that may name a shelf cell to the walkable
    /// cell an agent actually paths to. Non-shelf positions pass through.
    pub fn resolve_access(&self, pos: Position) -> Position {
        *self.shelf_access.get(&pos).unwrap_or(&pos)
    }

    /// Up/down/left/right/stay neighbors, skipping the zero row/column
    /// exactly as the original `grid_node.py`'s `if pos_x > 0 and pos_y > 0`
    /// does -- a resulting cell with `nx == 0 || ny == 0` is excluded
    /// outright, not just guarded against `usize` underflow -- and filtering
    /// out walls/shelves.
    pub fn neighbors(&self, pos: Position) -> Vec<Position> {
        const DIRECTIONS: [(isize, isize); 5] = [(-1, 0), (1, 0), (0, -1), (0, 1), (0, 0)];
        let (x, y) = pos;
        let mut result = Vec::with_capacity(5);
        for &(dx, dy) in DIRECTIONS.iter() {
            if dx < 0 && x == 0 {
                continue;
            }
            if dy < 0 && y == 0 {
                continue;
            }
            let nx = (x as isize + dx) as usize;
            let ny = (y as isize + dy) as usize;
            if nx == 0 || ny == 0 {
                continue;
            }
            if self.passable((nx, ny)) {
                result.push((nx, ny));
            }
        }
        result
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.height {
            for col in 0..self.width {
                let ch = match self.cell((col, row)) {
                    Cell::Free => '.',
                    Cell::Wall => 'T',
                    Cell::Shelf => 'N',
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_map() -> &'static str {
        "warehouse-grid\nheight 4\nwidth 4\n---\n....\n.TT.\nN..S\n....\n"
    }

    #[test]
    fn parses_dimensions_and_walls() {
        let grid = Grid::from_reader(Cursor::new(sample_map())).unwrap();
        assert_eq!(grid.width, 4);
        assert_eq!(grid.height, 4);
        assert!(!grid.passable((1, 1)));
        assert!(!grid.passable((2, 1)));
        assert!(grid.passable((0, 0)));
    }

    #[test]
    fn shelf_access_cells_resolve_correctly() {
        let grid = Grid::from_reader(Cursor::new(sample_map())).unwrap();
        assert!(!grid.passable((0, 2)));
        assert_eq!(grid.resolve_access((0, 2)), (0, 1));
        assert!(!grid.passable((3, 2)));
        assert_eq!(grid.resolve_access((3, 2)), (3, 3));
    }

    #[test]
    fn neighbors_skip_zero_border() {
        let grid = Grid::from_reader(Cursor::new(sample_map())).unwrap();
        // Any destination with x == 0 or y == 0 is excluded outright, not
        // just guarded against underflow, so a cell on the zero row/column
        // has no reachable neighbors at all (including "stay").
        assert!(grid.neighbors((0, 0)).is_empty());
        assert!(grid.neighbors((1, 0)).is_empty());
        assert!(grid.neighbors((0, 1)).is_empty());
    }

    #[test]
    fn neighbors_from_interior_cell_skip_zero_border_and_walls() {
        let grid = Grid::from_reader(Cursor::new(sample_map())).unwrap();
        let n = grid.neighbors((1, 2));
        // (0,2) is a shelf and (1,1) is a wall; both excluded.
        assert!(!n.contains(&(0, 2)));
        assert!(!n.contains(&(1, 1)));
        assert!(n.contains(&(2, 2)));
        assert!(n.contains(&(1, 3)));
        assert!(n.contains(&(1, 2)));
    }

    #[test]
    fn neighbors_exclude_walls() {
        let grid = Grid::from_reader(Cursor::new(sample_map())).unwrap();
        let n = grid.neighbors((1, 2));
        assert!(!n.contains(&(1, 1)));
    }
}
