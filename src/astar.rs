use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{instrument, trace};

use crate::common::{manhattan, Path, Position};
use crate::constraint::ConstraintSet;
use crate::map::Grid;

/// A node in the space-time search space, identified by `(position, time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    position: Position,
    time_step: usize,
    g_cost: usize,
    f_cost: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f, tie-broken by larger g (prefer nodes closer to
        // the goal among equal f), matching the teacher's open-list order.
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| self.g_cost.cmp(&other.g_cost))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Search-budget/stop conditions for a single low-level query.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Hard cap on nodes expanded before giving up (0 = unbounded).
    pub node_budget: usize,
    /// Constraints only exist up to this time step; beyond it the agent is
    /// free to move as if unconstrained (the teacher's
    /// "exceed_constraints_limit_time_step" demotion).
    pub max_constrained_time: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits { node_budget: 0, max_constrained_time: 0 }
    }
}

/// Space-time A* from `start` to `goal`, respecting `constraints`.
///
/// Returns a forward-order `Path` (`path[0] == (start, 0)`). When no
/// solution exists under the given budget, returns the degenerate
/// single-step path `[(start, 0)]` rather than an error — per the
/// "soft failure" policy, callers distinguish "didn't reach the goal" by
/// checking `path.len() == 1 && start != goal`.
#[instrument(skip(grid, constraints), fields(start = ?start, goal = ?goal))]
pub fn plan(
    grid: &Grid,
    start: Position,
    goal: Position,
    constraints: &ConstraintSet,
    limits: SearchLimits,
    expanded_nodes: &mut usize,
) -> Path {
    let mut open: BinaryHeap<OpenNode> = BinaryHeap::new();
    let mut g_score: HashMap<(Position, usize), usize> = HashMap::new();
    let mut came_from: HashMap<(Position, usize), (Position, usize)> = HashMap::new();

    g_score.insert((start, 0), 0);
    open.push(OpenNode { position: start, time_step: 0, g_cost: 0, f_cost: manhattan(start, goal) });

    // Once we've walked past every constrained time step and every other
    // agent's committed path is shorter than our current time, waiting any
    // longer can't help discover a new route; bound the time axis there.
    let time_ceiling = (grid.width + grid.height) * 2 + limits.max_constrained_time + 1;

    while let Some(current) = open.pop() {
        *expanded_nodes += 1;
        if limits.node_budget != 0 && *expanded_nodes > limits.node_budget {
            break;
        }

        if current.position == goal && current.time_step >= limits.max_constrained_time {
            return reconstruct_path(&came_from, (current.position, current.time_step));
        }

        if current.time_step > time_ceiling {
            continue;
        }

        trace!(position = ?current.position, t = current.time_step, g = current.g_cost, "expand node");

        for next_pos in grid.neighbors(current.position) {
            let next_t = current.time_step + 1;
            if constraints.is_vertex_forbidden(next_pos, next_t) {
                continue;
            }
            if constraints.is_edge_forbidden(current.position, next_pos, current.time_step) {
                continue;
            }

            let tentative_g = current.g_cost + 1;
            let key = (next_pos, next_t);
            if tentative_g < *g_score.get(&key).unwrap_or(&usize::MAX) {
                g_score.insert(key, tentative_g);
                came_from.insert(key, (current.position, current.time_step));
                let f_cost = tentative_g + manhattan(next_pos, goal);
                open.push(OpenNode { position: next_pos, time_step: next_t, g_cost: tentative_g, f_cost });
            }
        }
    }

    vec![(start, 0)]
}

fn reconstruct_path(
    came_from: &HashMap<(Position, usize), (Position, usize)>,
    goal_key: (Position, usize),
) -> Path {
    let mut path = vec![goal_key];
    let mut current = goal_key;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// An open `w` x `h` interior surrounded by a wall border on the zero
    /// row/column, since the grid's border rule makes any cell with
    /// `x == 0 || y == 0` permanently unreachable as a destination -- real
    /// warehouse maps wall off that ring rather than use it.
    fn open_grid(w: usize, h: usize) -> Grid {
        let mut body = format!("grid\nheight {}\nwidth {}\n---\n", h + 1, w + 1);
        body.push_str(&"T".repeat(w + 1));
        body.push('\n');
        for _ in 0..h {
            body.push('T');
            body.push_str(&".".repeat(w));
            body.push('\n');
        }
        Grid::from_reader(Cursor::new(body)).unwrap()
    }

    #[test]
    fn straight_line_no_obstacles() {
        let grid = open_grid(5, 5);
        let constraints = ConstraintSet::new();
        let mut expanded = 0;
        let path = plan(&grid, (1, 1), (5, 1), &constraints, SearchLimits::default(), &mut expanded);
        assert_eq!(path.first().unwrap().0, (1, 1));
        assert_eq!(path.last().unwrap().0, (5, 1));
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn detours_around_vertex_constraint() {
        let grid = open_grid(3, 3);
        let mut constraints = ConstraintSet::new();
        constraints.insert(crate::constraint::Constraint::Vertex { position: (2, 1), time_step: 1 });
        let mut expanded = 0;
        let path = plan(&grid, (1, 1), (3, 1), &constraints, SearchLimits::default(), &mut expanded);
        assert!(!path.iter().any(|&(p, t)| p == (2, 1) && t == 1));
        assert_eq!(path.last().unwrap().0, (3, 1));
    }

    #[test]
    fn degenerate_path_when_goal_unreachable() {
        let grid = open_grid(1, 1);
        let constraints = ConstraintSet::new();
        let mut expanded = 0;
        let path = plan(&grid, (1, 1), (5, 5), &constraints, SearchLimits::default(), &mut expanded);
        assert_eq!(path, vec![((1, 1), 0)]);
    }
}
