use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use tracing::debug;

use crate::astar::{self, SearchLimits};
use crate::common::{Path, Position};
use crate::constraint::{Constraint, ConstraintSet};
use crate::map::Grid;

/// A constraint-tree node. Following the teacher's `HighLevelOpenNode`
/// (`common/highlevel.rs`), each node carries its full per-agent constraint
/// sets and paths directly rather than diffing against a parent, which
/// sidesteps any need for `Rc<RefCell<..>>` parent-pointer bookkeeping.
#[derive(Debug, Clone)]
struct CtNode {
    constraints: Vec<ConstraintSet>,
    paths: Vec<Path>,
    cost: usize,
}

impl CtNode {
    fn recompute_cost(&mut self) {
        self.cost = self.paths.iter().map(|p| p.len()).sum();
    }
}

impl PartialEq for CtNode {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for CtNode {}

impl Ord for CtNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on sum-of-costs, matching BTreeSet/open-list ordering in
        // the teacher's `solver/cbs.rs`.
        other.cost.cmp(&self.cost)
    }
}
impl PartialOrd for CtNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
enum Conflict {
    Vertex { a: usize, b: usize, position: Position, time_step: usize },
    Edge { a: usize, b: usize, a_from: Position, a_to: Position, time_step: usize },
}

fn position_at(path: &Path, t: usize) -> Position {
    if t < path.len() {
        path[t].0
    } else {
        path.last().expect("path is never empty").0
    }
}

/// Scan every agent pair from `min_len - 1` down to `0`, returning the
/// first conflict found, per the literal scan order spec.md §4.4 requires.
fn find_first_conflict(paths: &[Path]) -> Option<Conflict> {
    for a in 0..paths.len() {
        for b in (a + 1)..paths.len() {
            let min_len = paths[a].len().min(paths[b].len());
            if min_len == 0 {
                continue;
            }
            for t in (0..min_len).rev() {
                let pos_a = position_at(&paths[a], t);
                let pos_b = position_at(&paths[b], t);
                if pos_a == pos_b {
                    return Some(Conflict::Vertex { a, b, position: pos_a, time_step: t });
                }
                if t + 1 < min_len {
                    let next_a = position_at(&paths[a], t + 1);
                    let next_b = position_at(&paths[b], t + 1);
                    if pos_a == next_b && pos_b == next_a {
                        return Some(Conflict::Edge { a, b, a_from: pos_a, a_to: next_a, time_step: t });
                    }
                }
            }
        }
    }
    None
}

/// Solve for collision-free paths for every `(start, goal)` pair. Returns
/// `None` if the high-level node budget is exhausted before a
/// collision-free assignment is found (a soft failure per spec.md §7, not
/// an error).
pub fn solve(
    grid: &Grid,
    agents: &[(Position, Position)],
    low_level_budget: usize,
    high_level_budget: usize,
    low_level_expanded: &mut usize,
    high_level_expanded: &mut usize,
) -> Option<Vec<Path>> {
    let limits = SearchLimits { node_budget: low_level_budget, max_constrained_time: 0 };

    let mut root = CtNode {
        constraints: vec![ConstraintSet::new(); agents.len()],
        paths: Vec::with_capacity(agents.len()),
        cost: 0,
    };
    for &(start, goal) in agents {
        root.paths.push(astar::plan(grid, start, goal, &ConstraintSet::new(), limits, low_level_expanded));
    }
    root.recompute_cost();

    let mut open = BinaryHeap::new();
    let mut seen_keys: HashSet<Vec<Vec<Constraint>>> = HashSet::new();
    open.push(root);

    while let Some(node) = open.pop() {
        *high_level_expanded += 1;
        if high_level_budget != 0 && *high_level_expanded > high_level_budget {
            return None;
        }

        let Some(conflict) = find_first_conflict(&node.paths) else {
            debug!(cost = node.cost, nodes = *high_level_expanded, "found collision-free solution");
            return Some(node.paths);
        };
        debug!(?conflict, cost = node.cost, "branching on conflict");

        let (agent_a, constraint_a, agent_b, constraint_b) = match conflict {
            Conflict::Vertex { a, b, position, time_step } => (
                a,
                Constraint::Vertex { position, time_step },
                b,
                Constraint::Vertex { position, time_step },
            ),
            Conflict::Edge { a, b, a_from, a_to, time_step } => (
                a,
                Constraint::Edge { from: a_from, to: a_to, time_step },
                b,
                Constraint::Edge { from: a_to, to: a_from, time_step },
            ),
        };

        for (agent, constraint) in [(agent_a, constraint_a), (agent_b, constraint_b)] {
            let mut child = node.clone();
            if !child.constraints[agent].insert(constraint) {
                continue;
            }
            let key: Vec<Vec<Constraint>> = child.constraints.iter().map(|c| c.dedup_key()).collect();
            if !seen_keys.insert(key) {
                continue;
            }
            let (start, goal) = agents[agent];
            child.paths[agent] =
                astar::plan(grid, start, goal, &child.constraints[agent], limits, low_level_expanded);
            child.recompute_cost();
            open.push(child);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn corridor_grid() -> Grid {
        // A wall border on the zero row/column (unreachable as a destination
        // per the grid's border rule) plus two open rows so a head-on pair
        // can sidestep each other instead of deadlocking in a true
        // single-file corridor.
        Grid::from_reader(Cursor::new(
            "corridor\nheight 3\nwidth 6\n---\nTTTTTT\nT.....\nT.....\n",
        ))
        .unwrap()
    }

    #[test]
    fn head_on_agents_take_collision_free_paths() {
        let grid = corridor_grid();
        let agents = vec![((1, 1), (5, 1)), ((5, 1), (1, 1))];
        let mut low = 0;
        let mut high = 0;
        let paths = solve(&grid, &agents, 0, 0, &mut low, &mut high).expect("solution should exist");
        assert_eq!(paths.len(), 2);
        assert!(find_first_conflict(&paths).is_none());
    }

    #[test]
    fn independent_agents_need_no_branching() {
        let grid = Grid::from_reader(Cursor::new(
            "open\nheight 4\nwidth 4\n---\nTTTT\nT...\nT...\nT...\n",
        ))
        .unwrap();
        let agents = vec![((1, 1), (3, 1)), ((1, 3), (3, 3))];
        let mut low = 0;
        let mut high = 0;
        let paths = solve(&grid, &agents, 0, 0, &mut low, &mut high).unwrap();
        assert_eq!(high, 1);
        assert!(find_first_conflict(&paths).is_none());
    }
}
