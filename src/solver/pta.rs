use std::collections::HashMap;

use tracing::debug;

use crate::astar::{self, SearchLimits};
use crate::atsp::AtspSolver;
use crate::common::{manhattan, Path, Position, Task};
use crate::constraint::{Constraint, ConstraintSet};
use crate::map::Grid;
use crate::stat::Stats;

/// Builds the agent/task distance matrix (spec.md §4.7) and extracts a
/// per-agent task order from the resulting tour, grounded in
/// `original_source/planner/prioritized.py`'s `TaskAgentGraph` /
/// `assign_tasks_to_agents` / `compute_weight`.
struct TaskAgentGraph<'a> {
    agents: &'a [Position],
    tasks: &'a [Task],
}

impl<'a> TaskAgentGraph<'a> {
    fn vertex_count(&self) -> usize {
        self.agents.len() + self.tasks.len()
    }

    fn is_agent(&self, vertex: usize) -> bool {
        vertex < self.agents.len()
    }

    fn distance_matrix(&self) -> Vec<Vec<usize>> {
        let n = self.vertex_count();
        let mut matrix = vec![vec![0usize; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                matrix[i][j] = self.compute_weight(i, j);
            }
        }
        matrix
    }

    fn compute_weight(&self, from: usize, to: usize) -> usize {
        let a = self.agents.len();
        match (self.is_agent(from), self.is_agent(to)) {
            (true, true) => 0,
            (true, false) => {
                let parking = self.agents[from];
                let task = self.tasks[to - a];
                manhattan(parking, task.s).max(task.r)
            }
            (false, true) => {
                let task = self.tasks[from - a];
                manhattan(task.s, task.g)
            }
            (false, false) => {
                let t1 = self.tasks[from - a];
                let t2 = self.tasks[to - a];
                manhattan(t1.s, t1.g) + manhattan(t1.g, t2.s)
            }
        }
    }

    /// Walks the tour, re-anchoring the "current agent" at every agent
    /// vertex and appending subsequent task vertices to it. The tour is a
    /// Hamiltonian cycle, so it's rotated to start at an agent vertex first
    /// -- otherwise any task visited before the first agent vertex would
    /// have no "current agent" to attach to and would be silently dropped.
    fn task_order_per_agent(&self, tour: &[usize]) -> HashMap<usize, Vec<Task>> {
        let a = self.agents.len();
        let mut assignment: HashMap<usize, Vec<Task>> = HashMap::new();
        if tour.is_empty() {
            return assignment;
        }

        let first_agent_idx = tour.iter().position(|&v| self.is_agent(v)).unwrap_or(0);
        let rotated = tour[first_agent_idx..].iter().chain(tour[..first_agent_idx].iter());

        let mut current_agent: Option<usize> = None;
        for &vertex in rotated {
            if self.is_agent(vertex) {
                current_agent = Some(vertex);
                assignment.entry(vertex).or_default();
            } else if let Some(agent) = current_agent {
                assignment.entry(agent).or_default().push(self.tasks[vertex - a]);
            }
        }
        assignment
    }
}

pub struct PrioritizedTaskAssignment {
    low_level_budget: usize,
}

impl PrioritizedTaskAssignment {
    pub fn new(low_level_budget: usize) -> Self {
        PrioritizedTaskAssignment { low_level_budget }
    }

    /// Assigns `tasks` to `agents` via an ATSP tour over the combined
    /// agent/task graph, then plans every agent's full route in order of
    /// decreasing unconstrained path length, accumulating constraints from
    /// already-settled agents as it goes (spec.md §4.7 Phase 2).
    pub fn solve(
        &self,
        grid: &Grid,
        agents: &[Position],
        tasks: &[Task],
        atsp: &dyn AtspSolver,
        stats: &mut Stats,
    ) -> Vec<Path> {
        if tasks.is_empty() {
            return agents.iter().map(|&pos| vec![(pos, 0)]).collect();
        }

        let graph = TaskAgentGraph { agents, tasks };
        let distance = graph.distance_matrix();
        let tour = atsp.solve(&distance);
        let assignment = graph.task_order_per_agent(&tour);
        debug!(?assignment, "task assignment from ATSP tour");

        let empty = ConstraintSet::new();

        // Build each agent's unconstrained route to rank planning priority
        // (longest route plans first, matching `prioritized.py`'s
        // `max(open_agent_set, key=len(cur_agents_paths[ag]))`).
        let mut unconstrained: Vec<(usize, Path)> = agents
            .iter()
            .enumerate()
            .map(|(id, &start)| {
                let route = assignment.get(&id).cloned().unwrap_or_default();
                (id, self.route_path(grid, start, &route, &empty, &mut stats.low_level_expand_nodes))
            })
            .collect();
        unconstrained.sort_by_key(|(_, path)| std::cmp::Reverse(path.len()));

        let mut settled: HashMap<usize, Path> = HashMap::new();
        let mut constraints = ConstraintSet::new();

        for (agent_id, _) in &unconstrained {
            let route = assignment.get(agent_id).cloned().unwrap_or_default();
            let path =
                self.route_path(grid, agents[*agent_id], &route, &constraints, &mut stats.low_level_expand_nodes);
            for &(pos, t) in &path {
                constraints.insert(Constraint::Vertex { position: pos, time_step: t });
                constraints.insert(Constraint::Vertex { position: pos, time_step: t + 1 });
            }
            settled.insert(*agent_id, path);
        }

        (0..agents.len()).map(|id| settled.remove(&id).unwrap_or_else(|| vec![(agents[id], 0)])).collect()
    }

    fn route_path(
        &self,
        grid: &Grid,
        start: Position,
        route: &[Task],
        constraints: &ConstraintSet,
        expanded: &mut usize,
    ) -> Path {
        let limits = SearchLimits { node_budget: self.low_level_budget, max_constrained_time: 0 };
        let mut path = vec![(start, 0)];
        let mut current = start;
        if !route.is_empty() {
            for task in route {
                let pickup = grid.resolve_access(task.s);
                let dropoff = grid.resolve_access(task.g);
                for leg_goal in [pickup, dropoff] {
                    let leg = astar::plan(grid, current, leg_goal, constraints, limits, expanded);
                    let t0 = path.last().map(|&(_, t)| t).unwrap_or(0);
                    path.extend(leg.into_iter().skip(1).map(|(pos, t)| (pos, t + t0)));
                    current = leg_goal;
                }
            }
            // Every route ends back at the agent's own parking cell (spec.md
            // §4.7, `prioritized.py`'s trailing `find_path_for_parking_location`).
            let leg = astar::plan(grid, current, start, constraints, limits, expanded);
            let t0 = path.last().map(|&(_, t)| t).unwrap_or(0);
            path.extend(leg.into_iter().skip(1).map(|(pos, t)| (pos, t + t0)));
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atsp::HeuristicAtspSolver;
    use std::io::Cursor;

    /// Open 5x5 interior walled off on the zero row/column, since that ring
    /// is permanently unreachable as a destination under the grid's border
    /// rule.
    fn open_grid() -> Grid {
        Grid::from_reader(Cursor::new(
            "open\nheight 6\nwidth 6\n---\nTTTTTT\nT.....\nT.....\nT.....\nT.....\nT.....\n",
        ))
        .unwrap()
    }

    #[test]
    fn assigns_each_task_to_an_agent_and_plans_a_route() {
        let grid = open_grid();
        let agents = vec![(1, 1), (5, 5)];
        let tasks = vec![Task::new((2, 1), (3, 1), 0), Task::new((4, 5), (5, 4), 0)];
        let pta = PrioritizedTaskAssignment::new(0);
        let atsp = HeuristicAtspSolver::new(3);
        let mut stats = Stats::new();
        let paths = pta.solve(&grid, &agents, &tasks, &atsp, &mut stats);
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert_eq!(path.first().unwrap().1, 0);
        }
    }

    #[test]
    fn no_tasks_yields_single_step_paths() {
        let grid = open_grid();
        let agents = vec![(1, 1), (2, 2)];
        let pta = PrioritizedTaskAssignment::new(0);
        let atsp = HeuristicAtspSolver::new(1);
        let mut stats = Stats::new();
        let paths = pta.solve(&grid, &agents, &[], &atsp, &mut stats);
        assert_eq!(paths, vec![vec![((1, 1), 0)], vec![((2, 2), 0)]]);
    }
}
