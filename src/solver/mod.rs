pub mod cbs;
pub mod pta;
pub mod token_passing;

use std::collections::HashMap;

use pathfinding::prelude::{kuhn_munkres_min, Matrix};
use tracing::{debug, info};

use crate::atsp::HeuristicAtspSolver;
use crate::common::{manhattan, Agent, Position, Task};
use crate::map::Grid;
use crate::stat::Stats;

pub use pta::PrioritizedTaskAssignment;
pub use token_passing::TokenPassing;

/// Common surface every coordination algorithm implements so the
/// orchestrator can dispatch without knowing which one is selected.
pub trait AlgorithmImpl {
    fn add_tasks(&mut self, tasks: Vec<Task>);
    fn update(&mut self, grid: &Grid, agents: &mut [Agent], starting_positions: &HashMap<usize, Position>, stats: &mut Stats);
    fn pending_task_count(&self) -> usize;
}

/// The "central" algorithm (`original_source/planner/central.py`): a
/// single coordinator assigns free agents to task endpoints via a min-cost
/// bipartite matching, then replans every active agent's path together
/// through CBS so the result is guaranteed collision-free.
pub struct Central {
    pending_tasks: Vec<Task>,
    assigned: HashMap<usize, Task>,
    low_level_budget: usize,
    high_level_budget: usize,
}

impl Central {
    pub fn new(low_level_budget: usize, high_level_budget: usize) -> Self {
        Central { pending_tasks: Vec::new(), assigned: HashMap::new(), low_level_budget, high_level_budget }
    }

    /// Bipartite min-cost matching of free agents to pending task pickups,
    /// falling back to each agent's own starting position (parking) when
    /// there are fewer tasks than free agents, per `assign_endpoints` in
    /// `original_source/planner/central.py`.
    fn assign_endpoints(&mut self, free_agents: &[(usize, Position)], starting_positions: &HashMap<usize, Position>) {
        if free_agents.is_empty() {
            return;
        }
        let n_agents = free_agents.len();
        let n_tasks = self.pending_tasks.len();
        let size = n_agents.max(n_tasks);
        if size == 0 {
            return;
        }

        // `kuhn_munkres_min` wants a square matrix; pad with dummy
        // zero-cost rows/columns when agents and tasks don't balance.
        let weights = Matrix::from_fn(size, size, |(row, col)| {
            if row >= n_agents {
                return 0;
            }
            let (agent_id, pos) = free_agents[row];
            if col < n_tasks {
                manhattan(pos, self.pending_tasks[col].s) as i64
            } else {
                // Dummy parking column: cost to stay near the agent's own start.
                manhattan(pos, starting_positions.get(&agent_id).copied().unwrap_or(pos)) as i64
            }
        });

        let (_, assignment) = kuhn_munkres_min(&weights);
        let mut taken: Vec<usize> = Vec::new();
        for (row, &col) in assignment.iter().enumerate().take(n_agents) {
            if col < n_tasks {
                let (agent_id, _) = free_agents[row];
                self.assigned.insert(agent_id, self.pending_tasks[col]);
                taken.push(col);
            }
        }
        taken.sort_unstable();
        for &idx in taken.iter().rev() {
            self.pending_tasks.remove(idx);
        }
    }
}

impl AlgorithmImpl for Central {
    fn add_tasks(&mut self, tasks: Vec<Task>) {
        self.pending_tasks.extend(tasks);
    }

    fn pending_task_count(&self) -> usize {
        self.pending_tasks.len() + self.assigned.len()
    }

    fn update(&mut self, grid: &Grid, agents: &mut [Agent], starting_positions: &HashMap<usize, Position>, stats: &mut Stats) {
        // An agent that finished executing its commands and is parked at
        // its assigned task's delivery cell has completed that task.
        for agent in agents.iter() {
            if !agent.is_idle() {
                continue;
            }
            if let Some(task) = self.assigned.get(&agent.id) {
                if agent.position == grid.resolve_access(task.g) {
                    self.assigned.remove(&agent.id);
                    stats.tasks_completed += 1;
                }
            }
        }

        let free_agents: Vec<(usize, Position)> =
            agents.iter().filter(|a| a.is_idle()).map(|a| (a.id, a.position)).collect();
        self.assign_endpoints(&free_agents, starting_positions);

        // Every agent with an active task (or idle-with-nothing-to-do) gets
        // a start/goal pair for the joint CBS replan; agents already mid-task
        // keep their committed destination as the goal.
        let goals: Vec<(usize, Position, Position)> = agents
            .iter()
            .map(|a| {
                let goal = self
                    .assigned
                    .get(&a.id)
                    .map(|t| grid.resolve_access(t.g))
                    .unwrap_or_else(|| starting_positions.get(&a.id).copied().unwrap_or(a.position));
                (a.id, a.position, goal)
            })
            .collect();

        let pairs: Vec<(Position, Position)> = goals.iter().map(|&(_, s, g)| (s, g)).collect();
        if let Some(paths) = cbs::solve(
            grid,
            &pairs,
            self.low_level_budget,
            self.high_level_budget,
            &mut stats.low_level_expand_nodes,
            &mut stats.high_level_expand_nodes,
        ) {
            for ((agent_id, _, _), path) in goals.iter().zip(paths.iter()) {
                if let Some(agent) = agents.iter_mut().find(|a| a.id == *agent_id) {
                    agent.assign_path(path);
                }
            }
        } else {
            debug!("central: CBS exhausted search budget this tick, holding positions");
        }
        info!(pending = self.pending_tasks.len(), assigned = self.assigned.len(), "central tick");
    }
}

/// Prioritized Task Assignment is planned once, offline, up front (spec.md
/// §4.7): the tour/assignment and every agent's full route are fixed
/// before the orchestrator starts ticking. Subsequent `update` calls are a
/// no-op once the initial plan has been committed.
pub struct Pta {
    inner: PrioritizedTaskAssignment,
    atsp: HeuristicAtspSolver,
    pending_tasks: Vec<Task>,
    solved: bool,
}

impl Pta {
    pub fn new(low_level_budget: usize, seed: u64) -> Self {
        Pta { inner: PrioritizedTaskAssignment::new(low_level_budget), atsp: HeuristicAtspSolver::new(seed), pending_tasks: Vec::new(), solved: false }
    }
}

impl AlgorithmImpl for Pta {
    fn add_tasks(&mut self, tasks: Vec<Task>) {
        self.pending_tasks.extend(tasks);
    }

    fn pending_task_count(&self) -> usize {
        if self.solved {
            0
        } else {
            self.pending_tasks.len()
        }
    }

    fn update(&mut self, grid: &Grid, agents: &mut [Agent], _starting_positions: &HashMap<usize, Position>, stats: &mut Stats) {
        if self.solved {
            return;
        }
        let positions: Vec<Position> = agents.iter().map(|a| a.position).collect();
        let paths = self.inner.solve(grid, &positions, &self.pending_tasks, &self.atsp, stats);
        for (agent, path) in agents.iter_mut().zip(paths.iter()) {
            agent.assign_path(path);
        }
        stats.tasks_completed += self.pending_tasks.len();
        self.solved = true;
        info!(tasks = self.pending_tasks.len(), "prioritized task assignment solved offline");
    }
}

/// Static dispatch over the four selectable algorithms, matching
/// spec.md §6's CLI surface and `algorithm_utils.get_algorithm`'s match
/// statement in the original source.
pub enum Algorithm {
    Central(Central),
    TokenPassing(TokenPassing),
    Pta(Pta),
}

impl AlgorithmImpl for Algorithm {
    fn add_tasks(&mut self, tasks: Vec<Task>) {
        match self {
            Algorithm::Central(a) => a.add_tasks(tasks),
            Algorithm::TokenPassing(a) => a.add_tasks(tasks),
            Algorithm::Pta(a) => a.add_tasks(tasks),
        }
    }

    fn update(&mut self, grid: &Grid, agents: &mut [Agent], starting_positions: &HashMap<usize, Position>, stats: &mut Stats) {
        match self {
            Algorithm::Central(a) => a.update(grid, agents, starting_positions, stats),
            Algorithm::TokenPassing(a) => a.update(grid, agents, starting_positions, stats),
            Algorithm::Pta(a) => a.update(grid, agents, starting_positions, stats),
        }
    }

    fn pending_task_count(&self) -> usize {
        match self {
            Algorithm::Central(a) => a.pending_task_count(),
            Algorithm::TokenPassing(a) => a.pending_task_count(),
            Algorithm::Pta(a) => a.pending_task_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Open 4x4 interior walled off on the zero row/column, since that ring
    /// is permanently unreachable as a destination under the grid's border
    /// rule.
    fn open_grid() -> Grid {
        Grid::from_reader(Cursor::new("open\nheight 5\nwidth 5\n---\nTTTTT\nT....\nT....\nT....\nT....\n")).unwrap()
    }

    #[test]
    fn central_assigns_and_completes_a_task() {
        let grid = open_grid();
        let mut central = Central::new(0, 0);
        central.add_tasks(vec![Task::new((4, 4), (1, 1), 0)]);
        let mut agents = vec![Agent::new(0, (1, 1))];
        let starts: HashMap<usize, Position> = [(0, (1, 1))].into_iter().collect();
        let mut stats = Stats::new();
        central.update(&grid, &mut agents, &starts, &mut stats);
        assert!(!agents[0].is_idle());
        assert_eq!(central.pending_task_count(), 1);
    }
}
