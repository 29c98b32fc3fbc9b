use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::astar::{self, SearchLimits};
use crate::common::{manhattan, Agent, Path, Position, Task};
use crate::constraint::{Constraint, ConstraintSet};
use crate::map::Grid;
use crate::stat::Stats;

/// Shared planning state passed between agents within a single tick, named
/// `Token` after `original_source/planner/token_passing.py`'s `Token`
/// dataclass: the currently committed path per agent, the unassigned task
/// pool, and the task each busy agent is currently executing.
#[derive(Debug, Clone, Default)]
struct Token {
    paths: HashMap<usize, Path>,
    tasks: Vec<Task>,
    assign: HashMap<usize, Task>,
}

/// Token Passing, optionally with the task-swap extension. Both variants
/// share the constraint-derivation rule (spec.md §4.5): a constraint set
/// built from the union of `(pos, t)` and `(pos, t+1)` over every *other*
/// agent's currently committed path.
pub struct TokenPassing {
    token: Token,
    enable_swap: bool,
    low_level_budget: usize,
}

impl TokenPassing {
    pub fn new(_stations: Vec<Position>, enable_swap: bool, low_level_budget: usize) -> Self {
        TokenPassing { token: Token::default(), enable_swap, low_level_budget }
    }

    pub fn add_tasks(&mut self, tasks: Vec<Task>) {
        self.token.tasks.extend(tasks);
    }

    pub fn pending_task_count(&self) -> usize {
        self.token.tasks.len() + self.token.assign.len()
    }

    /// Constraints an agent must respect: every other agent's committed
    /// path, expanded so that both "don't be there" and "don't arrive
    /// there next" are forbidden (spec.md §4.5's lookahead rule).
    fn constraints_for(&self, agent_id: usize) -> ConstraintSet {
        let mut set = ConstraintSet::new();
        for (&other_id, path) in self.token.paths.iter() {
            if other_id == agent_id {
                continue;
            }
            for &(pos, t) in path.iter() {
                set.insert(Constraint::Vertex { position: pos, time_step: t });
                set.insert(Constraint::Vertex { position: pos, time_step: t + 1 });
            }
        }
        set
    }

    /// Every other agent's committed-path destination (`token.paths[ag]`'s
    /// final cell), per `token_passing.py`'s `endpoints = [self.token.paths[ag][0]
    /// for ag in self.token.paths if ag != agent]` (that `[0]` indexes the
    /// python source's reversed, tail-popped path representation, so it
    /// names the same cell this crate's forward-ordered `path.last()` does).
    /// This is distinct from assigned-task endpoints: an agent returning to
    /// parking has a committed path but no `assign` entry, and still needs
    /// to be avoided.
    fn endpoints_in_use(&self, exclude: usize) -> HashSet<Position> {
        self.token
            .paths
            .iter()
            .filter(|&(&id, _)| id != exclude)
            .filter_map(|(_, path)| path.last().map(|&(pos, _)| pos))
            .collect()
    }

    fn plan_task(
        &self,
        grid: &Grid,
        agent_pos: Position,
        task: Task,
        constraints: &ConstraintSet,
        low_level_expanded: &mut usize,
    ) -> Path {
        let limits = SearchLimits { node_budget: self.low_level_budget, max_constrained_time: 0 };
        let pickup = grid.resolve_access(task.s);
        let dropoff = grid.resolve_access(task.g);
        let to_pickup = astar::plan(grid, agent_pos, pickup, constraints, limits, low_level_expanded);
        let t0 = to_pickup.last().map(|&(_, t)| t).unwrap_or(0);
        let pickup_to_goal = astar::plan(grid, pickup, dropoff, constraints, limits, low_level_expanded);
        let mut full = to_pickup;
        full.extend(pickup_to_goal.into_iter().skip(1).map(|(pos, t)| (pos, t + t0)));
        full
    }

    fn plan_to(
        &self,
        grid: &Grid,
        from: Position,
        to: Position,
        constraints: &ConstraintSet,
        low_level_expanded: &mut usize,
    ) -> Path {
        let limits = SearchLimits { node_budget: self.low_level_budget, max_constrained_time: 0 };
        astar::plan(grid, from, to, constraints, limits, low_level_expanded)
    }

    /// Try to hand `agent_id` (currently at `agent_pos`) a clear task,
    /// returning its full pickup-to-delivery path. In the task-swap
    /// variant a task already claimed by another agent can be reclaimed
    /// here if `agent_id` is strictly closer, provided the displaced agent
    /// can in turn recursively find a replacement task -- mirroring
    /// `get_task` in
    /// `original_source/planner/token_passing_task_swap.py`. `positions`
    /// gives every agent's current location, needed to replan a displaced
    /// holder from where it actually stands.
    fn get_task(
        &mut self,
        agent_id: usize,
        agent_pos: Position,
        positions: &HashMap<usize, Position>,
        grid: &Grid,
        low_level_expanded: &mut usize,
        swap_count: &mut usize,
    ) -> Option<Path> {
        let endpoints_busy = self.endpoints_in_use(agent_id);
        let mut clear: Vec<Task> = self
            .token
            .tasks
            .iter()
            .copied()
            .filter(|t| !endpoints_busy.contains(&t.s) && !endpoints_busy.contains(&t.g))
            .collect();
        clear.sort_by_key(|t| manhattan(agent_pos, t.s));

        if let Some(task) = clear.first().copied() {
            self.token.tasks.retain(|t| t != &task);
            self.token.assign.insert(agent_id, task);
            let constraints = self.constraints_for(agent_id);
            let path = self.plan_task(grid, agent_pos, task, &constraints, low_level_expanded);
            self.token.paths.insert(agent_id, path.clone());
            return Some(path);
        }

        if !self.enable_swap {
            return None;
        }

        // No clear task: look for a task already claimed by a busier agent
        // that this agent could reach strictly faster, and attempt a swap.
        let mut candidates: Vec<(usize, Task, usize)> = self
            .token
            .assign
            .iter()
            .filter(|&(&id, _)| id != agent_id)
            .map(|(&id, &task)| {
                let holder_len = self.token.paths.get(&id).map(Path::len).unwrap_or(usize::MAX);
                (id, task, holder_len)
            })
            .filter(|&(_, task, holder_len)| manhattan(agent_pos, task.s) < holder_len)
            .collect();
        candidates.sort_by_key(|&(_, task, _)| manhattan(agent_pos, task.s));

        let (holder, task, _) = candidates.into_iter().next()?;

        self.token.assign.remove(&holder);
        self.token.paths.remove(&holder);
        self.token.assign.insert(agent_id, task);
        let constraints = self.constraints_for(agent_id);
        let path = self.plan_task(grid, agent_pos, task, &constraints, low_level_expanded);
        self.token.paths.insert(agent_id, path.clone());

        let holder_pos = positions.get(&holder).copied().unwrap_or(agent_pos);
        if self.get_task(holder, holder_pos, positions, grid, low_level_expanded, swap_count).is_some() {
            debug!(from = holder, to = agent_id, "task swapped");
            *swap_count += 1;
            Some(path)
        } else {
            // Nobody could replace the displaced agent's task: undo the swap.
            self.token.assign.remove(&agent_id);
            self.token.paths.remove(&agent_id);
            self.token.assign.insert(holder, task);
            None
        }
    }

    pub fn update(
        &mut self,
        grid: &Grid,
        agents: &mut [Agent],
        starting_positions: &HashMap<usize, Position>,
        stats: &mut Stats,
    ) {
        // An idle agent parked at its assigned task's drop-off cell has
        // finished delivering it; free the assignment before handing the
        // agent a new task, otherwise it lingers in `assign` forever and
        // `pending_task_count` never reaches zero.
        for agent in agents.iter() {
            if !agent.is_idle() {
                continue;
            }
            if let Some(&task) = self.token.assign.get(&agent.id) {
                if agent.position == grid.resolve_access(task.g) {
                    self.token.assign.remove(&agent.id);
                    stats.tasks_completed += 1;
                }
            }
        }

        let positions: HashMap<usize, Position> = agents.iter().map(|a| (a.id, a.position)).collect();
        let idle: Vec<usize> = agents.iter().filter(|a| a.is_idle()).map(|a| a.id).collect();

        for agent_id in idle {
            let agent_pos = positions[&agent_id];
            let mut swap_count = 0;

            if let Some(path) =
                self.get_task(agent_id, agent_pos, &positions, grid, &mut stats.low_level_expand_nodes, &mut swap_count)
            {
                stats.tasks_swapped += swap_count;
                let agent = agents.iter_mut().find(|a| a.id == agent_id).unwrap();
                agent.assign_path(&path);
                continue;
            }

            // No clear task to claim. `token_passing.py`'s `update` then
            // stays put only if nothing else needs this cell: no pending
            // task is waiting to be dropped off here, and no other agent's
            // committed path ends here either. Otherwise the agent clears
            // out by returning to its own parking cell.
            let tasks_goal_here = self.token.tasks.iter().any(|t| t.g == agent_pos);
            let endpoint_here = self.endpoints_in_use(agent_id).contains(&agent_pos);
            if !tasks_goal_here && !endpoint_here {
                self.token.paths.insert(agent_id, vec![(agent_pos, 0)]);
            } else {
                let start = starting_positions.get(&agent_id).copied().unwrap_or(agent_pos);
                let constraints = self.constraints_for(agent_id);
                let path = self.plan_to(grid, agent_pos, start, &constraints, &mut stats.low_level_expand_nodes);
                self.token.paths.insert(agent_id, path.clone());
                let agent = agents.iter_mut().find(|a| a.id == agent_id).unwrap();
                agent.assign_path(&path);
            }
        }
        info!(pending = self.token.tasks.len(), assigned = self.token.assign.len(), "token passing tick");
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
        Grid::from_reader(Cursor::new(
            "open\nheight 5\nwidth 5\n---\nTTTTT\nT....\nT....\nT....\nT....\n",
        ))
        .unwrap()
    }

    #[test]
    fn single_idle_agent_claims_nearest_task() {
        let grid = open_grid();
        let mut tp = TokenPassing::new(vec![], false, 0);
        tp.add_tasks(vec![Task::new((4, 4), (1, 1), 0)]);
        let mut agents = vec![Agent::new(0, (1, 1))];
        let starts: HashMap<usize, Position> = [(0, (1, 1))].into_iter().collect();
        let mut stats = Stats::new();
        tp.update(&grid, &mut agents, &starts, &mut stats);
        assert!(!agents[0].is_idle());
        assert_eq!(tp.pending_task_count(), 1); // task now assigned, not pending
    }

    #[test]
    fn idle_agent_stays_put_with_no_tasks_and_no_conflicts() {
        let grid = open_grid();
        let mut tp = TokenPassing::new(vec![], false, 0);
        let mut agents = vec![Agent::new(0, (3, 3))];
        agents[0].position = (2, 2);
        let starts: HashMap<usize, Position> = [(0, (3, 3))].into_iter().collect();
        let mut stats = Stats::new();
        tp.update(&grid, &mut agents, &starts, &mut stats);
        // Nothing needs this cell, so the agent holds rather than burning
        // moves to return home.
        assert!(agents[0].is_idle());
    }

    #[test]
    fn idle_agent_returns_to_start_when_occupying_another_agents_endpoint() {
        let grid = open_grid();
        let mut tp = TokenPassing::new(vec![], false, 0);
        // Agent 1's committed path already ends at (2, 2); agent 0 idles on
        // that same cell and must clear out for it.
        tp.token.paths.insert(1, vec![((2, 2), 0)]);
        let mut agents = vec![Agent::new(0, (2, 2))];
        let starts: HashMap<usize, Position> = [(0, (3, 3))].into_iter().collect();
        let mut stats = Stats::new();
        tp.update(&grid, &mut agents, &starts, &mut stats);
        assert!(!agents[0].is_idle());
    }

    #[test]
    fn task_swap_moves_task_to_closer_agent() {
        let grid = open_grid();
        let mut tp = TokenPassing::new(vec![], true, 0);
        tp.add_tasks(vec![Task::new((4, 1), (4, 4), 0)]);
        let far = Agent::new(0, (1, 1));
        let near = Agent::new(1, (4, 2));
        let mut agents = vec![far, near];
        let starts: HashMap<usize, Position> =
            [(0, (1, 1)), (1, (4, 2))].into_iter().collect();
        let mut stats = Stats::new();

        // First tick: only the far agent is idle and claims the task.
        tp.update(&grid, &mut agents[..1], &starts, &mut stats);
        assert_eq!(tp.token.assign.get(&0), Some(&Task::new((4, 1), (4, 4), 0)));

        // Second tick: the near agent becomes idle too and should swap in.
        tp.update(&grid, &mut agents, &starts, &mut stats);
        assert_eq!(tp.token.assign.get(&1), Some(&Task::new((4, 1), (4, 4), 0)));
    }
}
