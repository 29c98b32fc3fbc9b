use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::common::{agent_status, Agent, Position, Task};
use crate::map::Grid;
use crate::solver::{Algorithm, AlgorithmImpl};
use crate::stat::Stats;

/// Drives the tick loop: releases tasks whose release time has elapsed,
/// asks the selected algorithm to (re)plan, and steps every agent forward
/// by one command per tick (spec.md §5's synchronous, single-threaded
/// concurrency model).
pub struct Orchestrator {
    pub grid: Grid,
    pub agents: Vec<Agent>,
    starting_positions: HashMap<usize, Position>,
    algorithm: Algorithm,
    backlog: Vec<Task>,
    tick: usize,
    tick_limit: usize,
}

impl Orchestrator {
    pub fn new(grid: Grid, agents: Vec<Agent>, algorithm: Algorithm, tasks: Vec<Task>, tick_limit: usize) -> Self {
        let starting_positions = agents.iter().map(|a| (a.id, a.position)).collect();
        Orchestrator { grid, agents, starting_positions, algorithm, backlog: tasks, tick: 0, tick_limit }
    }

    fn release_due_tasks(&mut self) {
        let (due, remaining): (Vec<Task>, Vec<Task>) =
            self.backlog.drain(..).partition(|t| t.r <= self.tick);
        self.backlog = remaining;
        if !due.is_empty() {
            info!(tick = self.tick, count = due.len(), "releasing tasks");
            self.algorithm.add_tasks(due);
        }
    }

    fn step_agents(&mut self) {
        for agent in self.agents.iter_mut() {
            let waiting_on_pickup = agent.position != self.starting_positions[&agent.id];
            debug!(agent = agent.id, status = ?agent_status(agent, waiting_on_pickup), "agent status");
            agent.step();
        }
    }

    fn all_work_done(&self) -> bool {
        self.backlog.is_empty()
            && self.algorithm.pending_task_count() == 0
            && self.agents.iter().all(|a| a.is_idle())
    }

    /// Runs until every released task is delivered and every agent is
    /// idle, or `tick_limit` is reached (the safety cap spec.md §5
    /// recommends for an orchestrator driving potentially non-terminating
    /// online algorithms).
    #[instrument(skip(self))]
    pub fn run(&mut self, stats: &mut Stats) {
        let started = Instant::now();
        while self.tick < self.tick_limit {
            self.release_due_tasks();
            self.algorithm.update(&self.grid, &mut self.agents, &self.starting_positions, stats);
            self.step_agents();

            if self.all_work_done() {
                info!(tick = self.tick, "all tasks delivered, all agents idle");
                break;
            }
            self.tick += 1;
        }
        stats.makespan = self.tick;
        stats.time_ms = started.elapsed().as_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{Pta, TokenPassing};
    use std::io::Cursor;

    /// Open 4x4 interior walled off on the zero row/column, since that ring
    /// is permanently unreachable as a destination under the grid's border
    /// rule.
    fn open_grid() -> Grid {
        Grid::from_reader(Cursor::new("open\nheight 5\nwidth 5\n---\nTTTTT\nT....\nT....\nT....\nT....\n")).unwrap()
    }

    #[test]
    fn token_passing_delivers_a_single_task() {
        let grid = open_grid();
        let agents = vec![Agent::new(0, (1, 1))];
        let tasks = vec![Task::new((4, 1), (4, 4), 0)];
        let algorithm = Algorithm::TokenPassing(TokenPassing::new(vec![], false, 0));
        let mut orchestrator = Orchestrator::new(grid, agents, algorithm, tasks, 200);
        let mut stats = Stats::new();
        orchestrator.run(&mut stats);
        assert_eq!(orchestrator.agents[0].position, (4, 4));
    }

    #[test]
    fn prioritized_assignment_delivers_all_tasks() {
        let grid = open_grid();
        let agents = vec![Agent::new(0, (1, 1)), Agent::new(1, (4, 4))];
        let tasks = vec![Task::new((4, 1), (1, 4), 0), Task::new((1, 4), (4, 1), 0)];
        let algorithm = Algorithm::Pta(Pta::new(0, 42));
        let mut orchestrator = Orchestrator::new(grid, agents, algorithm, tasks, 200);
        let mut stats = Stats::new();
        orchestrator.run(&mut stats);
        assert!(orchestrator.agents.iter().all(|a| a.is_idle()));
    }
}
