use std::collections::VecDeque;

use serde::Deserialize;

/// A free cell on the grid, addressed as (x, y).
pub type Position = (usize, usize);

/// Space-time step: a path entry is executed at this tick.
pub type Path = Vec<(Position, usize)>;

pub fn manhattan(a: Position, b: Position) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct Task {
    pub s: Position,
    pub g: Position,
    #[serde(default)]
    pub r: usize,
}

impl Task {
    pub fn new(s: Position, g: Position, r: usize) -> Self {
        Task { s, g, r }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveTo(Position),
    Pickup(Position),
    Unload,
}

/// A mobile agent: identity, current position, parking position, and the
/// queue of commands it is currently executing.
///
/// The command queue is consumed from the front here (equivalent to the
/// source's tail-consumption of a reversed plan, per spec's Path convention
/// note): `assign_path` takes a forward-order Path and enqueues a `MoveTo`
/// per step after the first (the first step is the agent's current
/// position, so it carries no command).
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: usize,
    pub starting_position: Position,
    pub position: Position,
    pub command_queue: VecDeque<Command>,
}

impl Agent {
    pub fn new(id: usize, position: Position) -> Self {
        Agent {
            id,
            starting_position: position,
            position,
            command_queue: VecDeque::new(),
        }
    }

    /// Replace the command queue with the moves implied by `path`.
    /// `path[0]` must be the agent's current position.
    pub fn assign_path(&mut self, path: &Path) {
        debug_assert_eq!(path.first().map(|&(p, _)| p), Some(self.position));
        self.command_queue = path.iter().skip(1).map(|&(pos, _)| Command::MoveTo(pos)).collect();
    }

    pub fn assign_commands(&mut self, commands: VecDeque<Command>) {
        self.command_queue = commands;
    }

    /// Pop and apply the next queued command, if any.
    pub fn step(&mut self) -> Option<Command> {
        let command = self.command_queue.pop_front();
        if let Some(Command::MoveTo(pos)) = command {
            self.position = pos;
        }
        command
    }

    pub fn is_idle(&self) -> bool {
        self.command_queue.len() < 1
    }
}

/// Read-only status derived from an agent's command queue, kept for
/// logging/introspection only -- never an independent source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Busy,
    Resting,
    Free,
}

pub fn agent_status(agent: &Agent, waiting_on_pickup: bool) -> AgentStatus {
    if agent.command_queue.len() > 1 {
        AgentStatus::Busy
    } else if agent.command_queue.is_empty() && waiting_on_pickup {
        AgentStatus::Resting
    } else {
        AgentStatus::Free
    }
}
