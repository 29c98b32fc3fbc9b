use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Central,
    TokenPassing,
    TokenPassingTaskSwap,
    PrioritizedTaskAssignment,
}

impl AlgorithmKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "central" => Some(AlgorithmKind::Central),
            "token_passing" => Some(AlgorithmKind::TokenPassing),
            "token_passing_task_swap" => Some(AlgorithmKind::TokenPassingTaskSwap),
            "prioritized_task_assignment" => Some(AlgorithmKind::PrioritizedTaskAssignment),
            _ => None,
        }
    }
}

/// Command-line surface, mirroring spec.md §6's external interface plus the
/// operational knobs the teacher's `Cli` carries (node budgets, seed,
/// timeout, optional output path).
#[derive(Debug, Parser)]
#[command(name = "mapf_rust", about = "Multi-agent path finding and task assignment planner")]
pub struct Cli {
    /// Path to the scenario JSON file.
    #[arg(long)]
    pub scenario: PathBuf,

    /// One of: central, token_passing, token_passing_task_swap, prioritized_task_assignment.
    #[arg(long)]
    pub algorithm: String,

    /// Optional CSV file to append one run-statistics line to.
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Low-level (single-agent A*) node expansion budget. 0 = unbounded.
    #[arg(long, default_value_t = 0)]
    pub low_level_node_budget: usize,

    /// High-level (CBS constraint-tree) node expansion budget. 0 = unbounded.
    #[arg(long, default_value_t = 0)]
    pub high_level_node_budget: usize,

    /// Maximum number of orchestrator ticks before stopping.
    #[arg(long, default_value_t = 10_000)]
    pub tick_limit: usize,

    /// Seed for any randomized tie-breaking (ATSP nearest-neighbor start, agent shuffling).
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Wall-clock budget in seconds for the ATSP solver before it falls back
    /// to its best-known tour (spec.md §6, §4.7).
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

/// Parsed and validated configuration, separated from the clap-facing `Cli`
/// the way the teacher's `config.rs` does.
#[derive(Debug, Clone)]
pub struct Config {
    pub scenario_path: PathBuf,
    pub algorithm: AlgorithmKind,
    pub output_path: Option<PathBuf>,
    pub low_level_node_budget: usize,
    pub high_level_node_budget: usize,
    pub tick_limit: usize,
    pub seed: u64,
    pub timeout_secs: u64,
}

impl Config {
    pub fn new(cli: Cli) -> Result<Self> {
        let algorithm = AlgorithmKind::parse(&cli.algorithm)
            .ok_or_else(|| anyhow!("unknown algorithm `{}`", cli.algorithm))?;

        let config = Config {
            scenario_path: cli.scenario,
            algorithm,
            output_path: cli.output_path,
            low_level_node_budget: cli.low_level_node_budget,
            high_level_node_budget: cli.high_level_node_budget,
            tick_limit: cli.tick_limit,
            seed: cli.seed,
            timeout_secs: cli.timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("--timeout-secs must be greater than 0"));
        }
        if self.tick_limit == 0 {
            return Err(anyhow!("--tick-limit must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            scenario: PathBuf::from("scenario.json"),
            algorithm: "central".to_string(),
            output_path: None,
            low_level_node_budget: 0,
            high_level_node_budget: 0,
            tick_limit: 10_000,
            seed: 0,
            timeout_secs: 10,
        }
    }

    #[test]
    fn accepts_known_algorithm_names() {
        for name in ["central", "token_passing", "token_passing_task_swap", "prioritized_task_assignment"] {
            let mut cli = base_cli();
            cli.algorithm = name.to_string();
            assert!(Config::new(cli).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn rejects_unknown_algorithm_name() {
        let mut cli = base_cli();
        cli.algorithm = "not_a_real_algorithm".to_string();
        assert!(Config::new(cli).is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cli = base_cli();
        cli.timeout_secs = 0;
        assert!(Config::new(cli).is_err());
    }
}
