use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mapf_rust::common::Agent;
use mapf_rust::config::{AlgorithmKind, Cli, Config};
use mapf_rust::orchestrator::Orchestrator;
use mapf_rust::scenario::Scenario;
use mapf_rust::solver::{Algorithm, Central, Pta, TokenPassing};
use mapf_rust::stat::Stats;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::new(cli)?;
    run(&config)
}

fn run(config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario_path)?;

    let agents: Vec<Agent> =
        scenario.agents_positions.iter().enumerate().map(|(id, &pos)| Agent::new(id, pos)).collect();

    let algorithm = match config.algorithm {
        AlgorithmKind::Central => {
            Algorithm::Central(Central::new(config.low_level_node_budget, config.high_level_node_budget))
        }
        AlgorithmKind::TokenPassing => {
            Algorithm::TokenPassing(TokenPassing::new(scenario.stations_positions.clone(), false, config.low_level_node_budget))
        }
        AlgorithmKind::TokenPassingTaskSwap => {
            Algorithm::TokenPassing(TokenPassing::new(scenario.stations_positions.clone(), true, config.low_level_node_budget))
        }
        AlgorithmKind::PrioritizedTaskAssignment => Algorithm::Pta(Pta::new(config.low_level_node_budget, config.seed)),
    };

    info!(algorithm = ?config.algorithm, agents = agents.len(), tasks = scenario.tasks.len(), "starting run");

    let mut orchestrator = Orchestrator::new(scenario.grid, agents, algorithm, scenario.tasks, config.tick_limit);
    let mut stats = Stats::new();
    orchestrator.run(&mut stats);
    stats.print(config);

    info!(makespan = stats.makespan, time_ms = stats.time_ms, tasks_completed = stats.tasks_completed, "run complete");
    Ok(())
}
