use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::error;

use crate::config::Config;

/// Per-run counters, extended from the teacher's `Stats` with the
/// MAPD-specific fields the teacher has no use for (`tasks_completed`,
/// `tasks_swapped`).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub costs: usize,
    pub time_ms: u128,
    pub low_level_expand_nodes: usize,
    pub high_level_expand_nodes: usize,
    pub tasks_completed: usize,
    pub tasks_swapped: usize,
    pub makespan: usize,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    /// Append one CSV line to `config.output_path`. Unlike the teacher,
    /// where this path was mandatory, here it's optional: a run without
    /// `--output-path` simply skips stats recording.
    pub fn print(&self, config: &Config) {
        let Some(output_path) = &config.output_path else {
            return;
        };
        if let Err(err) = self.append_csv_line(output_path) {
            error!("failed to write stats to {}: {err:#}", output_path.display());
        }
    }

    fn append_csv_line(&self, output_path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(output_path)?;
        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            self.costs,
            self.time_ms,
            self.low_level_expand_nodes,
            self.high_level_expand_nodes,
            self.tasks_completed,
            self.tasks_swapped,
            self.makespan,
        )
    }
}
