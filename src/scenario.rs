use std::fs;
use std::path::Path as FsPath;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::common::{Position, Task};
use crate::map::Grid;

/// On-disk scenario format (spec.md §6): a map file reference plus the
/// initial agent positions, task list and station endpoints.
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    map_file: String,
    agents_positions: Vec<Position>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    stations_positions: Vec<Position>,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub grid: Grid,
    pub agents_positions: Vec<Position>,
    pub tasks: Vec<Task>,
    pub stations_positions: Vec<Position>,
}

impl Scenario {
    /// Load a scenario JSON file. `map_file` is resolved relative to the
    /// scenario file's own directory, matching the teacher's convention
    /// of path-relative auxiliary file references.
    pub fn load(scenario_path: &FsPath) -> Result<Self> {
        let raw = fs::read_to_string(scenario_path)
            .with_context(|| format!("failed to read scenario file `{}`", scenario_path.display()))?;
        let file: ScenarioFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario JSON `{}`", scenario_path.display()))?;

        let base_dir = scenario_path.parent().unwrap_or_else(|| FsPath::new("."));
        let map_path = base_dir.join(&file.map_file);
        let map_raw = fs::File::open(&map_path)
            .with_context(|| format!("failed to open map file `{}`", map_path.display()))?;
        let grid = Grid::from_reader(std::io::BufReader::new(map_raw))
            .with_context(|| format!("failed to parse map file `{}`", map_path.display()))?;

        for &pos in &file.agents_positions {
            if !grid.passable(pos) {
                return Err(anyhow::anyhow!(
                    "agent start position {:?} is not a passable cell on `{}`",
                    pos,
                    map_path.display()
                ));
            }
        }

        Ok(Scenario {
            grid,
            agents_positions: file.agents_positions,
            tasks: file.tasks,
            stations_positions: file.stations_positions,
        })
    }
}
