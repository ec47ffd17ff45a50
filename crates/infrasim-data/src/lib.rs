//! Scenario and run configuration loading from RON, TOML or JSON files.
//!
//! A run directory holds a required `scenario` file and an optional `config`
//! file, each in any supported format:
//!
//! ```text
//! run/
//!   scenario.ron    # nodes, elements, exchanges
//!   config.toml     # duration, time_step, rounds_per_step, epsilon
//! ```

pub mod loader;
pub mod resolve;
pub mod schema;

use std::path::Path;

use infrasim_core::scenario::Scenario;
use infrasim_core::sim::SimConfig;

pub use loader::{DataLoadError, Format};

/// A resolved scenario and the configuration to run it with.
#[derive(Debug, Clone)]
pub struct RunData {
    pub scenario: Scenario,
    pub config: SimConfig,
}

/// Load and resolve a single scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, DataLoadError> {
    let data: schema::ScenarioData = loader::deserialize_file(path)?;
    resolve::resolve_scenario(&data, path)
}

/// Load and resolve a single run configuration file.
pub fn load_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    let data: schema::ConfigData = loader::deserialize_file(path)?;
    resolve::resolve_config(&data, path)
}

/// Parse and resolve scenario text in the given format.
pub fn parse_scenario(content: &str, format: Format) -> Result<Scenario, DataLoadError> {
    let origin = Path::new("<inline>");
    let data: schema::ScenarioData = loader::deserialize_str(content, format, origin)?;
    resolve::resolve_scenario(&data, origin)
}

/// Load `scenario.*` and, if present, `config.*` from `dir`. Without a
/// config file the kernel defaults apply.
pub fn load_run(dir: &Path) -> Result<RunData, DataLoadError> {
    let scenario = load_scenario(&loader::require_data_file(dir, "scenario")?)?;
    let config = match loader::find_data_file(dir, "config")? {
        Some(path) => load_config(&path)?,
        None => SimConfig::default(),
    };
    tracing::info!(
        dir = %dir.display(),
        scenario = %scenario.name(),
        elements = scenario.element_count(),
        duration = config.duration,
        time_step = config.time_step,
        rounds = config.rounds_per_step,
        "run loaded"
    );
    Ok(RunData { scenario, config })
}
