pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, Scenario, load_scenario, load_scenario_dir};
