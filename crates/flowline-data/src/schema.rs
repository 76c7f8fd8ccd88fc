//! Serde structs for scenario files.
//!
//! A scenario describes one factory session: materials, recipes, the
//! step/link topology, attached resources and sensors, initial stock and
//! customer orders. Everything is referenced by name; the loader resolves
//! names into engine ids.

use flowline_core::sim::EngineConfig;
use serde::Deserialize;

// ===========================================================================
// Scenario
// ===========================================================================

/// Top-level scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioData {
    #[serde(default)]
    pub config: EngineConfig,
    pub materials: Vec<String>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
    #[serde(default)]
    pub locations: Vec<String>,
    pub steps: Vec<StepData>,
    #[serde(default)]
    pub links: Vec<LinkData>,
    #[serde(default)]
    pub resources: Vec<ResourceData>,
    #[serde(default)]
    pub sensors: Vec<SensorData>,
    #[serde(default)]
    pub stock: Vec<StockData>,
    #[serde(default)]
    pub orders: Vec<OrderData>,
}

// ===========================================================================
// Registry
// ===========================================================================

/// A recipe: `(material, quantity)` pairs consumed and produced per run.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub inputs: Vec<(String, u32)>,
    pub outputs: Vec<(String, u32)>,
}

// ===========================================================================
// Topology
// ===========================================================================

fn default_one() -> u32 {
    1
}

fn default_duration() -> u64 {
    1
}

fn default_rate() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_kind() -> String {
    "transport".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepData {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub recipe: Option<String>,
    pub limit: u32,
    #[serde(default = "default_one")]
    pub input_speed: u32,
    #[serde(default = "default_one")]
    pub output_speed: u32,
    #[serde(default = "default_rate")]
    pub recipe_rate: f64,
    #[serde(default = "default_duration")]
    pub duration: u64,
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkData {
    pub name: String,
    /// Type tag used to group transport duration samples.
    #[serde(default = "default_kind")]
    pub kind: String,
    pub from: String,
    pub to: String,
    pub limit: u32,
    #[serde(default = "default_one")]
    pub input_speed: u32,
    #[serde(default = "default_one")]
    pub output_speed: u32,
    #[serde(default)]
    pub min_quantity: u32,
    #[serde(default)]
    pub transport_delay: u64,
    /// Materials the link carries. Absent means every material.
    #[serde(default)]
    pub filter: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

// ===========================================================================
// Attachments
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectData {
    Production,
    Inventory,
}

/// A resource attached to the step or link named `holder`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceData {
    pub name: String,
    pub holder: String,
    pub effect: EffectData,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub faulty: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorData {
    pub name: String,
    pub holder: String,
}

// ===========================================================================
// Stock and orders
// ===========================================================================

/// Initial units placed at the step or link named `at`.
#[derive(Debug, Clone, Deserialize)]
pub struct StockData {
    pub at: String,
    pub material: String,
    pub count: u32,
    /// Tag the units to this order instead of leaving them for reservation.
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderData {
    pub id: u32,
    pub quantity: u32,
    /// Per-unit `(material, quantity)` bill of materials.
    #[serde(default)]
    pub requirements: Vec<(String, u32)>,
}
