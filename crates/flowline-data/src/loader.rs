//! Scenario loading: reads a data file, resolves names, builds engine inputs.
//!
//! Provides format detection (RON/JSON/TOML), file discovery and
//! deserialization helpers, and the resolution pipeline that turns a
//! [`ScenarioData`] into a registry, a seeded factory state and orders.

use crate::schema::*;
use flowline_core::engine::{Engine, EngineError};
use flowline_core::event::Notifier;
use flowline_core::fixed::f64_to_fixed64;
use flowline_core::graph::*;
use flowline_core::id::*;
use flowline_core::order::Order;
use flowline_core::registry::{RecipeEntry, Registry, RegistryBuilder, RegistryError};
use flowline_core::sim::EngineConfig;
use flowline_core::state::FactoryState;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a scenario.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Look for `{base_name}.ron`, `.toml` or `.json` in `dir`.
///
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &'static str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name,
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_err = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name, returning an `UnresolvedRef` error if it is unknown.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Return a `DuplicateName` error if `name` is already in the map.
pub fn check_duplicate<V>(map: &HashMap<String, V>, name: &str, file: &Path) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Scenario
// ===========================================================================

/// Everything needed to start an engine session.
#[derive(Debug)]
pub struct Scenario {
    pub registry: Registry,
    pub state: FactoryState,
    pub orders: Vec<Order>,
    pub config: EngineConfig,
}

impl Scenario {
    pub fn into_engine(self) -> Result<Engine, EngineError> {
        Engine::new(self.registry, self.state, self.orders, self.config)
    }

    pub fn into_engine_with(self, notifier: Box<dyn Notifier>) -> Result<Engine, EngineError> {
        Engine::with_notifier(self.registry, self.state, self.orders, self.config, notifier)
    }
}

/// Load a scenario file (`.ron`, `.toml` or `.json`).
pub fn load_scenario(path: &Path) -> Result<Scenario, DataLoadError> {
    let data: ScenarioData = deserialize_file(path)?;
    let scenario = build_scenario(&data, path)?;
    info!(
        file = %path.display(),
        materials = scenario.registry.material_count(),
        recipes = scenario.registry.recipe_count(),
        steps = scenario.state.graph().step_count(),
        links = scenario.state.graph().link_count(),
        orders = scenario.orders.len(),
        "scenario loaded"
    );
    Ok(scenario)
}

/// Load `scenario.{ron,toml,json}` from a directory.
pub fn load_scenario_dir(dir: &Path) -> Result<Scenario, DataLoadError> {
    let path = require_data_file(dir, "scenario")?;
    load_scenario(&path)
}

/// Resolve a parsed scenario. `file` is only used in error messages.
pub fn build_scenario(data: &ScenarioData, file: &Path) -> Result<Scenario, DataLoadError> {
    // -- Registry --
    let mut builder = RegistryBuilder::new();
    let mut materials: HashMap<String, MaterialId> = HashMap::new();
    for name in &data.materials {
        check_duplicate(&materials, name, file)?;
        materials.insert(name.clone(), builder.register_material(name));
    }

    let entries = |list: &[(String, u32)]| -> Result<Vec<RecipeEntry>, DataLoadError> {
        list.iter()
            .map(|(name, qty)| {
                let id = *resolve_name(&materials, name, file, "material")?;
                Ok(RecipeEntry::new(id, *qty))
            })
            .collect()
    };

    let mut recipes: HashMap<String, RecipeId> = HashMap::new();
    for r in &data.recipes {
        check_duplicate(&recipes, &r.name, file)?;
        let id = builder.register_recipe(&r.name, entries(&r.inputs)?, entries(&r.outputs)?)?;
        recipes.insert(r.name.clone(), id);
    }
    let registry = builder.build();

    // -- Topology --
    let mut graph = FactoryGraph::new();
    let mut locations: HashMap<String, LocationId> = HashMap::new();
    for name in &data.locations {
        check_duplicate(&locations, name, file)?;
        locations.insert(name.clone(), graph.add_location(name.clone()));
    }

    let mut steps: HashMap<String, StepId> = HashMap::new();
    let mut holders: HashMap<String, Holder> = HashMap::new();
    for s in &data.steps {
        check_duplicate(&holders, &s.name, file)?;
        let params = StepParams::new(s.limit)
            .with_speeds(s.input_speed, s.output_speed)
            .with_duration(s.duration)
            .with_recipe_rate(f64_to_fixed64(s.recipe_rate))
            .with_error_rate(f64_to_fixed64(s.error_rate));
        let mut step = ProcessStep::new(s.name.clone(), params);
        if let Some(recipe) = &s.recipe {
            step = step.with_recipe(*resolve_name(&recipes, recipe, file, "recipe")?);
        }
        if let Some(location) = &s.location {
            step = step.at(*resolve_name(&locations, location, file, "location")?);
        }
        step.active = s.active;
        let id = graph.add_step(step)?;
        steps.insert(s.name.clone(), id);
        holders.insert(s.name.clone(), Holder::Step(id));
    }

    for l in &data.links {
        check_duplicate(&holders, &l.name, file)?;
        let from = *resolve_name(&steps, &l.from, file, "step")?;
        let to = *resolve_name(&steps, &l.to, file, "step")?;
        let params = LinkParams::new(l.limit)
            .with_speeds(l.input_speed, l.output_speed)
            .with_delay(l.transport_delay)
            .with_min_quantity(l.min_quantity);
        let mut link = TransportLink::new(l.name.clone(), from, to, params).with_kind(l.kind.clone());
        if let Some(filter) = &l.filter {
            let ids = filter
                .iter()
                .map(|m| resolve_name(&materials, m, file, "material").copied())
                .collect::<Result<Vec<_>, _>>()?;
            link = link.with_filter(ids);
        }
        link.active = l.active;
        let id = graph.add_link(link)?;
        holders.insert(l.name.clone(), Holder::Link(id));
    }

    // -- Attachments --
    for r in &data.resources {
        let holder = *resolve_name(&holders, &r.holder, file, "step or link")?;
        let effect = match r.effect {
            EffectData::Production => ResourceEffect::Production,
            EffectData::Inventory => ResourceEffect::Inventory,
        };
        let mut resource = Resource::new(r.name.clone(), holder, effect);
        resource.mandatory = r.mandatory;
        resource.active = r.active;
        resource.faulty = r.faulty;
        graph.add_resource(resource)?;
    }
    for s in &data.sensors {
        let holder = *resolve_name(&holders, &s.holder, file, "step or link")?;
        graph.add_sensor(Sensor::new(s.name.clone(), holder))?;
    }

    // -- Orders --
    let mut order_ids: HashMap<String, OrderId> = HashMap::new();
    let mut orders = Vec::with_capacity(data.orders.len());
    for o in &data.orders {
        let key = o.id.to_string();
        check_duplicate(&order_ids, &key, file)?;
        let mut order = Order::new(OrderId(o.id), o.quantity);
        for (name, per_unit) in &o.requirements {
            order = order.with_requirement(*resolve_name(&materials, name, file, "material")?, *per_unit);
        }
        order_ids.insert(key, order.id);
        orders.push(order);
    }

    // -- Initial stock --
    let mut state = FactoryState::new(graph);
    for s in &data.stock {
        let material = *resolve_name(&materials, &s.material, file, "material")?;
        let order = s
            .order
            .map(|id| resolve_name(&order_ids, &id.to_string(), file, "order").copied())
            .transpose()?;
        let placed = match *resolve_name(&holders, &s.at, file, "step or link")? {
            Holder::Step(step) => state.seed_step(step, material, s.count, order)?,
            Holder::Link(link) => state.seed_link(link, material, s.count, order)?,
        };
        if placed < s.count {
            warn!(at = %s.at, material = %s.material, requested = s.count, placed, "initial stock exceeds limit");
        }
        debug!(at = %s.at, material = %s.material, placed, "stock seeded");
    }

    Ok(Scenario {
        registry,
        state,
        orders,
        config: data.config.clone(),
    })
}

// ===========================================================================
// Tests
// ===========================================================================
