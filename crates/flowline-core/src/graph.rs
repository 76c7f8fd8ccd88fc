//! The factory topology: locations, process steps, transport links, and the
//! resources and sensors attached to them.
//!
//! Entities live in `SlotMap` arenas and refer to each other by key. Step
//! adjacency and per-holder attachments are kept in `SecondaryMap`s so that
//! they stay in sync with the primary arenas. Arena iteration order is
//! insertion order, which is the processing order of every tick phase.

use crate::fixed::{Fixed64, Ticks};
use crate::id::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while assembling a factory graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("step not found: {0:?}")]
    StepNotFound(StepId),
    #[error("link not found: {0:?}")]
    LinkNotFound(LinkId),
    #[error("location not found: {0:?}")]
    LocationNotFound(LocationId),
    #[error("link {0} connects step {1:?} to itself")]
    SelfLink(String, StepId),
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
}

/// Tunable parameters of a process step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepParams {
    /// Items accepted per tick from input links.
    pub input_speed: u32,
    /// Items released per tick to output links.
    pub output_speed: u32,
    /// Recipe runs attempted per tick.
    pub recipe_rate: Fixed64,
    /// Ticks one batch takes.
    pub duration: Ticks,
    /// Probability in [0, 1] that a recipe run fails.
    pub error_rate: Fixed64,
    /// Inventory limit.
    pub limit: u32,
}

impl StepParams {
    pub fn new(limit: u32) -> Self {
        Self {
            input_speed: 1,
            output_speed: 1,
            recipe_rate: Fixed64::ONE,
            duration: 1,
            error_rate: Fixed64::ZERO,
            limit,
        }
    }

    pub fn with_speeds(mut self, input: u32, output: u32) -> Self {
        self.input_speed = input;
        self.output_speed = output;
        self
    }

    pub fn with_duration(mut self, duration: Ticks) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_recipe_rate(mut self, rate: Fixed64) -> Self {
        self.recipe_rate = rate;
        self
    }

    pub fn with_error_rate(mut self, rate: Fixed64) -> Self {
        self.error_rate = rate;
        self
    }
}

/// A processing stage: holds items, optionally transforms them by recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub name: String,
    pub location: Option<LocationId>,
    pub active: bool,
    pub recipe: Option<RecipeId>,
    pub params: StepParams,
}

impl ProcessStep {
    pub fn new(name: impl Into<String>, params: StepParams) -> Self {
        Self {
            name: name.into(),
            location: None,
            active: true,
            recipe: None,
            params,
        }
    }

    pub fn with_recipe(mut self, recipe: RecipeId) -> Self {
        self.recipe = Some(recipe);
        self
    }

    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }
}

/// Tunable parameters of a transport link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Items accepted per tick from the upstream step.
    pub input_speed: u32,
    /// Items released per tick to the downstream step.
    pub output_speed: u32,
    /// Minimum eligible items before a release. 0 disables batching.
    pub min_quantity: u32,
    /// Ticks an item must spend in the link before it is eligible.
    pub transport_delay: Ticks,
    /// Inventory limit.
    pub limit: u32,
}

impl LinkParams {
    pub fn new(limit: u32) -> Self {
        Self {
            input_speed: 1,
            output_speed: 1,
            min_quantity: 0,
            transport_delay: 0,
            limit,
        }
    }

    pub fn with_speeds(mut self, input: u32, output: u32) -> Self {
        self.input_speed = input;
        self.output_speed = output;
        self
    }

    pub fn with_delay(mut self, delay: Ticks) -> Self {
        self.transport_delay = delay;
        self
    }

    pub fn with_min_quantity(mut self, min: u32) -> Self {
        self.min_quantity = min;
        self
    }
}

/// A directed connection moving items from one step to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportLink {
    pub name: String,
    /// Type tag; transport duration samples are grouped by it.
    pub kind: String,
    pub from: StepId,
    pub to: StepId,
    pub active: bool,
    /// Materials allowed onto the link. `None` accepts everything.
    pub filter: Option<BTreeSet<MaterialId>>,
    pub params: LinkParams,
}

impl TransportLink {
    pub fn new(name: impl Into<String>, from: StepId, to: StepId, params: LinkParams) -> Self {
        Self {
            name: name.into(),
            kind: "transport".to_string(),
            from,
            to,
            active: true,
            filter: None,
            params,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_filter(mut self, materials: impl IntoIterator<Item = MaterialId>) -> Self {
        self.filter = Some(materials.into_iter().collect());
        self
    }

    pub fn accepts(&self, material: MaterialId) -> bool {
        self.filter.as_ref().is_none_or(|f| f.contains(&material))
    }
}

/// Which capability a resource scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceEffect {
    Production,
    Inventory,
}

/// A machine, worker or utility attached to a step or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub holder: Holder,
    pub effect: ResourceEffect,
    pub active: bool,
    pub faulty: bool,
    pub mandatory: bool,
}

impl Resource {
    pub fn new(name: impl Into<String>, holder: impl Into<Holder>, effect: ResourceEffect) -> Self {
        Self {
            name: name.into(),
            holder: holder.into(),
            effect,
            active: true,
            faulty: false,
            mandatory: false,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Active and not faulty.
    pub fn is_available(&self) -> bool {
        self.active && !self.faulty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub holder: Holder,
}

impl Sensor {
    pub fn new(name: impl Into<String>, holder: impl Into<Holder>) -> Self {
        Self {
            name: name.into(),
            holder: holder.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Links entering and leaving one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StepAdjacency {
    inputs: Vec<LinkId>,
    outputs: Vec<LinkId>,
}

/// Resources and sensors attached to one holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    pub resources: Vec<ResourceId>,
    pub sensors: Vec<SensorId>,
}

const NO_LINKS: &[LinkId] = &[];

// ---------------------------------------------------------------------------
// FactoryGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactoryGraph {
    locations: SlotMap<LocationId, Location>,
    steps: SlotMap<StepId, ProcessStep>,
    links: SlotMap<LinkId, TransportLink>,
    resources: SlotMap<ResourceId, Resource>,
    sensors: SlotMap<SensorId, Sensor>,
    adjacency: SecondaryMap<StepId, StepAdjacency>,
    step_attachments: SecondaryMap<StepId, Attachments>,
    link_attachments: SecondaryMap<LinkId, Attachments>,
}

impl FactoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Assembly --

    pub fn add_location(&mut self, name: impl Into<String>) -> LocationId {
        self.locations.insert(Location { name: name.into() })
    }

    pub fn add_step(&mut self, step: ProcessStep) -> Result<StepId, GraphError> {
        if let Some(loc) = step.location {
            if !self.locations.contains_key(loc) {
                return Err(GraphError::LocationNotFound(loc));
            }
        }
        let id = self.steps.insert(step);
        self.adjacency.insert(id, StepAdjacency::default());
        self.step_attachments.insert(id, Attachments::default());
        Ok(id)
    }

    pub fn add_link(&mut self, link: TransportLink) -> Result<LinkId, GraphError> {
        for step in [link.from, link.to] {
            if !self.steps.contains_key(step) {
                return Err(GraphError::StepNotFound(step));
            }
        }
        if link.from == link.to {
            return Err(GraphError::SelfLink(link.name, link.from));
        }
        let (from, to) = (link.from, link.to);
        let id = self.links.insert(link);
        if let Some(adj) = self.adjacency.get_mut(from) {
            adj.outputs.push(id);
        }
        if let Some(adj) = self.adjacency.get_mut(to) {
            adj.inputs.push(id);
        }
        self.link_attachments.insert(id, Attachments::default());
        Ok(id)
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<ResourceId, GraphError> {
        self.check_holder(resource.holder)?;
        let holder = resource.holder;
        let id = self.resources.insert(resource);
        if let Some(att) = self.attachments_mut(holder) {
            att.resources.push(id);
        }
        Ok(id)
    }

    pub fn add_sensor(&mut self, sensor: Sensor) -> Result<SensorId, GraphError> {
        self.check_holder(sensor.holder)?;
        let holder = sensor.holder;
        let id = self.sensors.insert(sensor);
        if let Some(att) = self.attachments_mut(holder) {
            att.sensors.push(id);
        }
        Ok(id)
    }

    fn check_holder(&self, holder: Holder) -> Result<(), GraphError> {
        match holder {
            Holder::Step(s) if !self.steps.contains_key(s) => Err(GraphError::StepNotFound(s)),
            Holder::Link(l) if !self.links.contains_key(l) => Err(GraphError::LinkNotFound(l)),
            _ => Ok(()),
        }
    }

    fn attachments_mut(&mut self, holder: Holder) -> Option<&mut Attachments> {
        match holder {
            Holder::Step(s) => self.step_attachments.get_mut(s),
            Holder::Link(l) => self.link_attachments.get_mut(l),
        }
    }

    // -- Lookup --

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn step(&self, id: StepId) -> Option<&ProcessStep> {
        self.steps.get(id)
    }

    pub fn step_mut(&mut self, id: StepId) -> Option<&mut ProcessStep> {
        self.steps.get_mut(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&TransportLink> {
        self.links.get(id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut TransportLink> {
        self.links.get_mut(id)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(id)
    }

    /// First step with the given name, in arena order.
    pub fn step_by_name(&self, name: &str) -> Option<StepId> {
        self.steps.iter().find(|(_, s)| s.name == name).map(|(id, _)| id)
    }

    pub fn link_by_name(&self, name: &str) -> Option<LinkId> {
        self.links.iter().find(|(_, l)| l.name == name).map(|(id, _)| id)
    }

    /// Links whose destination is `step`.
    pub fn inputs(&self, step: StepId) -> &[LinkId] {
        self.adjacency.get(step).map_or(NO_LINKS, |a| a.inputs.as_slice())
    }

    /// Links whose source is `step`.
    pub fn outputs(&self, step: StepId) -> &[LinkId] {
        self.adjacency.get(step).map_or(NO_LINKS, |a| a.outputs.as_slice())
    }

    pub fn attachments(&self, holder: Holder) -> Option<&Attachments> {
        match holder {
            Holder::Step(s) => self.step_attachments.get(s),
            Holder::Link(l) => self.link_attachments.get(l),
        }
    }

    /// Sensors attached to `holder`, empty if none.
    pub fn sensors_of(&self, holder: Holder) -> &[SensorId] {
        self.attachments(holder).map_or(&[][..], |a| a.sensors.as_slice())
    }

    /// Resources attached to `holder`.
    pub fn resources_of(&self, holder: Holder) -> impl Iterator<Item = &Resource> {
        self.attachments(holder)
            .into_iter()
            .flat_map(|a| a.resources.iter())
            .filter_map(|&r| self.resources.get(r))
    }

    // -- Iteration (arena order) --

    pub fn steps(&self) -> impl Iterator<Item = (StepId, &ProcessStep)> {
        self.steps.iter()
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &TransportLink)> {
        self.links.iter()
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.resources.iter()
    }

    pub fn sensors(&self) -> impl Iterator<Item = (SensorId, &Sensor)> {
        self.sensors.iter()
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.keys().collect()
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        self.links.keys().collect()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}
