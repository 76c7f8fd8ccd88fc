use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a location (a named area grouping process steps).
    pub struct LocationId;

    /// Identifies a process step in the factory graph.
    pub struct StepId;

    /// Identifies a transport link between two process steps.
    pub struct LinkId;

    /// Identifies a resource attached to a step or link.
    pub struct ResourceId;

    /// Identifies a sensor attached to a step or link.
    pub struct SensorId;
}

/// Identifies a material type in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Identifies a recipe in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Identifies a customer order. Assigned by whoever authors the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u32);

/// The owner of an inventory. Every step and every link carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Holder {
    Step(StepId),
    Link(LinkId),
}

impl From<StepId> for Holder {
    fn from(id: StepId) -> Self {
        Holder::Step(id)
    }
}

impl From<LinkId> for Holder {
    fn from(id: LinkId) -> Self {
        Holder::Link(id)
    }
}
