use crate::id::{MaterialId, RecipeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A material type definition in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDef {
    pub name: String,
}

/// A recipe input/output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub material: MaterialId,
    pub quantity: u32,
}

impl RecipeEntry {
    pub fn new(material: MaterialId, quantity: u32) -> Self {
        Self { material, quantity }
    }
}

/// A recipe definition. One run consumes every input and yields every output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub inputs: Vec<RecipeEntry>,
    pub outputs: Vec<RecipeEntry>,
}

impl Recipe {
    /// Units of `material` one run consumes (0 if not an input).
    pub fn requires(&self, material: MaterialId) -> u32 {
        self.inputs
            .iter()
            .filter(|e| e.material == material)
            .map(|e| e.quantity)
            .sum()
    }

    /// Total input units consumed per run.
    pub fn consumed_per_run(&self) -> u32 {
        self.inputs.iter().map(|e| e.quantity).sum()
    }

    /// Total output units produced per run.
    pub fn produced_per_run(&self) -> u32 {
        self.outputs.iter().map(|e| e.quantity).sum()
    }
}

/// Errors from registry construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate recipe name: {0}")]
    DuplicateRecipe(String),
    #[error("recipe {recipe} references unknown material {material:?}")]
    UnknownMaterial { recipe: String, material: MaterialId },
}

/// Builder for constructing an immutable [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    materials: Vec<MaterialDef>,
    material_name_to_id: BTreeMap<String, MaterialId>,
    recipes: Vec<Recipe>,
    recipe_name_to_id: BTreeMap<String, RecipeId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material type. Registering a known name returns its ID.
    pub fn register_material(&mut self, name: &str) -> MaterialId {
        if let Some(&id) = self.material_name_to_id.get(name) {
            return id;
        }
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(MaterialDef {
            name: name.to_string(),
        });
        self.material_name_to_id.insert(name.to_string(), id);
        id
    }

    pub fn register_recipe(
        &mut self,
        name: &str,
        inputs: Vec<RecipeEntry>,
        outputs: Vec<RecipeEntry>,
    ) -> Result<RecipeId, RegistryError> {
        if self.recipe_name_to_id.contains_key(name) {
            return Err(RegistryError::DuplicateRecipe(name.to_string()));
        }
        let known = self.materials.len() as u32;
        if let Some(entry) = inputs.iter().chain(&outputs).find(|e| e.material.0 >= known) {
            return Err(RegistryError::UnknownMaterial {
                recipe: name.to_string(),
                material: entry.material,
            });
        }
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(Recipe {
            name: name.to_string(),
            inputs,
            outputs,
        });
        self.recipe_name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_name_to_id.get(name).copied()
    }

    /// Freeze into an immutable registry.
    pub fn build(self) -> Registry {
        Registry {
            materials: self.materials,
            material_name_to_id: self.material_name_to_id,
            recipes: self.recipes,
            recipe_name_to_id: self.recipe_name_to_id,
        }
    }
}

/// Immutable registry of materials and recipes, frozen for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    materials: Vec<MaterialDef>,
    material_name_to_id: BTreeMap<String, MaterialId>,
    recipes: Vec<Recipe>,
    recipe_name_to_id: BTreeMap<String, RecipeId>,
}

impl Registry {
    pub fn material(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.materials.get(id.0 as usize)
    }

    pub fn material_name(&self, id: MaterialId) -> &str {
        self.material(id).map_or("<unknown>", |m| m.name.as_str())
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_name_to_id.get(name).copied()
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(id.0 as usize)
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}
