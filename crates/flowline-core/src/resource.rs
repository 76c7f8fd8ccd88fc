//! Resource influence: how attached resources scale a holder's rates.
//!
//! Resources are split into production and inventory groups. Each group
//! folds into one multiplier:
//!
//! - an empty group yields 1;
//! - a group with exactly one mandatory resource yields 0 while that
//!   resource is unavailable;
//! - otherwise the multiplier is available resources / total resources.
//!
//! Steps apply the production multiplier to their recipe rate and the
//! inventory multiplier to their speeds. Links apply both to their speeds.

use crate::fixed::{Fixed64, floor_units, scale_floor};
use crate::graph::{Resource, ResourceEffect};
use serde::{Deserialize, Serialize};

/// Multipliers for one holder, recomputed at the start of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multipliers {
    pub production: Fixed64,
    pub inventory: Fixed64,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            production: Fixed64::ONE,
            inventory: Fixed64::ONE,
        }
    }
}

impl Multipliers {
    pub fn compute<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut production = Group::default();
        let mut inventory = Group::default();
        for r in resources {
            match r.effect {
                ResourceEffect::Production => production.add(r),
                ResourceEffect::Inventory => inventory.add(r),
            }
        }
        Self {
            production: production.multiplier(),
            inventory: inventory.multiplier(),
        }
    }

    /// Recipe runs a step may attempt this tick.
    pub fn recipe_runs(&self, recipe_rate: Fixed64) -> u32 {
        floor_units(recipe_rate.saturating_mul(self.production))
    }

    /// Effective step speed.
    pub fn step_speed(&self, base: u32) -> u32 {
        scale_floor(base, self.inventory)
    }

    /// Effective link speed.
    pub fn link_speed(&self, base: u32) -> u32 {
        scale_floor(base, self.production.saturating_mul(self.inventory))
    }
}

#[derive(Default)]
struct Group {
    total: u32,
    available: u32,
    mandatory: u32,
    mandatory_down: u32,
}

impl Group {
    fn add(&mut self, r: &Resource) {
        self.total += 1;
        if r.mandatory {
            self.mandatory += 1;
        }
        if r.is_available() {
            self.available += 1;
        } else if r.mandatory {
            self.mandatory_down += 1;
        }
    }

    fn multiplier(&self) -> Fixed64 {
        if self.total == 0 {
            return Fixed64::ONE;
        }
        // A sole mandatory resource is a hard stop; several degrade like the rest.
        if self.mandatory == 1 && self.mandatory_down == 1 {
            return Fixed64::ZERO;
        }
        Fixed64::from_num(self.available) / Fixed64::from_num(self.total)
    }
}
