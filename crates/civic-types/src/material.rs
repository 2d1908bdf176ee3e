use crate::amount::{Quantity, RewardAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Adjudication domain a claim, warning counter, or blacklist flag
/// belongs to. Counters in one domain never affect the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Water,
    Recycling,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Water => write!(f, "water"),
            Domain::Recycling => write!(f, "recycling"),
        }
    }
}

/// Declared recycling material types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MaterialType {
    Plastic,
    Glass,
    Metal,
    Paper,
    Electronic,
}

impl MaterialType {
    pub const ALL: [MaterialType; 5] = [
        MaterialType::Plastic,
        MaterialType::Glass,
        MaterialType::Metal,
        MaterialType::Paper,
        MaterialType::Electronic,
    ];

    /// Whether this material is declared as an item count rather than a weight.
    pub fn is_counted(&self) -> bool {
        matches!(self, MaterialType::Electronic)
    }

    pub fn unit(&self) -> &'static str {
        if self.is_counted() {
            "item"
        } else {
            "kg"
        }
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MaterialType::Plastic => "plastic",
            MaterialType::Glass => "glass",
            MaterialType::Metal => "metal",
            MaterialType::Paper => "paper",
            MaterialType::Electronic => "electronic",
        };
        write!(f, "{}", s)
    }
}

/// Per-material reward rates (tokens per whole unit) and declaration caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRates {
    pub rates: BTreeMap<MaterialType, u64>,
    /// Maximum quantity per weighed material.
    pub max_weight: Quantity,
    /// Maximum quantity per counted material.
    pub max_count: Quantity,
}

impl Default for RewardRates {
    fn default() -> Self {
        let rates = BTreeMap::from([
            (MaterialType::Plastic, 10),
            (MaterialType::Glass, 12),
            (MaterialType::Metal, 15),
            (MaterialType::Paper, 8),
            (MaterialType::Electronic, 25),
        ]);
        Self {
            rates,
            max_weight: Quantity::from_kg(100.0),
            max_count: Quantity::from_count(20),
        }
    }
}

impl RewardRates {
    pub fn rate(&self, material: MaterialType) -> u64 {
        self.rates.get(&material).copied().unwrap_or(0)
    }

    pub fn cap(&self, material: MaterialType) -> Quantity {
        if material.is_counted() {
            self.max_count
        } else {
            self.max_weight
        }
    }

    /// Total reward for a set of declared quantities, floored to whole tokens.
    pub fn total_reward(&self, quantities: &BTreeMap<MaterialType, Quantity>) -> RewardAmount {
        let deci: u64 = quantities
            .iter()
            .map(|(material, qty)| qty.deci_reward(self.rate(*material)))
            .sum();
        RewardAmount::from_tokens(deci / 10)
    }
}
