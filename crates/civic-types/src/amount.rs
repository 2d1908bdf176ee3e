use serde::{Deserialize, Serialize};
use std::fmt;

/// Whole reward tokens accrued to an identity's pending balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RewardAmount(u64);

impl RewardAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens)
    }

    pub fn to_tokens(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for RewardAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} CVC", self.0)
    }
}

/// Declared material quantity in tenths of a unit (deci-kg for weighed
/// materials, deci-items for counted ones). Fixed point keeps reward
/// arithmetic exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub const ZERO: Self = Self(0);

    pub fn from_kg(kg: f64) -> Self {
        Self((kg.max(0.0) * 10.0).round() as u32)
    }

    pub fn from_count(count: u32) -> Self {
        Self(count * 10)
    }

    pub fn from_deci(deci: u32) -> Self {
        Self(deci)
    }

    pub fn to_deci(&self) -> u32 {
        self.0
    }

    pub fn to_kg(&self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Reward contribution at `rate` tokens per whole unit, in deci-tokens.
    pub fn deci_reward(&self, rate: u64) -> u64 {
        self.0 as u64 * rate
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.to_kg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_checked_math() {
        let a = RewardAmount::from_tokens(30);
        let b = RewardAmount::from_tokens(7);
        assert_eq!(a.checked_add(b), Some(RewardAmount::from_tokens(37)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), RewardAmount::ZERO);
    }

    #[test]
    fn test_quantity_fixed_point() {
        let q = Quantity::from_kg(2.5);
        assert_eq!(q.to_deci(), 25);
        assert_eq!(q.deci_reward(10), 250);
        assert_eq!(Quantity::from_count(3).deci_reward(25), 750);
    }
}
