// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward breakdown, tier and settlement status models.

use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// FIXIE reward for a single activity, split by component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardBreakdown {
    /// Flat amount paid for every activity
    pub base: f64,
    /// distance_km * distance_rate
    pub distance: f64,
    /// duration_hours * time_rate
    pub time: f64,
    /// Long-ride bonus (0 unless distance exceeded the threshold)
    pub bonus: f64,
    /// Sum of all components
    pub total: f64,
}

/// Reward tier derived from cumulative distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum RewardTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl RewardTier {
    /// All tiers in ascending order.
    pub const ALL: [RewardTier; 5] = [
        RewardTier::Bronze,
        RewardTier::Silver,
        RewardTier::Gold,
        RewardTier::Platinum,
        RewardTier::Diamond,
    ];

    /// Cumulative kilometres needed to reach this tier (inclusive).
    pub fn min_distance_km(self) -> f64 {
        match self {
            RewardTier::Bronze => 0.0,
            RewardTier::Silver => 100.0,
            RewardTier::Gold => 500.0,
            RewardTier::Platinum => 1000.0,
            RewardTier::Diamond => 5000.0,
        }
    }

    /// Tier for a cumulative distance.
    ///
    /// Negative and non-finite inputs fall back to `Bronze`.
    pub fn for_distance(cumulative_km: f64) -> Self {
        if !cumulative_km.is_finite() {
            return RewardTier::Bronze;
        }
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| cumulative_km >= tier.min_distance_km())
            .unwrap_or(RewardTier::Bronze)
    }

    pub fn next_tier(self) -> Option<Self> {
        match self {
            RewardTier::Bronze => Some(RewardTier::Silver),
            RewardTier::Silver => Some(RewardTier::Gold),
            RewardTier::Gold => Some(RewardTier::Platinum),
            RewardTier::Platinum => Some(RewardTier::Diamond),
            RewardTier::Diamond => None,
        }
    }

    /// Kilometres remaining until the next tier, or `None` at the top tier.
    pub fn km_to_next_tier(cumulative_km: f64) -> Option<f64> {
        Self::for_distance(cumulative_km)
            .next_tier()
            .map(|next| (next.min_distance_km() - cumulative_km.max(0.0)).max(0.0))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RewardTier::Bronze => "Bronze",
            RewardTier::Silver => "Silver",
            RewardTier::Gold => "Gold",
            RewardTier::Platinum => "Platinum",
            RewardTier::Diamond => "Diamond",
        }
    }
}

impl fmt::Display for RewardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-chain settlement state of an activity reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum RewardStatus {
    /// Computed and stored, not yet paid out
    #[default]
    Pending,
    /// Reward transaction mined successfully
    Settled,
    /// Last settlement attempt failed; may be retried
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_breakpoints() {
        assert_eq!(RewardTier::for_distance(0.0), RewardTier::Bronze);
        assert_eq!(RewardTier::for_distance(99.9), RewardTier::Bronze);
        assert_eq!(RewardTier::for_distance(100.0), RewardTier::Silver);
        assert_eq!(RewardTier::for_distance(499.99), RewardTier::Silver);
        assert_eq!(RewardTier::for_distance(500.0), RewardTier::Gold);
        assert_eq!(RewardTier::for_distance(1000.0), RewardTier::Platinum);
        assert_eq!(RewardTier::for_distance(5000.0), RewardTier::Diamond);
        assert_eq!(RewardTier::for_distance(1.0e9), RewardTier::Diamond);
    }

    #[test]
    fn test_tier_is_monotonic_in_distance() {
        let mut previous = RewardTier::Bronze;
        let mut km = 0.0;
        while km < 6000.0 {
            let tier = RewardTier::for_distance(km);
            assert!(tier >= previous, "tier dropped at {} km", km);
            previous = tier;
            km += 12.5;
        }
        assert_eq!(previous, RewardTier::Diamond);
    }

    #[test]
    fn test_invalid_distance_is_bronze() {
        assert_eq!(RewardTier::for_distance(-5.0), RewardTier::Bronze);
        assert_eq!(RewardTier::for_distance(f64::NAN), RewardTier::Bronze);
        assert_eq!(RewardTier::for_distance(f64::INFINITY), RewardTier::Bronze);
    }

    #[test]
    fn test_km_to_next_tier() {
        assert_eq!(RewardTier::km_to_next_tier(40.0), Some(60.0));
        assert_eq!(RewardTier::km_to_next_tier(100.0), Some(400.0));
        assert_eq!(RewardTier::km_to_next_tier(7000.0), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RewardStatus::Settled).unwrap();
        assert_eq!(json, "\"settled\"");
    }
}
