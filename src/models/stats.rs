//! User statistics aggregates for efficient dashboard queries.
//!
//! These aggregates are pre-computed when activities are recorded,
//! so dashboards and the leaderboard read one document per user.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::reward::{RewardStatus, RewardTier};
use crate::models::Activity;
use crate::time_utils::{iso_week_key, month_key};

/// Pre-computed statistics for a user.
///
/// Stored at: `user_stats/{user_id}`
///
/// Updated atomically with activity writes via Firestore transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    /// Owner (duplicated so leaderboard queries need no join)
    #[serde(default)]
    pub user_id: String,

    // ─── Activity Stats ──────────────────────────────────────────
    #[serde(default)]
    pub total_activities: u32,
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub total_duration_hours: f64,

    // ─── Rewards ─────────────────────────────────────────────────
    /// FIXIE earned across all recorded activities
    #[serde(default)]
    pub total_rewards_earned: f64,
    /// FIXIE paid out on chain
    #[serde(default)]
    pub total_rewards_settled: f64,

    // ─── By Sport Type ───────────────────────────────────────────
    #[serde(default)]
    pub activities_by_sport: HashMap<String, u32>,
    #[serde(default)]
    pub distance_by_sport: HashMap<String, f64>,

    // ─── Time Series ─────────────────────────────────────────────
    /// Activity count per month ("YYYY-MM")
    #[serde(default)]
    pub activities_by_month: HashMap<String, u32>,
    /// Distance per ISO week ("YYYY-Www")
    #[serde(default)]
    pub distance_by_week: HashMap<String, f64>,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Set of recorded activity IDs (for duplicate detection)
    #[serde(default)]
    pub processed_activity_ids: HashSet<String>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Last update timestamp (RFC3339)
    #[serde(default)]
    pub updated_at: String,
}

impl UserStats {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    /// Update stats with a new activity.
    ///
    /// Returns `true` if the activity was counted (new).
    /// Returns `false` if the activity was already counted (duplicate).
    pub fn update_from_activity(&mut self, activity: &Activity, now: &str) -> bool {
        if self.processed_activity_ids.contains(&activity.id) {
            return false;
        }

        self.processed_activity_ids.insert(activity.id.clone());
        if self.user_id.is_empty() {
            self.user_id = activity.user_id.clone();
        }
        self.updated_at = now.to_string();

        self.total_activities += 1;
        self.total_distance_km += activity.distance_km;
        self.total_duration_hours += activity.duration_hours;
        self.total_rewards_earned += activity.reward.total;

        *self
            .activities_by_sport
            .entry(activity.sport_type.clone())
            .or_insert(0) += 1;
        *self
            .distance_by_sport
            .entry(activity.sport_type.clone())
            .or_insert(0.0) += activity.distance_km;

        if let Some(month) = month_key(&activity.start_date) {
            *self.activities_by_month.entry(month).or_insert(0) += 1;
        }
        if let Some(week) = iso_week_key(&activity.start_date) {
            *self.distance_by_week.entry(week).or_insert(0.0) += activity.distance_km;
        }

        true
    }

    /// Recompute an aggregate from scratch, e.g. after a deletion.
    pub fn rebuild<'a>(
        user_id: &str,
        activities: impl IntoIterator<Item = &'a Activity>,
        now: &str,
    ) -> Self {
        let mut stats = Self::new(user_id);
        for activity in activities {
            if stats.update_from_activity(activity, now)
                && activity.reward_status == RewardStatus::Settled
            {
                stats.total_rewards_settled += activity.reward.total;
            }
        }
        stats.updated_at = now.to_string();
        stats
    }

    /// Account for a reward that was paid out on chain.
    pub fn record_settlement(&mut self, amount: f64, now: &str) {
        self.total_rewards_settled += amount;
        self.updated_at = now.to_string();
    }

    /// Rewards earned but not yet settled.
    pub fn pending_rewards(&self) -> f64 {
        (self.total_rewards_earned - self.total_rewards_settled).max(0.0)
    }

    pub fn tier(&self) -> RewardTier {
        RewardTier::for_distance(self.total_distance_km)
    }
}
