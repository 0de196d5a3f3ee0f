// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity model for storage and API.

use serde::{Deserialize, Serialize};

use crate::models::reward::{RewardBreakdown, RewardStatus};

/// Stored activity record in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Activity ID (UUID, also used as document ID)
    pub id: String,
    /// Owner's user ID (lowercase wallet address)
    pub user_id: String,
    /// Activity name/title
    pub name: String,
    /// Sport type (Ride, Run, ...)
    pub sport_type: String,
    /// Start date/time (RFC3339, `Z` suffix, second precision)
    pub start_date: String,
    /// `"{start_date}#{id}"`, used for newest-first cursor pagination
    pub sort_key: String,
    /// Distance in kilometres
    pub distance_km: f64,
    /// Moving duration in hours
    pub duration_hours: f64,
    /// Average speed in km/h
    pub average_speed_kmh: f64,
    /// Encoded polyline (precision 5) of the GPS track, if one was recorded
    #[serde(default)]
    pub summary_polyline: Option<String>,
    /// Number of points in the recorded track
    #[serde(default)]
    pub track_points: u32,
    /// Source: "manual", "gpx" or "tcx"
    pub source: String,
    /// Reward computed when the activity was recorded
    pub reward: RewardBreakdown,
    /// Settlement state of the reward
    #[serde(default)]
    pub reward_status: RewardStatus,
    /// Hash of the settlement transaction
    #[serde(default)]
    pub reward_tx_hash: Option<String>,
    /// When the reward was settled (RFC3339)
    #[serde(default)]
    pub settled_at: Option<String>,
    /// When this activity was recorded (RFC3339)
    pub created_at: String,
}

impl Activity {
    pub fn make_sort_key(start_date: &str, id: &str) -> String {
        format!("{}#{}", start_date, id)
    }
}
