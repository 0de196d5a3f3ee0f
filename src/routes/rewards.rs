// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward calculator and tier routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{RewardBreakdown, RewardTier, UserStats};
use crate::services::rewards::RewardConfig;
use crate::AppState;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Routes that need no session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rewards/calculate", post(calculate))
        .route("/api/rewards/tiers", get(list_tiers))
}

/// Routes behind `require_auth`.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/rewards/summary", get(summary))
}

#[derive(Deserialize)]
pub struct CalculateRequest {
    pub distance_km: f64,
    pub duration_hours: f64,
    /// Cumulative distance, to report the resulting tier
    #[serde(default)]
    pub cumulative_km: Option<f64>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculateResponse {
    pub breakdown: RewardBreakdown,
    pub tier: Option<RewardTier>,
    pub rates: RewardRates,
}

/// Active reward rates, as reported to clients.
#[derive(Serialize, Clone, Copy)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardRates {
    pub base: f64,
    pub distance_rate: f64,
    pub time_rate: f64,
    pub weekly_bonus: f64,
    pub bonus_threshold_km: f64,
}

impl From<&RewardConfig> for RewardRates {
    fn from(c: &RewardConfig) -> Self {
        Self {
            base: c.base,
            distance_rate: c.distance_rate,
            time_rate: c.time_rate,
            weekly_bonus: c.weekly_bonus,
            bonus_threshold_km: c.bonus_threshold_km,
        }
    }
}

/// Price a hypothetical activity.
async fn calculate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>> {
    let breakdown = state
        .rewards
        .calculate(body.distance_km, body.duration_hours)?;

    Ok(Json(CalculateResponse {
        breakdown,
        tier: body.cumulative_km.map(RewardTier::for_distance),
        rates: state.rewards.config().into(),
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TierInfo {
    pub tier: RewardTier,
    pub min_distance_km: f64,
    /// Lower bound of the next tier; absent for the top tier
    pub max_distance_km: Option<f64>,
}

fn tier_table() -> Vec<TierInfo> {
    RewardTier::ALL
        .iter()
        .map(|&tier| TierInfo {
            tier,
            min_distance_km: tier.min_distance_km(),
            max_distance_km: tier.next_tier().map(RewardTier::min_distance_km),
        })
        .collect()
}

async fn list_tiers() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(tier_table()),
    )
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardSummary {
    pub total_earned: f64,
    pub total_settled: f64,
    pub pending: f64,
    pub total_activities: u32,
    pub tier: RewardTier,
    pub rates: RewardRates,
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RewardSummary>> {
    let stats = state
        .db
        .get_user_stats(&user.user_id)
        .await?
        .unwrap_or_else(|| UserStats::new(&user.user_id));

    Ok(Json(RewardSummary {
        total_earned: stats.total_rewards_earned,
        total_settled: stats.total_rewards_settled,
        pending: stats.pending_rewards(),
        total_activities: stats.total_activities,
        tier: stats.tier(),
        rates: state.rewards.config().into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table_is_contiguous() {
        let table = tier_table();
        assert_eq!(table.len(), RewardTier::ALL.len());
        assert_eq!(table[0].min_distance_km, 0.0);
        for pair in table.windows(2) {
            assert_eq!(pair[0].max_distance_km, Some(pair[1].min_distance_km));
        }
        assert_eq!(table.last().unwrap().max_distance_km, None);
    }
}
