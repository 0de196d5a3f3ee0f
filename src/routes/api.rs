// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, SESSION_COOKIE};
use crate::models::{Activity, RewardBreakdown, RewardStatus, RewardTier, User, UserStats};
use crate::services::activity::{ActivityService, NewActivity};
use crate::services::tracks::{self, TrackFormat};
use crate::time_utils::parse_rfc3339_utc;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/stats", get(get_stats))
        .route("/api/account", delete(delete_account))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/activities", get(get_activities).post(create_activity))
        .route("/api/activities/upload", post(upload_activity))
        .route(
            "/api/activities/{id}",
            get(get_activity).delete(delete_activity),
        )
        .route("/api/activities/{id}/track", get(get_activity_track))
        .route("/api/activities/{id}/claim", post(claim_reward))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub wallet_address: String,
    pub display_name: Option<String>,
    pub created_at: String,
    pub tier: RewardTier,
    pub next_tier: Option<RewardTier>,
    /// Kilometres to the next tier; absent at the top tier
    pub km_to_next_tier: Option<f64>,
    pub total_distance_km: f64,
    pub minted_tiers: Vec<RewardTier>,
}

impl UserResponse {
    pub fn new(user: &User, stats: Option<&UserStats>) -> Self {
        let distance = stats.map(|s| s.total_distance_km).unwrap_or(0.0);
        let tier = RewardTier::for_distance(distance);
        Self {
            id: user.id.clone(),
            wallet_address: user.wallet_address.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at.clone(),
            tier,
            next_tier: tier.next_tier(),
            km_to_next_tier: RewardTier::km_to_next_tier(distance),
            total_distance_km: distance,
            minted_tiers: user.minted_tiers.clone(),
        }
    }
}

async fn load_user(state: &AppState, user_id: &str) -> Result<User> {
    state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = load_user(&state, &user.user_id).await?;
    let stats = state.db.get_user_stats(&user.user_id).await?;
    Ok(Json(UserResponse::new(&profile, stats.as_ref())))
}

#[derive(Deserialize, Validate)]
pub struct UpdateProfileRequest {
    /// `null` clears the display name
    #[validate(length(min = 1, max = 50))]
    pub display_name: Option<String>,
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(mut body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    body.display_name = body.display_name.map(|n| n.trim().to_string());
    body.validate()?;

    let mut profile = load_user(&state, &user.user_id).await?;
    profile.display_name = body.display_name;
    state.db.upsert_user(&profile).await?;

    let stats = state.db.get_user_stats(&user.user_id).await?;
    Ok(Json(UserResponse::new(&profile, stats.as_ref())))
}

// ─── Stats ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StatsResponse {
    pub total_activities: u32,
    pub total_distance_km: f64,
    pub total_duration_hours: f64,
    pub total_rewards_earned: f64,
    pub total_rewards_settled: f64,
    pub pending_rewards: f64,
    pub tier: RewardTier,
    pub activities_by_sport: HashMap<String, u32>,
    pub distance_by_sport: HashMap<String, f64>,
    pub activities_by_month: HashMap<String, u32>,
    pub distance_by_week: HashMap<String, f64>,
    pub updated_at: String,
}

impl From<UserStats> for StatsResponse {
    fn from(stats: UserStats) -> Self {
        Self {
            pending_rewards: stats.pending_rewards(),
            tier: stats.tier(),
            total_activities: stats.total_activities,
            total_distance_km: stats.total_distance_km,
            total_duration_hours: stats.total_duration_hours,
            total_rewards_earned: stats.total_rewards_earned,
            total_rewards_settled: stats.total_rewards_settled,
            activities_by_sport: stats.activities_by_sport,
            distance_by_sport: stats.distance_by_sport,
            activities_by_month: stats.activities_by_month,
            distance_by_week: stats.distance_by_week,
            updated_at: stats.updated_at,
        }
    }
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StatsResponse>> {
    let stats = state
        .db
        .get_user_stats(&user.user_id)
        .await?
        .unwrap_or_else(|| UserStats::new(&user.user_id));
    Ok(Json(stats.into()))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    limit: u32,
}

fn default_leaderboard_limit() -> u32 {
    10
}

const MAX_LEADERBOARD_LIMIT: u32 = 100;

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub display_name: Option<String>,
    pub total_distance_km: f64,
    pub total_activities: u32,
    pub tier: RewardTier,
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let limit = params.limit.clamp(1, MAX_LEADERBOARD_LIMIT);
    if let Some(cached) = state.leaderboard_cache.get(&limit) {
        return Ok(Json(cached));
    }

    let top = state.db.top_stats_by_distance(limit).await?;
    let user_ids: Vec<String> = top.iter().map(|s| s.user_id.clone()).collect();
    let names: HashMap<String, Option<String>> = state
        .db
        .get_users(&user_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u.display_name))
        .collect();

    let entries: Vec<LeaderboardEntry> = top
        .into_iter()
        .enumerate()
        .map(|(i, stats)| LeaderboardEntry {
            rank: i as u32 + 1,
            display_name: names.get(&stats.user_id).cloned().flatten(),
            tier: stats.tier(),
            total_distance_km: stats.total_distance_km,
            total_activities: stats.total_activities,
            user_id: stats.user_id,
        })
        .collect();

    state.leaderboard_cache.insert(limit, entries.clone());
    Ok(Json(entries))
}

// ─── Account Deletion ────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub deleted_documents: u32,
}

/// Delete the user's profile, activities and stats. Tokens and NFTs
/// already on chain stay with the wallet.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<DeleteAccountResponse>)> {
    tracing::info!(user_id = %user.user_id, "User-initiated account deletion");

    let deleted = state.db.delete_user_data(&user.user_id).await?;
    state.invalidate_chain_cache(&user.user_id);

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(DeleteAccountResponse {
            success: true,
            deleted_documents: deleted as u32,
        }),
    ))
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityResponse {
    pub id: String,
    pub name: String,
    pub sport_type: String,
    pub start_date: String,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub average_speed_kmh: f64,
    pub source: String,
    pub has_track: bool,
    pub track_points: u32,
    pub reward: RewardBreakdown,
    pub reward_status: RewardStatus,
    pub reward_tx_hash: Option<String>,
    pub settled_at: Option<String>,
}

impl From<Activity> for ActivityResponse {
    fn from(a: Activity) -> Self {
        Self {
            has_track: a.summary_polyline.is_some(),
            id: a.id,
            name: a.name,
            sport_type: a.sport_type,
            start_date: a.start_date,
            distance_km: a.distance_km,
            duration_hours: a.duration_hours,
            average_speed_kmh: a.average_speed_kmh,
            source: a.source,
            track_points: a.track_points,
            reward: a.reward,
            reward_status: a.reward_status,
            reward_tx_hash: a.reward_tx_hash,
            settled_at: a.settled_at,
        }
    }
}

async fn create_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NewActivity>,
) -> Result<(StatusCode, Json<ActivityResponse>)> {
    let activity = ActivityService::new(&state.db, &state.rewards)
        .record(&user.user_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(activity.into())))
}

#[derive(Deserialize)]
struct UploadQuery {
    format: Option<String>,
    name: Option<String>,
    sport_type: Option<String>,
}

/// Record an activity from a raw GPX or TCX request body.
async fn upload_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<UploadQuery>,
    body: String,
) -> Result<(StatusCode, Json<ActivityResponse>)> {
    let format = params
        .format
        .as_deref()
        .map(str::parse::<TrackFormat>)
        .transpose()?;

    let activity = ActivityService::new(&state.db, &state.rewards)
        .record_upload(&user.user_id, &body, format, params.name, params.sport_type)
        .await?;
    Ok((StatusCode::CREATED, Json(activity.into())))
}

async fn load_owned_activity(state: &AppState, user_id: &str, activity_id: &str) -> Result<Activity> {
    state
        .db
        .get_activity(activity_id)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("Activity {}", activity_id)))
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<Json<ActivityResponse>> {
    let activity = load_owned_activity(&state, &user.user_id, &activity_id).await?;
    Ok(Json(activity.into()))
}

/// Recorded track as a GeoJSON Feature.
async fn get_activity_track(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<Json<geojson::Feature>> {
    let activity = load_owned_activity(&state, &user.user_id, &activity_id).await?;
    let encoded = activity
        .summary_polyline
        .as_deref()
        .ok_or_else(|| AppError::NotFound(format!("Activity {} has no track", activity_id)))?;
    let points = tracks::decode_track(encoded)?;

    let mut properties = serde_json::Map::new();
    properties.insert("id".to_string(), activity.id.clone().into());
    properties.insert("name".to_string(), activity.name.clone().into());
    properties.insert("distance_km".to_string(), activity.distance_km.into());
    properties.insert("start_date".to_string(), activity.start_date.clone().into());

    Ok(Json(tracks::track_to_geojson(&points, properties)))
}

async fn delete_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<StatusCode> {
    load_owned_activity(&state, &user.user_id, &activity_id).await?;
    state.db.delete_activity(&activity_id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Settle the activity's reward on chain.
async fn claim_reward(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<Json<ActivityResponse>> {
    let chain = state.chain()?;
    let result = ActivityService::new(&state.db, &state.rewards)
        .settle(chain, &user.user_id, &activity_id)
        .await;
    state.invalidate_chain_cache(&user.user_id);
    Ok(Json(result?.into()))
}

// ─── Activity Listing ────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Only activities starting after this instant (RFC3339)
    after: Option<String>,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    50
}

const MAX_PER_PAGE: u32 = 100;

fn parse_after(after: Option<&str>) -> Result<Option<String>> {
    after
        .map(|raw| {
            parse_rfc3339_utc(raw)
                .map(crate::time_utils::format_utc_rfc3339)
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "Invalid 'after' parameter: must be RFC3339 datetime".to_string(),
                    )
                })
        })
        .transpose()
}

/// Decode a cursor back into the `sort_key` it wraps.
fn parse_cursor(cursor: Option<&str>) -> Result<Option<String>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let sort_key = String::from_utf8(decoded).map_err(|_| invalid_cursor())?;

            let (date, id) = sort_key.split_once('#').ok_or_else(invalid_cursor)?;
            if parse_rfc3339_utc(date).is_none() || id.is_empty() {
                return Err(invalid_cursor());
            }
            Ok(sort_key)
        })
        .transpose()
}

fn encode_cursor(sort_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(sort_key)
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivityResponse>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

/// List the user's activities, newest first.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    tracing::debug!(
        user_id = %user.user_id,
        after = ?params.after,
        cursor = ?params.cursor,
        "Fetching activities"
    );

    if params.per_page == 0 {
        return Err(AppError::BadRequest(
            "per_page must be greater than 0".to_string(),
        ));
    }
    let limit = params.per_page.min(MAX_PER_PAGE);
    let after = parse_after(params.after.as_deref())?;
    let cursor = parse_cursor(params.cursor.as_deref())?;

    // Fetch one extra item to determine if another page is available.
    let mut results = state
        .db
        .get_activities_for_user(
            &user.user_id,
            after.as_deref(),
            cursor.as_deref(),
            limit.saturating_add(1),
        )
        .await?;

    let has_more = results.len() > limit as usize;
    if has_more {
        results.truncate(limit as usize);
    }
    let next_cursor = if has_more {
        results.last().map(|a| encode_cursor(&a.sort_key))
    } else {
        None
    };

    Ok(Json(ActivitiesResponse {
        activities: results.into_iter().map(Into::into).collect(),
        per_page: limit,
        next_cursor,
    }))
}
