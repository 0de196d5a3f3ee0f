// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity recording and reward settlement.
//!
//! Recording:
//! 1. Validate the submitted effort (or parse an uploaded GPX/TCX track)
//! 2. Let the track override distance and duration when it can
//! 3. Compute the reward breakdown
//! 4. Store the activity and update user stats in one transaction
//!
//! Settlement pays a stored reward through the FIXIE token contract.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{Activity, RewardStatus, TrackPoint};
use crate::services::chain::{parse_address, ChainService};
use crate::services::rewards::{to_token_units, RewardCalculator};
use crate::services::tracks::{self, TrackFormat};
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339_utc};
use chrono::{DateTime, Utc};
use ethers::providers::Middleware;
use serde::Deserialize;
use validator::Validate;

/// Longest accepted activity, in kilometres.
pub const MAX_DISTANCE_KM: f64 = 1000.0;
/// Longest accepted activity, in hours.
pub const MAX_DURATION_HOURS: f64 = 48.0;
/// Fastest plausible average speed for a human-powered activity.
pub const MAX_AVERAGE_SPEED_KMH: f64 = 80.0;

fn default_sport_type() -> String {
    "Ride".to_string()
}

/// Activity submitted by a user.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewActivity {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default = "default_sport_type")]
    #[validate(length(min = 1, max = 50))]
    pub sport_type: String,
    /// RFC3339; defaults to the first track timestamp, then to now
    #[serde(default)]
    pub start_date: Option<String>,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub distance_km: f64,
    #[validate(range(exclusive_min = 0.0, max = 48.0))]
    pub duration_hours: f64,
    #[serde(default)]
    pub track: Option<Vec<TrackPoint>>,
}

/// Records activities and settles their rewards.
pub struct ActivityService<'a> {
    db: &'a FirestoreDb,
    rewards: &'a RewardCalculator,
}

impl<'a> ActivityService<'a> {
    pub fn new(db: &'a FirestoreDb, rewards: &'a RewardCalculator) -> Self {
        Self { db, rewards }
    }

    /// Validate, price and store a submitted activity.
    pub async fn record(&self, user_id: &str, input: NewActivity) -> Result<Activity> {
        self.record_from(user_id, input, "manual").await
    }

    /// Parse a GPX/TCX document and record it.
    pub async fn record_upload(
        &self,
        user_id: &str,
        xml: &str,
        format: Option<TrackFormat>,
        name: Option<String>,
        sport_type: Option<String>,
    ) -> Result<Activity> {
        let format = match format {
            Some(f) => f,
            None => TrackFormat::detect(xml)
                .ok_or_else(|| AppError::BadRequest("Unrecognized track document".to_string()))?,
        };
        let points = tracks::parse_track(xml, Some(format))?;
        let summary = tracks::summarize(&points)?;
        let duration_hours = summary.duration_hours.ok_or_else(|| {
            AppError::BadRequest("Uploaded track has no usable timestamps".to_string())
        })?;

        tracing::debug!(
            user_id,
            format = format.as_str(),
            points = summary.point_count,
            distance_km = summary.distance_km,
            "Parsed uploaded track"
        );

        let input = NewActivity {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("{} upload", format.as_str().to_uppercase())),
            sport_type: sport_type.unwrap_or_else(default_sport_type),
            start_date: summary.start_time.map(format_utc_rfc3339),
            distance_km: summary.distance_km.min(MAX_DISTANCE_KM),
            duration_hours: duration_hours.min(MAX_DURATION_HOURS),
            track: Some(points),
        };

        self.record_from(user_id, input, format.as_str()).await
    }

    async fn record_from(&self, user_id: &str, input: NewActivity, source: &str) -> Result<Activity> {
        let activity = build_activity(user_id, input, self.rewards, source, Utc::now())?;

        let was_new = self.db.record_activity_atomic(&activity).await?;
        if !was_new {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        tracing::info!(
            user_id,
            activity_id = %activity.id,
            distance_km = activity.distance_km,
            reward = activity.reward.total,
            "Activity recorded"
        );

        Ok(activity)
    }

    /// Pay out a stored reward on chain.
    ///
    /// `Settled` is final. A failed transaction leaves the activity `Failed`
    /// so the claim can be retried.
    pub async fn settle<M: Middleware + 'static>(
        &self,
        chain: &ChainService<M>,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Activity> {
        let activity = self
            .db
            .get_activity(activity_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Activity {}", activity_id)))?;

        if activity.reward_status == RewardStatus::Settled {
            return Err(AppError::Conflict(format!(
                "Reward for activity {} already settled",
                activity_id
            )));
        }

        let recipient = parse_address(user_id)?;
        let amount = to_token_units(activity.reward.total)?;

        tracing::info!(
            user_id,
            activity_id,
            reward = activity.reward.total,
            "Settling activity reward"
        );

        match chain.reward_activity(recipient, &activity.id, amount).await {
            Ok(outcome) => {
                let mut settled = activity;
                settled.reward_status = RewardStatus::Settled;
                settled.reward_tx_hash = Some(outcome.tx_hash.clone());
                settled.settled_at = Some(format_utc_rfc3339(Utc::now()));

                let recorded = match self.db.settle_activity_atomic(&settled).await {
                    Ok(recorded) => recorded,
                    Err(db_err) => {
                        // The payout is on chain; keep the hash recoverable.
                        tracing::error!(
                            user_id,
                            activity_id,
                            tx_hash = %outcome.tx_hash,
                            error = %db_err,
                            "Reward paid but settlement not recorded"
                        );
                        return Err(db_err);
                    }
                };
                if !recorded {
                    return Err(AppError::Conflict(format!(
                        "Reward for activity {} already settled",
                        activity_id
                    )));
                }

                tracing::info!(
                    user_id,
                    activity_id,
                    tx_hash = %outcome.tx_hash,
                    block = ?outcome.block_number,
                    "Activity reward settled"
                );
                Ok(settled)
            }
            Err(e) => {
                match self.db.mark_settlement_failed(activity_id).await {
                    Ok(true) => {}
                    Ok(false) => tracing::info!(
                        activity_id,
                        "Activity settled concurrently, keeping Settled status"
                    ),
                    Err(db_err) => tracing::error!(
                        activity_id,
                        error = %db_err,
                        "Failed to record settlement failure"
                    ),
                }
                Err(e.into())
            }
        }
    }
}

/// Turn validated input into a priced `Activity`.
pub fn build_activity(
    user_id: &str,
    mut input: NewActivity,
    rewards: &RewardCalculator,
    source: &str,
    now: DateTime<Utc>,
) -> Result<Activity> {
    input.name = input.name.trim().to_string();
    input.sport_type = input.sport_type.trim().to_string();
    input.validate()?;

    let mut distance_km = input.distance_km;
    let mut duration_hours = input.duration_hours;
    let mut start_date = input.start_date.as_deref().map(parse_start_date).transpose()?;
    let mut summary_polyline = None;
    let mut track_points = 0;

    if let Some(points) = input.track.as_deref().filter(|p| !p.is_empty()) {
        // Recorded tracks are capped rather than rejected
        let summary = tracks::summarize(points)?;
        if points.len() > 1 {
            distance_km = summary.distance_km.min(MAX_DISTANCE_KM);
        }
        if let Some(hours) = summary.duration_hours {
            duration_hours = hours.min(MAX_DURATION_HOURS);
        }
        start_date = start_date.or(summary.start_time);
        summary_polyline = Some(summary.summary_polyline);
        track_points = summary.point_count;
    }

    check_effort(distance_km, duration_hours)?;

    let reward = rewards.calculate(distance_km, duration_hours)?;
    let start_date = format_utc_rfc3339(start_date.unwrap_or(now));
    let id = uuid::Uuid::new_v4().to_string();

    Ok(Activity {
        sort_key: Activity::make_sort_key(&start_date, &id),
        id,
        user_id: user_id.to_string(),
        name: input.name,
        sport_type: input.sport_type,
        start_date,
        distance_km,
        duration_hours,
        average_speed_kmh: distance_km / duration_hours,
        summary_polyline,
        track_points,
        source: source.to_string(),
        reward,
        reward_status: RewardStatus::Pending,
        reward_tx_hash: None,
        settled_at: None,
        created_at: format_utc_rfc3339(now),
    })
}

fn parse_start_date(raw: &str) -> Result<DateTime<Utc>> {
    parse_rfc3339_utc(raw).ok_or_else(|| {
        AppError::BadRequest("Invalid 'start_date': must be RFC3339 datetime".to_string())
    })
}

/// Bounds on the effective distance and duration.
fn check_effort(distance_km: f64, duration_hours: f64) -> Result<()> {
    if !(0.0..=MAX_DISTANCE_KM).contains(&distance_km) {
        return Err(AppError::BadRequest(format!(
            "Distance must be between 0 and {} km",
            MAX_DISTANCE_KM
        )));
    }
    if !(duration_hours > 0.0 && duration_hours <= MAX_DURATION_HOURS) {
        return Err(AppError::BadRequest(format!(
            "Duration must be greater than 0 and at most {} hours",
            MAX_DURATION_HOURS
        )));
    }
    let speed = distance_km / duration_hours;
    if speed > MAX_AVERAGE_SPEED_KMH {
        return Err(AppError::BadRequest(format!(
            "Average speed {:.1} km/h exceeds {} km/h",
            speed, MAX_AVERAGE_SPEED_KMH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

    fn input(distance_km: f64, duration_hours: f64) -> NewActivity {
        NewActivity {
            name: "Morning Ride".to_string(),
            sport_type: "Ride".to_string(),
            start_date: Some("2024-06-10T07:00:00+02:00".to_string()),
            distance_km,
            duration_hours,
            track: None,
        }
    }

    fn now() -> DateTime<Utc> {
        parse_rfc3339_utc("2024-06-10T12:00:00Z").unwrap()
    }

    fn build(input: NewActivity) -> Result<Activity> {
        build_activity(USER, input, &RewardCalculator::default(), "manual", now())
    }

    #[test]
    fn test_build_prices_and_normalizes() {
        let activity = build(input(60.0, 2.0)).unwrap();

        assert_eq!(activity.user_id, USER);
        assert_eq!(activity.start_date, "2024-06-10T05:00:00Z");
        assert!(activity.sort_key.starts_with("2024-06-10T05:00:00Z#"));
        assert!(activity.sort_key.ends_with(&activity.id));
        assert_eq!(activity.average_speed_kmh, 30.0);
        assert_eq!(activity.reward_status, RewardStatus::Pending);
        // 1 + 60*0.5 + 2*2 + 10 bonus
        assert_eq!(activity.reward.total, 45.0);
        assert_eq!(activity.created_at, "2024-06-10T12:00:00Z");
    }

    #[test]
    fn test_build_rejects_empty_name() {
        let mut bad = input(10.0, 1.0);
        bad.name = "   ".to_string();
        assert!(matches!(build(bad), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_long_name() {
        let mut bad = input(10.0, 1.0);
        bad.name = "x".repeat(101);
        assert!(matches!(build(bad), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_out_of_range_effort() {
        assert!(matches!(build(input(1001.0, 20.0)), Err(AppError::Validation(_))));
        assert!(matches!(build(input(10.0, 0.0)), Err(AppError::Validation(_))));
        assert!(matches!(build(input(10.0, 48.5)), Err(AppError::Validation(_))));
        assert!(matches!(build(input(-1.0, 1.0)), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_implausible_speed() {
        assert!(matches!(build(input(100.0, 1.0)), Err(AppError::BadRequest(_))));
        assert!(build(input(80.0, 1.0)).is_ok());
    }

    #[test]
    fn test_build_rejects_bad_start_date() {
        let mut bad = input(10.0, 1.0);
        bad.start_date = Some("yesterday".to_string());
        assert!(matches!(build(bad), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_missing_start_date_defaults_to_now() {
        let mut no_date = input(10.0, 1.0);
        no_date.start_date = None;
        let activity = build(no_date).unwrap();
        assert_eq!(activity.start_date, "2024-06-10T12:00:00Z");
    }

    #[test]
    fn test_track_overrides_distance_and_duration() {
        let start = parse_rfc3339_utc("2024-06-10T06:00:00Z").unwrap();
        let mut a = TrackPoint::new(37.0, -122.0);
        a.time = Some(start);
        let mut b = TrackPoint::new(37.1, -122.0);
        b.time = Some(start + chrono::Duration::minutes(30));

        let mut with_track = input(500.0, 10.0);
        with_track.start_date = None;
        with_track.track = Some(vec![a, b]);

        let activity = build(with_track).unwrap();

        assert!((activity.distance_km - 11.12).abs() < 0.05);
        assert_eq!(activity.duration_hours, 0.5);
        assert_eq!(activity.start_date, "2024-06-10T06:00:00Z");
        assert_eq!(activity.track_points, 2);
        assert!(activity.summary_polyline.is_some());
    }

    #[test]
    fn test_long_track_is_capped() {
        let start = parse_rfc3339_utc("2024-06-01T06:00:00Z").unwrap();
        let mut a = TrackPoint::new(30.0, 10.0);
        a.time = Some(start);
        // ~1112 km north, 30 hours later
        let mut b = TrackPoint::new(40.0, 10.0);
        b.time = Some(start + chrono::Duration::hours(30));

        let mut long = input(MAX_DISTANCE_KM, 30.0);
        long.track = Some(vec![a, b]);

        let activity = build(long).unwrap();
        assert_eq!(activity.distance_km, MAX_DISTANCE_KM);
        assert_eq!(activity.duration_hours, 30.0);
    }

    #[test]
    fn test_track_with_bad_coordinates_rejected() {
        let mut bad = input(10.0, 1.0);
        bad.track = Some(vec![TrackPoint::new(95.0, 0.0), TrackPoint::new(0.0, 0.0)]);
        assert!(matches!(build(bad), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_default_sport_type_is_ride() {
        let parsed: NewActivity = serde_json::from_str(
            r#"{"name":"Commute","distance_km":8.0,"duration_hours":0.5}"#,
        )
        .unwrap();
        assert_eq!(parsed.sport_type, "Ride");
        assert!(parsed.track.is_none());
    }
}
