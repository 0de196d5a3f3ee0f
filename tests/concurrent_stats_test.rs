// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use fixie_run::models::User;
use fixie_run::services::activity::build_activity;
use fixie_run::services::{NewActivity, RewardCalculator};

mod common;
use common::test_db;

const NUM_CONCURRENT_ACTIVITIES: u32 = 10;
const ACTIVITY_DISTANCE_KM: f64 = 20.0;
const ACTIVITY_HOURS: f64 = 1.0;

#[tokio::test]
async fn test_concurrent_activity_recording_keeps_every_update() {
    // Stats are read inside the transaction; concurrent writers must not
    // lose increments.
    require_emulator!();

    let db = test_db().await;
    let user_id = "0x00000000000000000000000000000000000000aa";
    let now = chrono::Utc::now().to_rfc3339();

    db.delete_user_data(user_id)
        .await
        .expect("Failed to clear previous test data");
    db.upsert_user(&User {
        id: user_id.to_string(),
        wallet_address: "0x00000000000000000000000000000000000000AA".to_string(),
        display_name: Some("Race".to_string()),
        created_at: now.clone(),
        last_active: now,
        minted_tiers: vec![],
    })
    .await
    .expect("Failed to create test user");

    let rewards = RewardCalculator::default();
    let mut handles = vec![];
    for i in 0..NUM_CONCURRENT_ACTIVITIES {
        let db = db.clone();
        let activity = build_activity(
            user_id,
            NewActivity {
                name: format!("Race Activity {}", i),
                sport_type: "Ride".to_string(),
                start_date: Some("2024-01-01T10:00:00Z".to_string()),
                distance_km: ACTIVITY_DISTANCE_KM,
                duration_hours: ACTIVITY_HOURS,
                track: None,
            },
            &rewards,
            "manual",
            chrono::Utc::now(),
        )
        .expect("Activity should be valid");
        handles.push(tokio::spawn(async move {
            db.record_activity_atomic(&activity).await
        }));
    }

    for handle in handles {
        let recorded = handle
            .await
            .expect("Task join failed")
            .expect("Activity recording failed");
        assert!(recorded);
    }

    let stats = db
        .get_user_stats(user_id)
        .await
        .expect("Failed to fetch user stats")
        .expect("User stats document not found");

    assert_eq!(
        stats.total_activities, NUM_CONCURRENT_ACTIVITIES,
        "Total activities count mismatch due to race condition"
    );
    assert_eq!(
        stats.total_distance_km,
        NUM_CONCURRENT_ACTIVITIES as f64 * ACTIVITY_DISTANCE_KM,
        "Total distance mismatch due to race condition"
    );
    // 1 + 20 * 0.5 + 1 * 2 = 13 per activity
    assert_eq!(
        stats.total_rewards_earned,
        NUM_CONCURRENT_ACTIVITIES as f64 * 13.0
    );

    db.delete_user_data(user_id)
        .await
        .expect("Failed to clean up test data");
}
