// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity API input validation tests.
//!
//! Every request here is rejected before touching the database, so the
//! offline mock is enough.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::TEST_USER;

async fn post_activity(body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/activities")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, common::body_json(response).await)
}

async fn get_authed(uri: &str) -> StatusCode {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_activity_name_too_long() {
    let (status, body) = post_activity(json!({
        "name": "a".repeat(101),
        "distance_km": 10.0,
        "duration_hours": 1.0
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_activity_distance_out_of_range() {
    let (status, _) = post_activity(json!({
        "name": "Too far",
        "distance_km": 1500.0,
        "duration_hours": 40.0
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activity_zero_duration() {
    let (status, _) = post_activity(json!({
        "name": "Instant",
        "distance_km": 5.0,
        "duration_hours": 0.0
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activity_implausible_speed() {
    let (status, body) = post_activity(json!({
        "name": "Motorbike",
        "distance_km": 200.0,
        "duration_hours": 1.0
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_activity_invalid_start_date() {
    let (status, _) = post_activity(json!({
        "name": "Commute",
        "start_date": "last tuesday",
        "distance_km": 8.0,
        "duration_hours": 0.5
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activity_track_with_invalid_coordinates() {
    let (status, _) = post_activity(json!({
        "name": "Off the map",
        "distance_km": 8.0,
        "duration_hours": 0.5,
        "track": [
            { "lat": 123.0, "lon": 0.0 },
            { "lat": 0.0, "lon": 0.0 }
        ]
    }))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_valid_activity_reaches_database() {
    let (status, _) = post_activity(json!({
        "name": "Commute",
        "distance_km": 8.0,
        "duration_hours": 0.5
    }))
    .await;

    // Offline database: validation passed, the write failed
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_upload_unknown_format() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/activities/upload?format=fit")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from("<gpx></gpx>"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_malformed_document() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/activities/upload")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from("this is not xml"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_after_date() {
    assert_eq!(
        get_authed("/api/activities?after=invalid-date").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_invalid_cursor() {
    assert_eq!(
        get_authed("/api/activities?cursor=not-a-cursor!").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_zero_per_page() {
    assert_eq!(
        get_authed("/api/activities?per_page=0").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_valid_listing_reaches_database() {
    assert_eq!(
        get_authed("/api/activities?per_page=500&after=2024-01-01T00:00:00Z").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_leaderboard_reaches_database() {
    assert_eq!(
        get_authed("/api/leaderboard?limit=1000").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_update_profile_name_too_long() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "display_name": "x".repeat(51) }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
