// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Web3 routes with settlement disabled.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;
use common::TEST_USER;

async fn call(method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt(TEST_USER, &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, common::body_json(response).await)
}

#[tokio::test]
async fn test_web3_routes_unavailable_without_chain() {
    let tx = format!("/api/web3/tx/0x{}", "ab".repeat(32));
    for (method, uri) in [
        ("GET", "/api/web3/balance"),
        ("GET", "/api/web3/nfts"),
        ("POST", "/api/web3/nfts"),
        ("GET", tx.as_str()),
        ("POST", "/api/activities/some-activity/claim"),
    ] {
        let (status, body) = call(method, uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{} {}", method, uri);
        assert_eq!(body["error"], "chain_unavailable");
    }
}

#[tokio::test]
async fn test_web3_routes_require_auth() {
    let (app, _) = common::create_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/web3/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
