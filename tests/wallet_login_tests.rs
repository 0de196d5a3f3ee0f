// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wallet sign-in flow tests.
//!
//! The database is offline, so a login that passes every check ends in a
//! 500 when the user is upserted. Everything rejected earlier gets a 401.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use ethers::signers::{LocalWallet, Signer};
use serde_json::json;
use tower::ServiceExt;

mod common;

const KEY_A: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const KEY_B: &str = "0123456789012345678901234567890123456789012345678901234567890123";

fn wallet(key: &str) -> LocalWallet {
    key.parse().unwrap()
}

async fn fetch_login_message(app: &axum::Router, address: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/nonce?address={}", address))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, common::body_json(response).await)
}

async fn post_login(app: &axum::Router, body: serde_json::Value) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/wallet")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_nonce_requires_valid_address() {
    let (app, _) = common::create_test_app();
    let (status, body) = fetch_login_message(&app, "0x1234").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_nonce_message_names_checksummed_address() {
    let (app, _) = common::create_test_app();
    let signer = wallet(KEY_A);
    let lowercase = format!("{:?}", signer.address());

    let (status, body) = fetch_login_message(&app, &lowercase).await;

    assert_eq!(status, StatusCode::OK);
    let checksummed = ethers::utils::to_checksum(&signer.address(), None);
    assert_eq!(body["address"], checksummed.as_str());
    let message = body["message"].as_str().unwrap();
    assert!(message.contains(&checksummed));
    assert!(message.contains(body["nonce"].as_str().unwrap()));
}

#[tokio::test]
async fn test_valid_signature_passes_and_nonce_cannot_be_replayed() {
    let (app, _) = common::create_test_app();
    let signer = wallet(KEY_A);
    let address = format!("{:?}", signer.address());

    let (_, nonce) = fetch_login_message(&app, &address).await;
    let message = nonce["message"].as_str().unwrap().to_string();
    let signature = signer.sign_message(&message).await.unwrap();
    let body = json!({
        "address": address,
        "message": message,
        "signature": signature.to_string(),
    });

    // All checks pass; the offline database fails the user upsert
    assert_eq!(post_login(&app, body.clone()).await, StatusCode::INTERNAL_SERVER_ERROR);
    // Same nonce again is a replay
    assert_eq!(post_login(&app, body).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signature_from_other_wallet_rejected() {
    let (app, _) = common::create_test_app();
    let owner = wallet(KEY_A);
    let impostor = wallet(KEY_B);
    let address = format!("{:?}", owner.address());

    let (_, nonce) = fetch_login_message(&app, &address).await;
    let message = nonce["message"].as_str().unwrap().to_string();
    let signature = impostor.sign_message(&message).await.unwrap();

    let status = post_login(
        &app,
        json!({
            "address": address,
            "message": message,
            "signature": signature.to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_nonce_issued_for_other_address_rejected() {
    let (app, _) = common::create_test_app();
    let victim = wallet(KEY_A);
    let attacker = wallet(KEY_B);

    // Attacker signs a message issued to the victim, claiming their own address
    let (_, nonce) = fetch_login_message(&app, &format!("{:?}", victim.address())).await;
    let message = nonce["message"].as_str().unwrap().to_string();
    let signature = attacker.sign_message(&message).await.unwrap();

    let status = post_login(
        &app,
        json!({
            "address": format!("{:?}", attacker.address()),
            "message": message,
            "signature": signature.to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_message_without_nonce_rejected() {
    let (app, _) = common::create_test_app();
    let signer = wallet(KEY_A);
    let message = "Sign in to Fixie-Run";
    let signature = signer.sign_message(message).await.unwrap();

    let status = post_login(
        &app,
        json!({
            "address": format!("{:?}", signer.address()),
            "message": message,
            "signature": signature.to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_nonce_from_other_server_key_rejected() {
    let (issuer, _) = common::create_test_app();
    let mut other_config = fixie_run::config::Config::test_default();
    other_config.login_nonce_key = b"a_completely_different_nonce_key".to_vec();
    let (verifier, _) = common::create_test_app_with(other_config);

    let signer = wallet(KEY_A);
    let address = format!("{:?}", signer.address());
    let (_, nonce) = fetch_login_message(&issuer, &address).await;
    let message = nonce["message"].as_str().unwrap().to_string();
    let signature = signer.sign_message(&message).await.unwrap();

    let status = post_login(
        &verifier,
        json!({
            "address": address,
            "message": message,
            "signature": signature.to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
