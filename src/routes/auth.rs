// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wallet sign-in routes (EIP-191 personal_sign).
//!
//! 1. `GET /auth/nonce?address=0x..` returns a login message with an
//!    HMAC-signed, timestamped nonce.
//! 2. The wallet signs the message and the client posts it to `/auth/wallet`.
//! 3. The server checks the nonce, recovers the signer and issues a session.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ethers::types::{Address, Signature};
use ethers::utils::to_checksum;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE, SESSION_TTL_SECS};
use crate::models::User;
use crate::routes::api::UserResponse;
use crate::services::chain::parse_address;
use crate::time_utils::format_utc_rfc3339;
use crate::{AppState, LOGIN_NONCE_TTL};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

type HmacSha256 = Hmac<Sha256>;

const MESSAGE_HEADER: &str = "Sign in to Fixie-Run";
const NONCE_PREFIX: &str = "Nonce: ";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/nonce", get(get_nonce))
        .route("/auth/wallet", post(wallet_login))
        .route("/auth/logout", get(logout))
}

/// Lowercase `0x` form used as user ID.
pub fn user_id_for(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

// ─── Nonce ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct NonceParams {
    address: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct NonceResponse {
    pub address: String,
    pub nonce: String,
    /// Exact text the wallet must sign
    pub message: String,
    pub expires_at: String,
}

async fn get_nonce(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NonceParams>,
) -> Result<Json<NonceResponse>> {
    let address = parse_address(&params.address)?;
    let now = chrono::Utc::now();

    let nonce = issue_nonce(&address, now.timestamp(), &state.config.login_nonce_key)?;
    let checksummed = to_checksum(&address, None);
    let expires_at = now
        + chrono::Duration::from_std(LOGIN_NONCE_TTL)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Nonce TTL: {}", e)))?;

    tracing::debug!(address = %checksummed, "Issued login nonce");

    Ok(Json(NonceResponse {
        message: login_message(&checksummed, &nonce),
        address: checksummed,
        nonce,
        expires_at: format_utc_rfc3339(expires_at),
    }))
}

/// The text a wallet signs to log in.
pub fn login_message(checksummed_address: &str, nonce: &str) -> String {
    format!(
        "{}\n\nAddress: {}\n{}{}",
        MESSAGE_HEADER, checksummed_address, NONCE_PREFIX, nonce
    )
}

/// Build a signed nonce: `base64url("address|issued_hex|random|signature_hex")`.
pub fn issue_nonce(address: &Address, issued_at: i64, secret: &[u8]) -> Result<String> {
    let payload = format!(
        "{}|{:x}|{}",
        user_id_for(address),
        issued_at,
        uuid::Uuid::new_v4().simple()
    );

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Check a nonce's signature and age. Returns the user ID it was issued for.
pub fn verify_nonce(nonce: &str, secret: &[u8], now: i64) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(nonce).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;

    let (payload, signature_hex) = decoded.rsplit_once('|')?;
    let parts: Vec<&str> = payload.split('|').collect();
    if parts.len() != 3 {
        return None;
    }

    let signature = hex::decode(signature_hex).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::warn!("Login nonce signature mismatch");
        return None;
    }

    let issued_at = i64::from_str_radix(parts[1], 16).ok()?;
    let age = now - issued_at;
    if age < 0 || age > LOGIN_NONCE_TTL.as_secs() as i64 {
        tracing::debug!(age, "Login nonce expired");
        return None;
    }

    Some(parts[0].to_string())
}

/// Pull the nonce line out of a signed login message.
fn nonce_from_message(message: &str) -> Option<&str> {
    message
        .lines()
        .find_map(|line| line.strip_prefix(NONCE_PREFIX))
        .map(str::trim)
}

// ─── Login ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WalletLoginRequest {
    pub address: String,
    pub message: String,
    /// 65-byte hex signature from `personal_sign`
    pub signature: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

async fn wallet_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<WalletLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let address = parse_address(&body.address)?;
    let user_id = user_id_for(&address);
    let checksummed = to_checksum(&address, None);

    let nonce = nonce_from_message(&body.message).ok_or(AppError::Unauthorized)?;
    let nonce_owner = verify_nonce(nonce, &state.config.login_nonce_key, chrono::Utc::now().timestamp())
        .ok_or(AppError::Unauthorized)?;
    if nonce_owner != user_id || body.message != login_message(&checksummed, nonce) {
        tracing::warn!(address = %checksummed, "Login message does not match issued nonce");
        return Err(AppError::Unauthorized);
    }

    let signature = Signature::from_str(body.signature.trim())
        .map_err(|_| AppError::BadRequest("Malformed signature".to_string()))?;
    if let Err(e) = signature.verify(body.message.as_str(), address) {
        tracing::warn!(address = %checksummed, error = %e, "Wallet signature rejected");
        return Err(AppError::Unauthorized);
    }

    // Each nonce buys exactly one session
    if !state.used_nonces.insert_if_absent(nonce.to_string(), ()) {
        tracing::warn!(address = %checksummed, "Login nonce replayed");
        return Err(AppError::Unauthorized);
    }

    let now = format_utc_rfc3339(chrono::Utc::now());
    let user = match state.db.get_user(&user_id).await? {
        Some(mut existing) => {
            existing.last_active = now;
            existing
        }
        None => {
            tracing::info!(user_id = %user_id, "New wallet user");
            User {
                id: user_id.clone(),
                wallet_address: checksummed,
                display_name: None,
                created_at: now.clone(),
                last_active: now,
                minted_tiers: Vec::new(),
            }
        }
    };
    state.db.upsert_user(&user).await?;

    let stats = state.db.get_user_stats(&user_id).await?;
    let token = create_jwt(&user_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS as i64));

    tracing::info!(user_id = %user_id, "Wallet login successful");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            user: UserResponse::new(&user, stats.as_ref()),
        }),
    ))
}

/// Clear the session cookie.
async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(serde_json::json!({ "success": true })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_nonce_key_32_bytes_minimum!";
    const ADDRESS: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";
    const NOW: i64 = 1_718_000_000;

    fn address() -> Address {
        ADDRESS.parse().unwrap()
    }

    #[test]
    fn test_nonce_round_trip() {
        let nonce = issue_nonce(&address(), NOW, SECRET).unwrap();
        assert_eq!(verify_nonce(&nonce, SECRET, NOW + 60), Some(ADDRESS.to_string()));
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = issue_nonce(&address(), NOW, SECRET).unwrap();
        let b = issue_nonce(&address(), NOW, SECRET).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_expires() {
        let nonce = issue_nonce(&address(), NOW, SECRET).unwrap();
        let ttl = LOGIN_NONCE_TTL.as_secs() as i64;
        assert!(verify_nonce(&nonce, SECRET, NOW + ttl).is_some());
        assert_eq!(verify_nonce(&nonce, SECRET, NOW + ttl + 1), None);
    }

    #[test]
    fn test_nonce_from_future_rejected() {
        let nonce = issue_nonce(&address(), NOW, SECRET).unwrap();
        assert_eq!(verify_nonce(&nonce, SECRET, NOW - 5), None);
    }

    #[test]
    fn test_nonce_wrong_secret() {
        let nonce = issue_nonce(&address(), NOW, SECRET).unwrap();
        assert_eq!(verify_nonce(&nonce, b"some_other_secret_entirely_here!", NOW), None);
    }

    #[test]
    fn test_nonce_tampered_address() {
        let nonce = issue_nonce(&address(), NOW, SECRET).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&nonce).unwrap()).unwrap();
        let forged = decoded.replace(ADDRESS, "0x0000000000000000000000000000000000000001");
        let forged = URL_SAFE_NO_PAD.encode(forged);
        assert_eq!(verify_nonce(&forged, SECRET, NOW), None);
    }

    #[test]
    fn test_nonce_malformed() {
        assert_eq!(verify_nonce("not base64 !!", SECRET, NOW), None);
        let encoded = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(verify_nonce(&encoded, SECRET, NOW), None);
    }

    #[test]
    fn test_login_message_carries_nonce() {
        let message = login_message("0x8ba1F109551bD432803012645Ac136ddd64DBA72", "abc123");
        assert!(message.starts_with(MESSAGE_HEADER));
        assert_eq!(nonce_from_message(&message), Some("abc123"));
        assert_eq!(nonce_from_message("no nonce here"), None);
    }

    #[test]
    fn test_user_id_is_lowercase() {
        let checksummed: Address = "0x8ba1F109551bD432803012645Ac136ddd64DBA72".parse().unwrap();
        assert_eq!(user_id_for(&checksummed), ADDRESS);
    }
}
