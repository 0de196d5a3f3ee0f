// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-chain reads and achievement minting.
//!
//! Every route answers `503 chain_unavailable` when settlement is not
//! configured.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::RewardTier;
use crate::services::chain::{parse_address, parse_tx_hash, NftToken, TxOutcome, TxStatus};
use crate::services::rewards::from_token_units;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/web3/balance", get(get_balance))
        .route("/api/web3/nfts", get(get_nfts).post(mint_nft))
        .route("/api/web3/tx/{hash}", get(get_tx_status))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BalanceResponse {
    pub address: String,
    /// Base units (18 decimals)
    pub balance_wei: String,
    /// Decimal FIXIE amount
    pub balance: String,
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>> {
    let chain = state.chain()?;

    let balance_wei = match state.balance_cache.get(&user.user_id) {
        Some(cached) => cached,
        None => {
            let owner = parse_address(&user.user_id)?;
            let balance = chain.token_balance(owner).await?.to_string();
            state
                .balance_cache
                .insert(user.user_id.clone(), balance.clone());
            balance
        }
    };

    let units = U256::from_dec_str(&balance_wei)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Cached balance corrupt: {}", e)))?;

    Ok(Json(BalanceResponse {
        address: user.user_id,
        balance: from_token_units(units)?,
        balance_wei,
    }))
}

async fn get_nfts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<NftToken>>> {
    let chain = state.chain()?;

    if let Some(cached) = state.nft_cache.get(&user.user_id) {
        return Ok(Json(cached));
    }

    let owner = parse_address(&user.user_id)?;
    let nfts = chain.owned_nfts(owner).await?;
    state.nft_cache.insert(user.user_id.clone(), nfts.clone());
    Ok(Json(nfts))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MintResponse {
    pub tier: RewardTier,
    pub token_id: Option<String>,
    pub token_uri: String,
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Metadata URI for a tier's achievement token.
fn achievement_uri(frontend_url: &str, tier: RewardTier) -> String {
    format!(
        "{}/achievements/{}.json",
        frontend_url.trim_end_matches('/'),
        tier.as_str().to_lowercase()
    )
}

/// Whether any of `nfts` carries the metadata URI of an achievement.
fn holds_achievement(nfts: &[NftToken], token_uri: &str) -> bool {
    nfts.iter().any(|nft| nft.token_uri == token_uri)
}

/// Mint the achievement NFT for the user's current tier. One per tier.
async fn mint_nft(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<MintResponse>)> {
    let chain = state.chain()?;

    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;
    let stats = state
        .db
        .get_user_stats(&user.user_id)
        .await?
        .filter(|s| s.total_activities > 0)
        .ok_or_else(|| {
            AppError::BadRequest("Record an activity before minting an achievement".to_string())
        })?;

    let tier = stats.tier();
    if profile.minted_tiers.contains(&tier) {
        return Err(AppError::Conflict(format!(
            "{} achievement already minted",
            tier
        )));
    }

    let owner = parse_address(&user.user_id)?;
    let in_flight_key = format!("{}:{}", user.user_id, tier);
    if !state.mints_in_flight.insert_if_absent(in_flight_key.clone(), ()) {
        return Err(AppError::Conflict(format!(
            "{} achievement mint already in progress",
            tier
        )));
    }

    let token_uri = achievement_uri(&state.config.frontend_url, tier);

    // A mint whose tier never reached the database shows up on chain.
    let held = match chain.owned_nfts(owner).await {
        Ok(nfts) => holds_achievement(&nfts, &token_uri),
        Err(e) => {
            state.mints_in_flight.invalidate(&in_flight_key);
            return Err(e.into());
        }
    };
    if held {
        let recorded = state.db.add_minted_tier_atomic(&user.user_id, tier).await;
        state.mints_in_flight.invalidate(&in_flight_key);
        recorded?;
        return Err(AppError::Conflict(format!(
            "{} achievement already minted",
            tier
        )));
    }

    let (outcome, token_id): (TxOutcome, Option<U256>) =
        match chain.mint_achievement(owner, tier.as_str(), &token_uri).await {
            Ok(minted) => minted,
            Err(e) => {
                state.mints_in_flight.invalidate(&in_flight_key);
                return Err(e.into());
            }
        };
    state.invalidate_chain_cache(&user.user_id);

    if let Err(e) = state.db.add_minted_tier_atomic(&user.user_id, tier).await {
        // The lock stays until it expires so a retry cannot mint twice.
        tracing::error!(
            user_id = %user.user_id,
            tier = %tier,
            tx_hash = %outcome.tx_hash,
            error = %e,
            "Achievement minted but tier not recorded"
        );
        return Err(e);
    }
    state.mints_in_flight.invalidate(&in_flight_key);

    tracing::info!(
        user_id = %user.user_id,
        tier = %tier,
        tx_hash = %outcome.tx_hash,
        "Achievement minted"
    );

    Ok((
        StatusCode::CREATED,
        Json(MintResponse {
            tier,
            token_id: token_id.map(|id| id.to_string()),
            token_uri,
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
        }),
    ))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TxStatusResponse {
    pub tx_hash: String,
    pub status: TxStatus,
}

async fn get_tx_status(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TxStatusResponse>> {
    let chain = state.chain()?;
    let tx_hash = parse_tx_hash(&hash)?;
    let status = chain.verify_transaction(tx_hash).await?;

    Ok(Json(TxStatusResponse {
        tx_hash: format!("{:?}", tx_hash),
        status,
    }))
}
