// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixie-Run: earn FIXIE tokens for rides and runs
//!
//! This crate provides the backend API for recording activities, computing
//! their FIXIE rewards and settling those rewards on chain.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use cache::TtlCache;
use config::Config;
use db::FirestoreDb;
use middleware::RateLimiter;
use routes::api::LeaderboardEntry;
use services::chain::{ChainClient, ChainService, NftToken};
use services::RewardCalculator;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub rewards: RewardCalculator,
    /// `None` when settlement is not configured
    pub chain: Option<Arc<ChainService<ChainClient>>>,
    pub rate_limiter: RateLimiter,
    /// FIXIE balance (base units, decimal string) by user id
    pub balance_cache: TtlCache<String, String>,
    /// Achievement NFTs by user id
    pub nft_cache: TtlCache<String, Vec<NftToken>>,
    /// Leaderboard pages by limit
    pub leaderboard_cache: TtlCache<u32, Vec<LeaderboardEntry>>,
    /// Login nonces already exchanged for a session
    pub used_nonces: TtlCache<String, ()>,
    /// `user_id:tier` keys of achievement mints being submitted
    pub mints_in_flight: TtlCache<String, ()>,
}

/// Lifetime of a wallet login nonce.
pub const LOGIN_NONCE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on how long a stuck mint blocks a retry.
const MINT_LOCK_TTL: Duration = Duration::from_secs(10 * 60);

impl AppState {
    pub fn new(
        config: Config,
        db: FirestoreDb,
        chain: Option<Arc<ChainService<ChainClient>>>,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            rewards: RewardCalculator::new(config.rewards),
            rate_limiter: RateLimiter::new(
                config.rate_limit_capacity,
                config.rate_limit_refill_per_sec,
            ),
            balance_cache: TtlCache::new(ttl),
            nft_cache: TtlCache::new(ttl),
            leaderboard_cache: TtlCache::new(ttl),
            used_nonces: TtlCache::new(LOGIN_NONCE_TTL),
            mints_in_flight: TtlCache::new(MINT_LOCK_TTL),
            config,
            db,
            chain,
        }
    }

    /// Chain service, or `503 chain_unavailable` when settlement is disabled.
    pub fn chain(&self) -> error::Result<&ChainService<ChainClient>> {
        self.chain
            .as_deref()
            .ok_or(error::AppError::ChainUnavailable)
    }

    /// Drop cached chain reads for a user after a write.
    pub fn invalidate_chain_cache(&self, user_id: &str) {
        let key = user_id.to_string();
        self.balance_cache.invalidate(&key);
        self.nft_cache.invalidate(&key);
    }
}
