//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development. Chain settings are
//! optional; without them the service runs with settlement disabled.

use crate::services::rewards::RewardConfig;
use std::env;
use std::str::FromStr;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL (allowed CORS origin)
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for wallet login nonces
    pub login_nonce_key: Vec<u8>,

    /// Reward rates
    pub rewards: RewardConfig,
    /// Blockchain settlement (None = disabled)
    pub chain: Option<ChainConfig>,

    /// Rate limiter bucket size
    pub rate_limit_capacity: f64,
    /// Rate limiter refill (tokens per second)
    pub rate_limit_refill_per_sec: f64,
    /// TTL for cached chain reads and the leaderboard
    pub cache_ttl_secs: u64,
}

/// JSON-RPC endpoint, signer and contract addresses for settlement.
#[derive(Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Hex-encoded private key of the reward distributor
    pub private_key: String,
    pub token_address: String,
    pub nft_address: String,
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .field("token_address", &self.token_address)
            .field("nft_address", &self.nft_address)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        let login_nonce_key = env::var("LOGIN_NONCE_KEY")
            .map(|v| v.trim().as_bytes().to_vec())
            .unwrap_or_else(|_| jwt_signing_key.clone());

        let defaults = RewardConfig::default();
        let rewards = RewardConfig {
            base: parse_var("REWARD_BASE", defaults.base)?,
            distance_rate: parse_var("REWARD_DISTANCE_RATE", defaults.distance_rate)?,
            time_rate: parse_var("REWARD_TIME_RATE", defaults.time_rate)?,
            weekly_bonus: parse_var("REWARD_WEEKLY_BONUS", defaults.weekly_bonus)?,
            bonus_threshold_km: parse_var(
                "REWARD_BONUS_THRESHOLD_KM",
                defaults.bonus_threshold_km,
            )?,
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_var("PORT", 8080)?,
            jwt_signing_key,
            login_nonce_key,
            rewards,
            chain: ChainConfig::from_env()?,
            rate_limit_capacity: parse_var("RATE_LIMIT_CAPACITY", 60.0)?,
            rate_limit_refill_per_sec: parse_var("RATE_LIMIT_REFILL_PER_SEC", 1.0)?,
            cache_ttl_secs: parse_var("CACHE_TTL_SECS", 30)?,
        })
    }

    /// Config for tests: fixed keys, default rewards, no chain.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            login_nonce_key: b"test_nonce_key_32_bytes_minimum!".to_vec(),
            rewards: RewardConfig::default(),
            chain: None,
            rate_limit_capacity: 1000.0,
            rate_limit_refill_per_sec: 100.0,
            cache_ttl_secs: 30,
        }
    }
}

impl ChainConfig {
    /// Read chain settings. All-or-nothing: partial configuration is an error.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        const VARS: [&str; 4] = [
            "CHAIN_RPC_URL",
            "CHAIN_PRIVATE_KEY",
            "FIXIE_TOKEN_ADDRESS",
            "FIXIE_NFT_ADDRESS",
        ];

        let values: Vec<Option<String>> = VARS
            .iter()
            .map(|name| env::var(name).ok().map(|v| v.trim().to_string()))
            .collect();

        if values.iter().all(Option::is_none) {
            tracing::info!("Chain settlement not configured; running without blockchain");
            return Ok(None);
        }

        let mut resolved = Vec::with_capacity(VARS.len());
        for (name, value) in VARS.iter().zip(values) {
            resolved.push(value.ok_or(ConfigError::Missing(*name))?);
        }
        let [rpc_url, private_key, token_address, nft_address]: [String; 4] = resolved
            .try_into()
            .map_err(|_| ConfigError::Invalid("chain configuration"))?;

        Ok(Some(Self {
            rpc_url,
            chain_id: parse_var("CHAIN_ID", 1)?,
            private_key,
            token_address,
            nft_address,
        }))
    }
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
