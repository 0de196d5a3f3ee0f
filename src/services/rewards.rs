// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FIXIE reward calculation.
//!
//! A reward is a linear combination of distance and moving time plus a flat
//! base amount, with a fixed bonus for rides longer than the bonus threshold:
//!
//! `total = base + distance_km * distance_rate + duration_hours * time_rate + bonus`

use crate::error::AppError;
use crate::models::RewardBreakdown;
use ethers::types::U256;
use ethers::utils::{format_units, parse_units};
use serde::{Deserialize, Serialize};

/// Number of decimals of the FIXIE ERC-20 token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Reward rates (FIXIE per unit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Flat amount per activity
    pub base: f64,
    /// FIXIE per kilometre
    pub distance_rate: f64,
    /// FIXIE per hour
    pub time_rate: f64,
    /// Bonus paid when distance exceeds `bonus_threshold_km`
    pub weekly_bonus: f64,
    /// Distance (km) that must be exceeded to earn the bonus
    pub bonus_threshold_km: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base: 1.0,
            distance_rate: 0.5,
            time_rate: 2.0,
            weekly_bonus: 10.0,
            bonus_threshold_km: 50.0,
        }
    }
}

/// Computes reward breakdowns from a fixed [`RewardConfig`].
#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Compute the reward for one activity.
    pub fn calculate(
        &self,
        distance_km: f64,
        duration_hours: f64,
    ) -> Result<RewardBreakdown, RewardError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(RewardError::InvalidDistance(distance_km));
        }
        if !duration_hours.is_finite() || duration_hours < 0.0 {
            return Err(RewardError::InvalidDuration(duration_hours));
        }

        let base = self.config.base;
        let distance = distance_km * self.config.distance_rate;
        let time = duration_hours * self.config.time_rate;
        let bonus = if distance_km > self.config.bonus_threshold_km {
            self.config.weekly_bonus
        } else {
            0.0
        };

        Ok(RewardBreakdown {
            base,
            distance,
            time,
            bonus,
            total: base + distance + time + bonus,
        })
    }
}

/// Convert a FIXIE amount into 18-decimal base units.
///
/// Amounts are rounded to 6 decimal places first so float noise never
/// reaches the chain.
pub fn to_token_units(amount: f64) -> Result<U256, RewardError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(RewardError::InvalidAmount(amount));
    }
    let units = parse_units(format!("{:.6}", amount), TOKEN_DECIMALS)
        .map_err(|e| RewardError::Conversion(e.to_string()))?;
    Ok(units.into())
}

/// Format 18-decimal base units as a decimal FIXIE string.
pub fn from_token_units(units: U256) -> Result<String, RewardError> {
    format_units(units, TOKEN_DECIMALS).map_err(|e| RewardError::Conversion(e.to_string()))
}

/// Errors from reward computation.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    #[error("Distance must be a non-negative number, got {0}")]
    InvalidDistance(f64),

    #[error("Duration must be a non-negative number, got {0}")]
    InvalidDuration(f64),

    #[error("Reward amount must be a non-negative number, got {0}")]
    InvalidAmount(f64),

    #[error("Token unit conversion failed: {0}")]
    Conversion(String),
}

impl From<RewardError> for AppError {
    fn from(err: RewardError) -> Self {
        match err {
            RewardError::Conversion(_) => AppError::Internal(anyhow::anyhow!(err)),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}
