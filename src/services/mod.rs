// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod activity;
pub mod chain;
pub mod rewards;
pub mod tracks;

pub use activity::{ActivityService, NewActivity};
pub use chain::{ChainClient, ChainError, ChainService};
pub use rewards::{RewardCalculator, RewardConfig};
pub use tracks::{TrackError, TrackFormat};
