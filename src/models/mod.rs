// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod reward;
pub mod stats;
pub mod track;
pub mod user;

pub use activity::Activity;
pub use reward::{RewardBreakdown, RewardStatus, RewardTier};
pub use stats::UserStats;
pub use track::TrackPoint;
pub use user::User;
