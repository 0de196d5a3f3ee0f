//! User model for storage and API.

use serde::{Deserialize, Serialize};

use crate::models::reward::RewardTier;

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Lowercase `0x` wallet address (also used as document ID)
    pub id: String,
    /// EIP-55 checksummed wallet address, for display
    pub wallet_address: String,
    /// Optional display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// When user first signed in
    pub created_at: String,
    /// Last sign-in timestamp
    pub last_active: String,
    /// Tiers for which an achievement NFT was minted
    #[serde(default)]
    pub minted_tiers: Vec<RewardTier>,
}
