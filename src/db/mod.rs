//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Wallet users (keyed by lowercase address)
    pub const USERS: &str = "users";
    pub const ACTIVITIES: &str = "activities";
    /// User stats aggregates (keyed by user_id)
    pub const USER_STATS: &str = "user_stats";
}
