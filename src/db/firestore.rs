// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (wallet profiles)
//! - Activities (recorded rides/runs with their reward)
//! - User stats (per-user aggregates, also used for the leaderboard)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{Activity, RewardStatus, RewardTier, User, UserStats};
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Emulator client with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJmaXhpZSJ9."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let client = firestore::FirestoreDb::with_options_token_source(
            firestore::FirestoreDbOptions::new(project_id.to_string()),
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client for tests. Every operation returns a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Client whose reads are registered with `transaction` for conflict detection.
    fn transactional_reader(
        &self,
        transaction: &firestore::FirestoreTransaction<'_>,
    ) -> Result<firestore::FirestoreDb, AppError> {
        Ok(self
            .get_client()?
            .clone_with_consistency_selector(firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            )))
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Fetch several users, preserving input order. Missing users are skipped.
    pub async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>, AppError> {
        let results = stream::iter(user_ids.iter().cloned())
            .map(|id| async move { self.get_user(&id).await })
            .buffered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<User>, AppError>>>()
            .await;

        let mut users = Vec::with_capacity(results.len());
        for result in results {
            if let Some(user) = result? {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Activity Operations ─────────────────────────────────────

    pub async fn get_activity(&self, activity_id: &str) -> Result<Option<Activity>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(activity_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Activities for a user, newest first.
    ///
    /// `after` keeps only activities that started strictly after that
    /// RFC3339 instant. `cursor` is the `sort_key` of the last activity of
    /// the previous page.
    pub async fn get_activities_for_user(
        &self,
        user_id: &str,
        after: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Activity>, AppError> {
        let user_id = user_id.to_string();
        // '~' sorts after every character of a UUID, so this excludes the instant itself.
        let after_key = after.map(|date| format!("{}#~", date));
        let cursor = cursor.map(str::to_string);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    after_key
                        .clone()
                        .and_then(|key| q.field("sort_key").greater_than(key)),
                    cursor
                        .clone()
                        .and_then(|key| q.field("sort_key").less_than(key)),
                ])
            })
            .order_by([("sort_key", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn all_activities_for_user(&self, user_id: &str) -> Result<Vec<Activity>, AppError> {
        Self::query_activities_for_user(self.get_client()?, user_id).await
    }

    async fn query_activities_for_user(
        client: &firestore::FirestoreDb,
        user_id: &str,
    ) -> Result<Vec<Activity>, AppError> {
        let user_id = user_id.to_string();
        client
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an activity and rebuild the owner's stats from what remains.
    ///
    /// The stats document is read inside the transaction so a concurrent
    /// `record_activity_atomic` cannot slip an activity past the rebuild.
    pub async fn delete_activity(&self, activity_id: &str, user_id: &str) -> Result<(), AppError> {
        let client = self.get_client()?;
        let now = crate::time_utils::format_utc_rfc3339(chrono::Utc::now());

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let reader = self.transactional_reader(&transaction)?;

        let _locked_stats: Option<UserStats> = reader
            .fluent()
            .select()
            .by_id_in(collections::USER_STATS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read stats in transaction: {}", e))
            })?;

        let activities = Self::query_activities_for_user(&reader, user_id).await?;
        let remaining: Vec<&Activity> = activities
            .iter()
            .filter(|a| a.id != activity_id)
            .collect();
        let stats = UserStats::rebuild(user_id, remaining.iter().copied(), &now);

        client
            .fluent()
            .delete()
            .from(collections::ACTIVITIES)
            .document_id(activity_id)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add deletion to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::USER_STATS)
            .document_id(user_id)
            .object(&stats)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add stats to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            user_id,
            activity_id,
            remaining = remaining.len(),
            "Activity deleted, stats rebuilt"
        );
        Ok(())
    }

    // ─── User Stats Operations ──────────────────────────────────

    pub async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USER_STATS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn set_user_stats(&self, user_id: &str, stats: &UserStats) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USER_STATS)
            .document_id(user_id)
            .object(stats)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Stats documents with the largest cumulative distance.
    pub async fn top_stats_by_distance(&self, limit: u32) -> Result<Vec<UserStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_STATS)
            .order_by([(
                "total_distance_km",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Activity Writes ─────────────────────────────────────

    /// Atomically store a new activity and fold it into the owner's stats.
    ///
    /// Returns `true` if the activity was newly recorded, `false` if it was
    /// already counted (idempotent duplicate) or the user no longer exists.
    pub async fn record_activity_atomic(&self, activity: &Activity) -> Result<bool, AppError> {
        let user_id = activity.user_id.as_str();
        let activity_id = activity.id.as_str();
        let now = crate::time_utils::format_utc_rfc3339(chrono::Utc::now());

        // Don't resurrect data for an account deleted mid-request
        if self.get_user(user_id).await?.is_none() {
            tracing::warn!(
                user_id,
                activity_id,
                "User not found, aborting activity write"
            );
            return Ok(false);
        }

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let current_stats: Option<UserStats> = self
            .transactional_reader(&transaction)?
            .fluent()
            .select()
            .by_id_in(collections::USER_STATS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read stats in transaction: {}", e))
            })?;

        let mut stats = current_stats.unwrap_or_else(|| UserStats::new(user_id));

        if !stats.update_from_activity(activity, &now) {
            tracing::debug!(user_id, activity_id, "Activity already recorded");
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        client
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(activity_id)
            .object(activity)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add activity to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::USER_STATS)
            .document_id(user_id)
            .object(&stats)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add stats to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            user_id,
            activity_id,
            reward = activity.reward.total,
            "Activity recorded atomically"
        );

        Ok(true)
    }

    /// Atomically mark an activity settled and add its reward to the
    /// owner's settled total.
    ///
    /// Returns `false` without writing if the stored activity was already
    /// settled by a concurrent request.
    pub async fn settle_activity_atomic(&self, settled: &Activity) -> Result<bool, AppError> {
        let user_id = settled.user_id.as_str();
        let activity_id = settled.id.as_str();
        let now = crate::time_utils::format_utc_rfc3339(chrono::Utc::now());

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let reader = self.transactional_reader(&transaction)?;

        let stored: Option<Activity> = reader
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(activity_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match stored {
            Some(stored) if stored.reward_status == RewardStatus::Settled => {
                let _ = transaction.rollback().await;
                return Ok(false);
            }
            Some(_) => {}
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Activity {}", activity_id)));
            }
        }

        let mut stats: UserStats = reader
            .fluent()
            .select()
            .by_id_in(collections::USER_STATS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .unwrap_or_else(|| UserStats::new(user_id));
        stats.record_settlement(settled.reward.total, &now);

        client
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(activity_id)
            .object(settled)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add activity to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::USER_STATS)
            .document_id(user_id)
            .object(&stats)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add stats to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }

    /// Mark a settlement attempt as failed, unless the stored activity has
    /// meanwhile been settled by another request.
    ///
    /// Returns `false` without writing if the activity is already `Settled`.
    pub async fn mark_settlement_failed(&self, activity_id: &str) -> Result<bool, AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let stored: Option<Activity> = self
            .transactional_reader(&transaction)?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(activity_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut failed = match stored {
            Some(stored) if stored.reward_status != RewardStatus::Settled => stored,
            Some(_) => {
                let _ = transaction.rollback().await;
                return Ok(false);
            }
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Activity {}", activity_id)));
            }
        };
        failed.reward_status = RewardStatus::Failed;

        client
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(activity_id)
            .object(&failed)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add activity to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }

    /// Record that the achievement NFT for `tier` was minted.
    ///
    /// Read-modify-write in a transaction so concurrent profile edits are
    /// not lost. Returns `false` if the tier was already recorded.
    pub async fn add_minted_tier_atomic(
        &self,
        user_id: &str,
        tier: RewardTier,
    ) -> Result<bool, AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let stored: Option<User> = self
            .transactional_reader(&transaction)?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut user = match stored {
            Some(user) if !user.minted_tiers.contains(&tier) => user,
            Some(_) => {
                let _ = transaction.rollback().await;
                return Ok(false);
            }
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("User {} not found", user_id)));
            }
        };
        user.minted_tiers.push(tier);
        user.minted_tiers.sort();

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add user to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Delete documents in transaction-sized chunks.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(id_extractor(item))
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    // ─── Account Deletion ──────────────────────────────────────────

    /// Delete every document belonging to a user.
    ///
    /// Returns the number of documents deleted. On-chain balances and NFTs
    /// are not affected.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<usize, AppError> {
        let activities = self.all_activities_for_user(user_id).await?;
        let mut deleted_count = activities.len();
        self.batch_delete(&activities, collections::ACTIVITIES, |a: &Activity| {
            a.id.clone()
        })
        .await?;
        tracing::debug!(user_id, count = deleted_count, "Deleted activities");

        for collection in [collections::USER_STATS, collections::USERS] {
            self.get_client()?
                .fluent()
                .delete()
                .from(collection)
                .document_id(user_id)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            deleted_count += 1;
        }

        tracing::info!(user_id, deleted_count, "User data deletion complete");

        Ok(deleted_count)
    }
}
