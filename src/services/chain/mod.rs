// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-chain settlement: FIXIE token rewards and achievement NFTs.
//!
//! The service is generic over the ethers middleware so it can run against
//! a signing HTTP client in production and a mocked provider in tests.

pub mod nft;
pub mod token;

use crate::config::ChainConfig;
use crate::error::AppError;
use ethers::contract::parse_log;
use ethers::prelude::{
    Http, LocalWallet, Middleware, PendingTransaction, Provider, Signer, SignerMiddleware,
};
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use ethers::utils::{keccak256, to_checksum};
use futures_util::future::try_join_all;
use nft::{AchievementMintedFilter, FixieAchievements};
use serde::Serialize;
use std::sync::Arc;
use token::FixieToken;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Production middleware: HTTP JSON-RPC provider with a local signer.
pub type ChainClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Upper bound on NFTs enumerated for a single owner.
const MAX_LISTED_NFTS: u64 = 50;

/// Result of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutcome {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// An achievement NFT held by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct NftToken {
    pub token_id: String,
    pub token_uri: String,
}

/// Status of a transaction as seen by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

/// Errors from chain interaction.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid chain configuration: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Contract call failed: {0}")]
    Call(String),

    #[error("Transaction submission failed: {0}")]
    Send(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Transaction {0} dropped from mempool")]
    Dropped(String),
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidAddress(_) => AppError::BadRequest(err.to_string()),
            _ => AppError::Blockchain(err.to_string()),
        }
    }
}

/// Token and NFT contracts bound to one middleware.
pub struct ChainService<M: Middleware> {
    client: Arc<M>,
    token: FixieToken<M>,
    achievements: FixieAchievements<M>,
}

impl ChainService<ChainClient> {
    /// Build a signing client from configuration.
    pub fn connect(config: &ChainConfig) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| ChainError::Config(format!("rpc url: {}", e)))?;
        let wallet = config
            .private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Config(format!("private key: {}", e)))?
            .with_chain_id(config.chain_id);

        tracing::info!(
            chain_id = config.chain_id,
            distributor = %to_checksum(&wallet.address(), None),
            "Chain client configured"
        );

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        Ok(Self::new(
            client,
            parse_address(&config.token_address)?,
            parse_address(&config.nft_address)?,
        ))
    }
}

impl<M: Middleware + 'static> ChainService<M> {
    pub fn new(client: Arc<M>, token_address: Address, nft_address: Address) -> Self {
        Self {
            token: FixieToken::new(token_address, client.clone()),
            achievements: FixieAchievements::new(nft_address, client.clone()),
            client,
        }
    }

    /// FIXIE balance of `owner` in base units.
    pub async fn token_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.token
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| ChainError::Call(e.to_string()))
    }

    /// Pay `amount` base units to `recipient` for one activity and wait for
    /// the receipt.
    pub async fn reward_activity(
        &self,
        recipient: Address,
        activity_id: &str,
        amount: U256,
    ) -> Result<TxOutcome, ChainError> {
        let call = self
            .token
            .reward_activity(recipient, activity_key(activity_id), amount);
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::Send(e.to_string()))?;

        let receipt = wait_for_receipt(pending).await?;
        Ok(outcome(&receipt))
    }

    /// Mint an achievement NFT. Returns the outcome and, when the mint
    /// event is present in the receipt, the new token id.
    pub async fn mint_achievement(
        &self,
        to: Address,
        tier: &str,
        token_uri: &str,
    ) -> Result<(TxOutcome, Option<U256>), ChainError> {
        let call = self
            .achievements
            .mint_achievement(to, tier.to_string(), token_uri.to_string());
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::Send(e.to_string()))?;

        let receipt = wait_for_receipt(pending).await?;
        let token_id = minted_token_id(&receipt, self.achievements.address());

        Ok((outcome(&receipt), token_id))
    }

    /// Achievement NFTs held by `owner`.
    pub async fn owned_nfts(&self, owner: Address) -> Result<Vec<NftToken>, ChainError> {
        let balance = self
            .achievements
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| ChainError::Call(e.to_string()))?;
        let count = balance.min(U256::from(MAX_LISTED_NFTS)).as_u64();

        let token_ids = try_join_all((0..count).map(|index| async move {
            self.achievements
                .token_of_owner_by_index(owner, U256::from(index))
                .call()
                .await
        }))
        .await
        .map_err(|e| ChainError::Call(e.to_string()))?;

        let uris = try_join_all(
            token_ids
                .iter()
                .map(|id| async move { self.achievements.token_uri(*id).call().await }),
        )
        .await
        .map_err(|e| ChainError::Call(e.to_string()))?;

        Ok(token_ids
            .into_iter()
            .zip(uris)
            .map(|(id, token_uri)| NftToken {
                token_id: id.to_string(),
                token_uri,
            })
            .collect())
    }

    /// Look up the receipt of a transaction.
    pub async fn verify_transaction(&self, tx_hash: H256) -> Result<TxStatus, ChainError> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainError::Call(e.to_string()))?;

        Ok(match receipt {
            None => TxStatus::Pending,
            Some(r) if r.status == Some(U64::from(1)) => TxStatus::Success,
            Some(_) => TxStatus::Failed,
        })
    }
}

async fn wait_for_receipt<P: ethers::providers::JsonRpcClient>(
    pending: PendingTransaction<'_, P>,
) -> Result<TransactionReceipt, ChainError> {
    let tx_hash = format!("{:?}", pending.tx_hash());
    tracing::info!(tx_hash = %tx_hash, "Transaction sent");

    let receipt = pending
        .await
        .map_err(|e| ChainError::Send(e.to_string()))?;
    check_receipt(tx_hash, receipt)
}

/// A mined receipt with success status, or why there is none.
fn check_receipt(
    tx_hash: String,
    receipt: Option<TransactionReceipt>,
) -> Result<TransactionReceipt, ChainError> {
    let receipt = receipt.ok_or_else(|| ChainError::Dropped(tx_hash.clone()))?;
    if receipt.status != Some(U64::from(1)) {
        return Err(ChainError::Reverted(tx_hash));
    }
    Ok(receipt)
}

/// Token id from the first `AchievementMinted` event emitted by the NFT
/// contract.
fn minted_token_id(receipt: &TransactionReceipt, nft_address: Address) -> Option<U256> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == nft_address)
        .find_map(|log| parse_log::<AchievementMintedFilter>(log.clone()).ok())
        .map(|event| event.token_id)
}

fn outcome(receipt: &TransactionReceipt) -> TxOutcome {
    TxOutcome {
        tx_hash: format!("{:?}", receipt.transaction_hash),
        block_number: receipt.block_number.map(|n| n.as_u64()),
    }
}

/// `bytes32` key identifying an activity on chain.
pub fn activity_key(activity_id: &str) -> [u8; 32] {
    keccak256(activity_id.as_bytes())
}

/// Parse a 0x-prefixed hex address.
pub fn parse_address(raw: &str) -> Result<Address, ChainError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| ChainError::InvalidAddress(raw.to_string()))
}

/// Parse a 0x-prefixed transaction hash.
pub fn parse_tx_hash(raw: &str) -> Result<H256, AppError> {
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::BadRequest(format!("Invalid transaction hash: {}", raw)));
    }
    hex_part
        .parse::<H256>()
        .map_err(|_| AppError::BadRequest(format!("Invalid transaction hash: {}", raw)))
}
