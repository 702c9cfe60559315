//! Access to the Theta chain: block ingestion over the bridge RPC, contract
//! state read-back over `eth_call`, and the TFUEL price feed.

pub mod client;
pub mod types;

pub use client::ThetaClient;
pub use types::{ThetaBlock, ThetaLog, ThetaTransaction};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

/// First block the watched contracts could have emitted events in. Nothing
/// below this height is ever scanned.
pub const EARLIEST_BLOCK: u64 = 8_287_154;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The height is below the floor or past the chain head. At the head this
    /// is the scanner's signal to wait and retry, not a failure.
    #[error("block {height} is out of range of valid blocks ({floor}-CURRENT)")]
    BlockOutOfRange { height: u64, floor: u64 },
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed rpc response: {0}")]
    BadResponse(String),
    #[error("eth_call failed: {0}")]
    CallFailed(String),
    #[error("unable to find TFUEL in price data")]
    PriceUnavailable,
}

/// Full proposal state as read back from the governance contract, joining
/// the `proposals(uint256)` and `getProposalVotingTokens(uint256)` views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalData {
    pub id: u64,
    pub proposer: Address,
    pub start_time: i64,
    pub end_time: i64,
    pub tfuel_reward_info: U256,
    pub token_reward_info: U256,
    pub reward_token: Address,
    pub canceled: bool,
    pub description: String,
    pub voting_tokens: Vec<Address>,
}

/// The chain operations the scanner needs, behind a trait so tests can run
/// against canned blocks.
#[async_trait]
pub trait ChainReader {
    async fn block_by_height(&self, height: u64) -> Result<ThetaBlock, ChainError>;

    async fn proposal_data(
        &self,
        contract: &str,
        proposal_id: u64,
    ) -> Result<ProposalData, ChainError>;

    async fn tfuel_price_usd(&self) -> Result<f64, ChainError>;
}
