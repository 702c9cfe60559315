//! HTTP client for the Theta bridge RPC, EVM RPC and price API.
//!
//! Block fetches go to the primary bridge endpoint first and fall over to the
//! backup on any failure. `eth_call` tries each configured EVM endpoint in
//! order. Only when every endpoint has failed does an error reach the caller.

use std::time::Duration;

use alloy_primitives::{hex, Address, U256};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::types::RawBlock;
use super::{ChainError, ChainReader, ProposalData, ThetaBlock, EARLIEST_BLOCK};
use crate::abi::{self, ParamType, Token};
use crate::config::IndexerConfig;
use crate::util::u256_to_i64;

const PRICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Return layout of the governance contract's `proposals(uint256)` view.
const PROPOSAL_RETURNS: [ParamType; 9] = [
    ParamType::Uint256, // id
    ParamType::Address, // proposer
    ParamType::Uint256, // startTime
    ParamType::Uint256, // endTime
    ParamType::Uint256, // proposaltFuelRewardInfo
    ParamType::Uint256, // proposalTokenRewardInfo
    ParamType::Address, // rewardToken
    ParamType::Bool,    // canceled
    ParamType::String,  // description
];

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PriceFeed {
    body: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(rename = "_id")]
    id: String,
    price: f64,
}

pub struct ThetaClient {
    http: reqwest::Client,
    bridge_url: String,
    bridge_fallback_url: String,
    eth_urls: Vec<String>,
    price_url: String,
}

impl ThetaClient {
    pub fn new(config: &IndexerConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.eth_rpc_urls.is_empty(),
            "at least one EVM RPC url is required"
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()?;
        Ok(ThetaClient {
            http,
            bridge_url: config.bridge_rpc_url.clone(),
            bridge_fallback_url: config.bridge_fallback_rpc_url.clone(),
            eth_urls: config.eth_rpc_urls.clone(),
            price_url: config.price_api_url.clone(),
        })
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<RpcEnvelope<T>, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.http.post(url).json(&body).send().await?;
        Ok(response.json().await?)
    }

    /// `Ok(None)` means this endpoint has no such block (yet); the caller
    /// decides whether to fall over or treat the height as out of range.
    async fn fetch_block(&self, url: &str, height: u64) -> Result<Option<RawBlock>, ChainError> {
        let params = json!([{ "height": height.to_string() }]);
        let envelope: RpcEnvelope<RawBlock> =
            self.rpc(url, "theta.GetBlockByHeight", params).await?;
        if let Some(error) = envelope.error {
            debug!("bridge rpc error for block {}: {}", height, error.message);
            return Ok(None);
        }
        Ok(envelope
            .result
            .filter(|raw| raw.height.as_deref().map_or(false, |h| !h.is_empty())))
    }

    async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let params = json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            "latest",
        ]);
        let mut last_error = String::from("no EVM RPC url configured");
        for url in &self.eth_urls {
            match self.rpc::<String>(url, "eth_call", params.clone()).await {
                Ok(envelope) => match (envelope.result, envelope.error) {
                    (Some(output), _) => {
                        return hex::decode(&output).map_err(|_| {
                            ChainError::BadResponse("eth_call output is not hex".to_string())
                        });
                    }
                    (None, Some(error)) => last_error = error.message,
                    (None, None) => last_error = "empty eth_call response".to_string(),
                },
                Err(err) => {
                    warn!("eth_call via {} failed: {}", url, err);
                    last_error = err.to_string();
                }
            }
        }
        Err(ChainError::CallFailed(last_error))
    }

    async fn view_call(
        &self,
        contract: &str,
        signature: &str,
        proposal_id: u64,
        returns: &[ParamType],
    ) -> Result<Vec<Token>, ChainError> {
        let mut call = abi::selector(signature).to_vec();
        call.extend(abi::encode(&[Token::Uint(U256::from(proposal_id))]));
        let output = self.eth_call(contract, &call).await?;
        abi::decode(returns, &output)
            .map_err(|e| ChainError::BadResponse(format!("{}: {}", signature, e)))
    }
}

fn uint_field(tokens: &[Token], index: usize) -> Result<U256, ChainError> {
    tokens[index]
        .as_uint()
        .ok_or_else(|| ChainError::BadResponse(format!("return field {} is not a uint", index)))
}

fn small_uint_field(tokens: &[Token], index: usize) -> Result<i64, ChainError> {
    u256_to_i64(uint_field(tokens, index)?).map_err(|e| ChainError::BadResponse(e.to_string()))
}

fn address_field(tokens: &[Token], index: usize) -> Result<Address, ChainError> {
    tokens[index].as_address().ok_or_else(|| {
        ChainError::BadResponse(format!("return field {} is not an address", index))
    })
}

#[async_trait]
impl ChainReader for ThetaClient {
    async fn block_by_height(&self, height: u64) -> Result<ThetaBlock, ChainError> {
        if height < EARLIEST_BLOCK {
            return Err(ChainError::BlockOutOfRange {
                height,
                floor: EARLIEST_BLOCK,
            });
        }
        let raw = match self.fetch_block(&self.bridge_url, height).await {
            Ok(found) => found,
            Err(err) => {
                warn!("primary bridge rpc failed for block {}: {}", height, err);
                None
            }
        };
        let raw = match raw {
            Some(raw) => raw,
            None => self
                .fetch_block(&self.bridge_fallback_url, height)
                .await?
                .ok_or(ChainError::BlockOutOfRange {
                    height,
                    floor: EARLIEST_BLOCK,
                })?,
        };
        raw.into_block()
    }

    async fn proposal_data(
        &self,
        contract: &str,
        proposal_id: u64,
    ) -> Result<ProposalData, ChainError> {
        let tokens = self
            .view_call(contract, "proposals(uint256)", proposal_id, &PROPOSAL_RETURNS)
            .await?;
        let canceled = tokens[7]
            .as_bool()
            .ok_or_else(|| ChainError::BadResponse("return field 7 is not a bool".to_string()))?;
        let description = tokens[8]
            .as_string()
            .ok_or_else(|| ChainError::BadResponse("return field 8 is not a string".to_string()))?
            .to_string();

        let voting = self
            .view_call(
                contract,
                "getProposalVotingTokens(uint256)",
                proposal_id,
                &[ParamType::AddressArray],
            )
            .await?;
        let voting_tokens = voting[0]
            .as_address_array()
            .ok_or_else(|| {
                ChainError::BadResponse("voting tokens return is not address[]".to_string())
            })?
            .to_vec();

        Ok(ProposalData {
            id: small_uint_field(&tokens, 0)? as u64,
            proposer: address_field(&tokens, 1)?,
            start_time: small_uint_field(&tokens, 2)?,
            end_time: small_uint_field(&tokens, 3)?,
            tfuel_reward_info: uint_field(&tokens, 4)?,
            token_reward_info: uint_field(&tokens, 5)?,
            reward_token: address_field(&tokens, 6)?,
            canceled,
            description,
            voting_tokens,
        })
    }

    async fn tfuel_price_usd(&self) -> Result<f64, ChainError> {
        let feed: PriceFeed = self
            .http
            .get(&self.price_url)
            .timeout(PRICE_TIMEOUT)
            .send()
            .await?
            .json()
            .await?;
        feed.body
            .into_iter()
            .find(|entry| entry.id == "TFUEL")
            .map(|entry| entry.price)
            .ok_or(ChainError::PriceUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IndexerConfig {
        IndexerConfig {
            enable_indexer_env: true,
            bridge_rpc_url: "http://localhost:19888/rpc".to_string(),
            bridge_fallback_rpc_url: "http://localhost:19889/rpc".to_string(),
            eth_rpc_urls: vec!["http://localhost:19890/rpc".to_string()],
            price_api_url: "http://localhost:19891/price".to_string(),
            initial_block: EARLIEST_BLOCK,
            final_block: 0,
            database_url: String::new(),
            rpc_timeout_ms: 100,
            requeue_sleep: 1,
        }
    }

    // The floor check runs before any request is issued, so no endpoint is
    // needed here.
    #[tokio::test]
    async fn heights_below_the_floor_are_rejected() {
        let client = ThetaClient::new(&config()).unwrap();
        let err = client
            .block_by_height(EARLIEST_BLOCK - 1)
            .await
            .unwrap_err();
        match err {
            ChainError::BlockOutOfRange { height, floor } => {
                assert_eq!(height, EARLIEST_BLOCK - 1);
                assert_eq!(floor, EARLIEST_BLOCK);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn requires_an_evm_rpc_url() {
        let mut config = config();
        config.eth_rpc_urls.clear();
        assert!(ThetaClient::new(&config).is_err());
    }
}
