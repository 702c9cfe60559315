//! Raw bridge RPC payloads and their normalized forms.
//!
//! The Theta bridge RPC encodes block heights and timestamps as decimal
//! strings and log data as base64. Normalization turns those into native
//! integers and 0x-prefixed hex, assigns positional log indexes, and keeps
//! only smart-contract transactions.

use alloy_primitives::B256;
use serde::Deserialize;

use super::ChainError;

/// Theta transaction type tag for smart-contract calls. Other transaction
/// types carry no EVM logs and are dropped during normalization.
pub const SMART_CONTRACT_TX: u8 = 7;

#[derive(Debug, Deserialize)]
pub struct RawBlock {
    pub height: Option<String>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(default)]
    pub hash: String,
    pub receipt: Option<RawReceipt>,
}

#[derive(Debug, Deserialize)]
pub struct RawReceipt {
    #[serde(rename = "ContractAddress", default)]
    pub contract_address: String,
    #[serde(rename = "Logs", default)]
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
pub struct RawLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Base64 in the bridge payload.
    #[serde(default)]
    pub data: String,
}

/// A normalized block ready for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThetaBlock {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
    pub transactions: Vec<ThetaTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThetaTransaction {
    pub hash: String,
    pub contract_address: String,
    pub logs: Vec<ThetaLog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThetaLog {
    pub address: String,
    pub topics: Vec<B256>,
    /// 0x-prefixed hex.
    pub data: String,
    /// Position of the log within its transaction's receipt.
    pub log_index: u32,
}

impl RawBlock {
    pub fn into_block(self) -> Result<ThetaBlock, ChainError> {
        let height = parse_u64("height", self.height.as_deref().unwrap_or(""))?;
        let timestamp = parse_u64("timestamp", &self.timestamp)? as i64;
        let mut transactions = Vec::new();
        for tx in self.transactions {
            if tx.tx_type != SMART_CONTRACT_TX {
                continue;
            }
            let receipt = match tx.receipt {
                Some(receipt) => receipt,
                None => continue,
            };
            let mut logs = Vec::with_capacity(receipt.logs.len());
            for (position, log) in receipt.logs.into_iter().enumerate() {
                logs.push(log.normalize(position as u32)?);
            }
            transactions.push(ThetaTransaction {
                hash: tx.hash,
                contract_address: receipt.contract_address,
                logs,
            });
        }
        Ok(ThetaBlock {
            height,
            hash: self.hash,
            timestamp,
            transactions,
        })
    }
}

impl RawLog {
    fn normalize(self, log_index: u32) -> Result<ThetaLog, ChainError> {
        let mut topics = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            let parsed: B256 = topic.parse().map_err(|_| {
                ChainError::BadResponse(format!("malformed log topic `{}`", topic))
            })?;
            topics.push(parsed);
        }
        let raw = base64::decode(&self.data)
            .map_err(|_| ChainError::BadResponse("log data is not base64".to_string()))?;
        Ok(ThetaLog {
            address: self.address,
            topics,
            data: format!("0x{}", alloy_primitives::hex::encode(raw)),
            log_index,
        })
    }
}

fn parse_u64(field: &str, value: &str) -> Result<u64, ChainError> {
    value.parse().map_err(|_| {
        ChainError::BadResponse(format!("block field `{}` is not a decimal integer: `{}`", field, value))
    })
}
