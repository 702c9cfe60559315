//! Normalized domain events decoded from contract logs.
//!
//! Each bounded context gets its own tagged union so lock-contract events,
//! governance events and parameter updates can never be confused with each
//! other, no matter which contract emitted them.

pub mod catalog;
pub mod contracts;

pub use catalog::{ContractDefinition, EventAbi, EventParam, SmartContract};

use alloy_primitives::{Address, U256};

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Lock(LockEvent),
    Governance(GovernanceEvent),
    Config(ConfigEvent),
}

/// Events emitted by the TNT-20 / TNT-721 lock contracts. The token address
/// is attached by the contract definition; the log itself only names the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Tnt20Locked { token: Address, user: Address, amount: U256 },
    Tnt20Unlocked { token: Address, user: Address, amount: U256 },
    Tnt721Locked { token: Address, user: Address, token_id: U256 },
    Tnt721Unlocked { token: Address, user: Address, token_id: U256 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GovernanceEvent {
    ProposalCreated(ProposalCreated),
    ProposalCanceled {
        proposal_id: U256,
    },
    VoteCast {
        voter: Address,
        proposal_id: U256,
        option: u8,
        votes: U256,
    },
    RewardClaimed {
        voter: Address,
        proposal_id: U256,
        reward_tfuel: U256,
        reward_token: U256,
    },
    ProposerRoleUpdated {
        proposer: Address,
        active: bool,
    },
    TokenInfoUpdated {
        token: Address,
        voting_power: U256,
        lock_address: Address,
        is_tnt20: bool,
    },
    RewardTokenUpdated {
        token: Address,
        is_reward_token: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalCreated {
    pub proposal_id: U256,
    pub proposer: Address,
    pub description: String,
    pub options: Vec<String>,
    pub start_time: U256,
    pub end_time: U256,
    pub reward_token_amount: U256,
    pub tfuel_amount: U256,
}

/// A global-parameter update. `value` converges to the value carried by the
/// transaction with the highest block height (see the config reducer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    pub param: ConfigParam,
    pub value: U256,
}

/// The named global parameters kept in the config table. `BlockHeight` is
/// scan bookkeeping, never produced by a contract event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigParam {
    MaxOptionValue,
    PotProposalRewardRatio,
    SplitTFuelOwnersRatio,
    MaxVotingPeriod,
    MinVotingPeriod,
    MaxProposalPeriod,
    MinProposalPeriod,
    MaxVotingTokens,
    BlockHeight,
}

impl ConfigParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigParam::MaxOptionValue => "MaxOptionValue",
            ConfigParam::PotProposalRewardRatio => "PotProposalRewardRatio",
            ConfigParam::SplitTFuelOwnersRatio => "SplitTFuelOwnersRatio",
            ConfigParam::MaxVotingPeriod => "MaxVotingPeriod",
            ConfigParam::MinVotingPeriod => "MinVotingPeriod",
            ConfigParam::MaxProposalPeriod => "MaxProposalPeriod",
            ConfigParam::MinProposalPeriod => "MinProposalPeriod",
            ConfigParam::MaxVotingTokens => "MaxVotingTokens",
            ConfigParam::BlockHeight => "blockHeight",
        }
    }
}
