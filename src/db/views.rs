//! Read-model shapes served to API consumers, plus the derived proposal
//! status. Status is never stored; it is computed from the row and the clock
//! at read time.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Cancelled,
    Waiting,
    Active,
    Ended,
}

/// Cancellation wins over the timeline; otherwise the proposal is waiting
/// before its start, active through its end timestamp inclusive, and ended
/// after.
pub fn proposal_status(
    cancelled: bool,
    start_timestamp: i64,
    end_timestamp: i64,
    now: i64,
) -> ProposalStatus {
    if cancelled {
        ProposalStatus::Cancelled
    } else if now < start_timestamp {
        ProposalStatus::Waiting
    } else if now <= end_timestamp {
        ProposalStatus::Active
    } else {
        ProposalStatus::Ended
    }
}

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: i32,
    pub on_chain_id: i32,
    pub on_chain_text: String,
    /// Off-chain override shown in place of the on-chain text when set.
    pub text: Option<String>,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
pub struct VotingTokenView {
    pub address: String,
    pub name: Option<String>,
    pub voting_power: i64,
}

#[derive(Debug, Serialize)]
pub struct RewardTokenView {
    pub address: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProposalView {
    pub id: i64,
    pub proposer: String,
    pub title: String,
    pub on_chain_description: String,
    pub description: Option<String>,
    pub links: serde_json::Value,
    pub status: ProposalStatus,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub tfuel_pot_amount: f64,
    pub reward_token_pot_amount: f64,
    pub voter_count: i32,
    pub reward_token: Option<RewardTokenView>,
    pub options: Vec<OptionView>,
    pub voting_tokens: Vec<VotingTokenView>,
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub address: String,
    pub name: Option<String>,
    pub voting_power: i64,
    pub lock_address: String,
    pub is_tnt20: bool,
    pub is_active: bool,
    pub is_reward_token: bool,
}

#[derive(Debug, Serialize)]
pub struct ProposerView {
    pub address: String,
    pub proposal_count: i32,
    pub is_active: bool,
}
