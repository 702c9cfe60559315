//! Insertable and queryable row types. Field order in the `Queryable`
//! structs matches column order in `schema.rs`.

use bigdecimal::BigDecimal;

use super::schema::{
    addresses, applied_logs, config, options, proposals, proposers, tnt20_deposits,
    tnt721_deposits, tokens, transactions, voters, votes, voting_tokens,
};

#[derive(Insertable)]
#[table_name = "addresses"]
pub struct NewAddress<'a> {
    pub address: &'a str,
}

#[derive(Insertable)]
#[table_name = "transactions"]
pub struct NewTransaction<'a> {
    pub block_height: i64,
    pub tx_hash: &'a str,
    pub timestamp: i64,
}

#[derive(Insertable)]
#[table_name = "tokens"]
pub struct NewToken {
    pub address_id: i32,
    pub voting_power: i64,
    pub lock_address_id: i32,
    pub is_tnt20: bool,
    pub is_active: bool,
}

#[derive(Insertable)]
#[table_name = "proposers"]
pub struct NewProposer {
    pub address_id: i32,
    pub is_active: bool,
}

#[derive(Insertable)]
#[table_name = "voters"]
pub struct NewVoter {
    pub address_id: i32,
}

#[derive(Insertable)]
#[table_name = "proposals"]
pub struct NewProposal<'a> {
    pub id: i64,
    pub proposer_id: i32,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub title: String,
    pub on_chain_description: &'a str,
    pub option_count: i32,
    pub tfuel_pot_amount: BigDecimal,
    pub reward_token_pot_amount: BigDecimal,
    pub transaction_id: i32,
}

#[derive(Insertable)]
#[table_name = "options"]
pub struct NewOption<'a> {
    pub proposal_id: i64,
    pub on_chain_text: &'a str,
    pub on_chain_id: i32,
}

#[derive(Insertable)]
#[table_name = "votes"]
pub struct NewVote {
    pub proposal_id: i64,
    pub voter_id: i32,
    pub option_index: i32,
    pub vote_weight: i64,
    pub transaction_id: i32,
}

#[derive(Insertable)]
#[table_name = "tnt20_deposits"]
pub struct NewTnt20Deposit {
    pub voter_id: i32,
    pub voting_token_id: i32,
    pub amount: BigDecimal,
    pub transaction_id: i32,
}

#[derive(Insertable)]
#[table_name = "tnt721_deposits"]
pub struct NewTnt721Deposit {
    pub token_id: i64,
    pub voting_token_id: i32,
    pub voter_id: i32,
    pub transaction_id: i32,
}

#[derive(Insertable)]
#[table_name = "voting_tokens"]
pub struct NewVotingToken {
    pub proposal_id: i64,
    pub token_id: i32,
    pub voting_power: i64,
}

#[derive(Insertable)]
#[table_name = "config"]
pub struct NewConfig<'a> {
    pub name: &'a str,
    pub value: i64,
    pub transaction_id: Option<i32>,
}

#[derive(Insertable)]
#[table_name = "applied_logs"]
pub struct NewAppliedLog {
    pub transaction_id: i32,
    pub log_index: i32,
}

#[derive(Debug, Queryable)]
pub struct TokenRow {
    pub id: i32,
    pub name: Option<String>,
    pub address_id: i32,
    pub voting_power: i64,
    pub lock_address_id: i32,
    pub is_tnt20: bool,
    pub is_active: bool,
    pub is_reward_token: bool,
}

#[derive(Debug, Queryable)]
pub struct ProposerRow {
    pub id: i32,
    pub address_id: i32,
    pub proposal_count: i32,
    pub is_active: bool,
}

#[derive(Debug, Queryable)]
pub struct ProposalRow {
    pub id: i64,
    pub proposer_id: i32,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub title: String,
    pub on_chain_description: String,
    pub description: Option<String>,
    pub links: Option<String>,
    pub reward_token_id: Option<i32>,
    pub option_count: i32,
    pub tfuel_pot_amount: BigDecimal,
    pub reward_token_pot_amount: BigDecimal,
    pub voter_count: i32,
    pub cancelled: bool,
    pub transaction_id: i32,
}

#[derive(Debug, Queryable)]
pub struct OptionRow {
    pub id: i32,
    pub proposal_id: i64,
    pub on_chain_text: String,
    pub text: Option<String>,
    pub votes: i64,
    pub on_chain_id: i32,
}

#[derive(Debug, Queryable)]
pub struct VotingTokenRow {
    pub id: i32,
    pub proposal_id: i64,
    pub token_id: i32,
    pub voting_power: i64,
}
