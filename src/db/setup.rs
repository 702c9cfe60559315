//! Creates the relational schema and seeds default config values on startup.
//! Everything is `IF NOT EXISTS` / `ON CONFLICT DO NOTHING`, so running it
//! against an already-initialized database is a no-op.

use anyhow::Result;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::info;

use super::models::NewConfig;
use super::schema::config;
use crate::events::ConfigParam;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
    id SERIAL PRIMARY KEY,
    address TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS transactions (
    id SERIAL PRIMARY KEY,
    block_height BIGINT NOT NULL,
    tx_hash TEXT NOT NULL UNIQUE,
    timestamp BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS tokens (
    id SERIAL PRIMARY KEY,
    name TEXT,
    address_id INTEGER NOT NULL UNIQUE REFERENCES addresses (id),
    voting_power BIGINT NOT NULL DEFAULT 0,
    lock_address_id INTEGER NOT NULL REFERENCES addresses (id),
    is_tnt20 BOOLEAN NOT NULL DEFAULT TRUE,
    is_active BOOLEAN NOT NULL DEFAULT FALSE,
    is_reward_token BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS proposers (
    id SERIAL PRIMARY KEY,
    address_id INTEGER NOT NULL UNIQUE REFERENCES addresses (id),
    proposal_count INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS voters (
    id SERIAL PRIMARY KEY,
    address_id INTEGER NOT NULL UNIQUE REFERENCES addresses (id)
);
CREATE TABLE IF NOT EXISTS proposals (
    id BIGINT PRIMARY KEY,
    proposer_id INTEGER NOT NULL REFERENCES proposers (id),
    start_timestamp BIGINT NOT NULL,
    end_timestamp BIGINT NOT NULL,
    title TEXT NOT NULL,
    on_chain_description TEXT NOT NULL DEFAULT '',
    description TEXT,
    links TEXT,
    reward_token_id INTEGER REFERENCES tokens (id),
    option_count INTEGER NOT NULL DEFAULT 0,
    tfuel_pot_amount NUMERIC NOT NULL DEFAULT 0,
    reward_token_pot_amount NUMERIC NOT NULL DEFAULT 0,
    voter_count INTEGER NOT NULL DEFAULT 0,
    cancelled BOOLEAN NOT NULL DEFAULT FALSE,
    transaction_id INTEGER NOT NULL REFERENCES transactions (id)
);
CREATE TABLE IF NOT EXISTS options (
    id SERIAL PRIMARY KEY,
    proposal_id BIGINT NOT NULL REFERENCES proposals (id),
    on_chain_text TEXT NOT NULL,
    text TEXT,
    votes BIGINT NOT NULL DEFAULT 0,
    on_chain_id INTEGER NOT NULL,
    UNIQUE (proposal_id, on_chain_id)
);
CREATE TABLE IF NOT EXISTS votes (
    id SERIAL PRIMARY KEY,
    proposal_id BIGINT NOT NULL REFERENCES proposals (id),
    voter_id INTEGER NOT NULL REFERENCES voters (id),
    option_index INTEGER NOT NULL,
    vote_weight BIGINT NOT NULL DEFAULT 0,
    claimed_reward BOOLEAN NOT NULL DEFAULT FALSE,
    transaction_id INTEGER NOT NULL REFERENCES transactions (id),
    UNIQUE (proposal_id, voter_id)
);
CREATE TABLE IF NOT EXISTS tnt20_deposits (
    id SERIAL PRIMARY KEY,
    voter_id INTEGER NOT NULL REFERENCES voters (id),
    voting_token_id INTEGER NOT NULL REFERENCES tokens (id),
    amount NUMERIC NOT NULL DEFAULT 0,
    transaction_id INTEGER NOT NULL REFERENCES transactions (id),
    UNIQUE (voter_id, voting_token_id)
);
CREATE TABLE IF NOT EXISTS tnt721_deposits (
    id SERIAL PRIMARY KEY,
    token_id BIGINT NOT NULL,
    voting_token_id INTEGER NOT NULL REFERENCES tokens (id),
    voter_id INTEGER NOT NULL REFERENCES voters (id),
    transaction_id INTEGER NOT NULL REFERENCES transactions (id),
    UNIQUE (token_id, voting_token_id)
);
CREATE TABLE IF NOT EXISTS voting_tokens (
    id SERIAL PRIMARY KEY,
    proposal_id BIGINT NOT NULL REFERENCES proposals (id),
    token_id INTEGER NOT NULL REFERENCES tokens (id),
    voting_power BIGINT NOT NULL DEFAULT 0,
    UNIQUE (proposal_id, token_id)
);
CREATE TABLE IF NOT EXISTS config (
    name TEXT PRIMARY KEY,
    value BIGINT NOT NULL,
    transaction_id INTEGER REFERENCES transactions (id)
);
CREATE TABLE IF NOT EXISTS applied_logs (
    id SERIAL PRIMARY KEY,
    transaction_id INTEGER NOT NULL REFERENCES transactions (id),
    log_index INTEGER NOT NULL,
    UNIQUE (transaction_id, log_index)
);
"#;

/// Deployment-time defaults. A seeded row carries no provenance transaction,
/// so the first on-chain update always replaces it.
pub const CONFIG_DEFAULTS: [(ConfigParam, i64); 9] = [
    (ConfigParam::MaxOptionValue, 8),
    (ConfigParam::PotProposalRewardRatio, 100),
    (ConfigParam::SplitTFuelOwnersRatio, 500),
    (ConfigParam::MaxVotingPeriod, 1_209_600),
    (ConfigParam::MinVotingPeriod, 604_800),
    (ConfigParam::MaxProposalPeriod, 1_209_600),
    (ConfigParam::MinProposalPeriod, 604_800),
    (ConfigParam::MaxVotingTokens, 4),
    (ConfigParam::BlockHeight, 0),
];

pub fn create_tables(conn: &PgConnection) -> Result<()> {
    conn.batch_execute(SCHEMA_SQL)?;
    let seeds: Vec<NewConfig> = CONFIG_DEFAULTS
        .iter()
        .map(|(param, value)| NewConfig {
            name: param.as_str(),
            value: *value,
            transaction_id: None,
        })
        .collect();
    let seeded = diesel::insert_into(config::table)
        .values(&seeds)
        .on_conflict(config::name)
        .do_nothing()
        .execute(conn)?;
    if seeded > 0 {
        info!("seeded {} default config values", seeded);
    }
    Ok(())
}
