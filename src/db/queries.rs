//! Read accessors over the indexed tables, shaping rows into view structs,
//! and the off-chain content updates (titles, descriptions, links, token
//! names) that enrich what the chain provides.

use anyhow::Result;
use bigdecimal::BigDecimal;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use super::models::{OptionRow, ProposalRow, ProposerRow, TokenRow, VotingTokenRow};
use super::schema::{addresses, config, options, proposals, proposers, tokens, voting_tokens};
use super::setup::CONFIG_DEFAULTS;
use super::views::{
    proposal_status, OptionView, ProposalView, ProposerView, RewardTokenView, TokenView,
    VotingTokenView,
};
use crate::events::ConfigParam;

fn address_text(conn: &PgConnection, id: i32) -> Result<String> {
    Ok(addresses::table
        .find(id)
        .select(addresses::address)
        .first(conn)?)
}

fn address_lookup(conn: &PgConnection, address: &str) -> Result<Option<i32>> {
    Ok(addresses::table
        .filter(addresses::address.eq(address))
        .select(addresses::id)
        .first(conn)
        .optional()?)
}

fn amount_f64(amount: &BigDecimal) -> f64 {
    amount.to_string().parse().unwrap_or(0.0)
}

pub fn config_value(conn: &PgConnection, param: ConfigParam) -> Result<i64> {
    let stored: Option<i64> = config::table
        .find(param.as_str())
        .select(config::value)
        .first(conn)
        .optional()?;
    Ok(stored.unwrap_or_else(|| {
        CONFIG_DEFAULTS
            .iter()
            .find(|(seeded, _)| *seeded == param)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }))
}

fn token_view(conn: &PgConnection, row: TokenRow) -> Result<TokenView> {
    Ok(TokenView {
        address: address_text(conn, row.address_id)?,
        name: row.name,
        voting_power: row.voting_power,
        lock_address: address_text(conn, row.lock_address_id)?,
        is_tnt20: row.is_tnt20,
        is_active: row.is_active,
        is_reward_token: row.is_reward_token,
    })
}

pub fn all_tokens(conn: &PgConnection) -> Result<Vec<TokenView>> {
    let rows: Vec<TokenRow> = tokens::table.load(conn)?;
    rows.into_iter().map(|row| token_view(conn, row)).collect()
}

/// Tokens currently usable for voting.
pub fn active_voting_tokens(conn: &PgConnection) -> Result<Vec<TokenView>> {
    let rows: Vec<TokenRow> = tokens::table.filter(tokens::is_active.eq(true)).load(conn)?;
    rows.into_iter().map(|row| token_view(conn, row)).collect()
}

pub fn reward_tokens(conn: &PgConnection) -> Result<Vec<TokenView>> {
    let rows: Vec<TokenRow> = tokens::table
        .filter(tokens::is_reward_token.eq(true))
        .load(conn)?;
    rows.into_iter().map(|row| token_view(conn, row)).collect()
}

fn proposer_view(conn: &PgConnection, row: ProposerRow) -> Result<ProposerView> {
    Ok(ProposerView {
        address: address_text(conn, row.address_id)?,
        proposal_count: row.proposal_count,
        is_active: row.is_active,
    })
}

pub fn proposer(conn: &PgConnection, address: &str) -> Result<Option<ProposerView>> {
    let address_id = match address_lookup(conn, address)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let row: Option<ProposerRow> = proposers::table
        .filter(proposers::address_id.eq(address_id))
        .first(conn)
        .optional()?;
    match row {
        Some(row) => Ok(Some(proposer_view(conn, row)?)),
        None => Ok(None),
    }
}

pub fn all_proposers(conn: &PgConnection) -> Result<Vec<ProposerView>> {
    let rows: Vec<ProposerRow> = proposers::table.load(conn)?;
    rows.into_iter()
        .map(|row| proposer_view(conn, row))
        .collect()
}

fn proposal_view(conn: &PgConnection, row: ProposalRow, now: i64) -> Result<ProposalView> {
    let proposer_row: ProposerRow = proposers::table.find(row.proposer_id).first(conn)?;
    let proposer = address_text(conn, proposer_row.address_id)?;

    let option_rows: Vec<OptionRow> = options::table
        .filter(options::proposal_id.eq(row.id))
        .order(options::on_chain_id.asc())
        .load(conn)?;
    let option_views = option_rows
        .into_iter()
        .map(|option| OptionView {
            id: option.id,
            on_chain_id: option.on_chain_id,
            on_chain_text: option.on_chain_text,
            text: option.text,
            votes: option.votes,
        })
        .collect();

    let voting_rows: Vec<VotingTokenRow> = voting_tokens::table
        .filter(voting_tokens::proposal_id.eq(row.id))
        .load(conn)?;
    let mut voting_views = Vec::with_capacity(voting_rows.len());
    for voting in voting_rows {
        let token: TokenRow = tokens::table.find(voting.token_id).first(conn)?;
        voting_views.push(VotingTokenView {
            address: address_text(conn, token.address_id)?,
            name: token.name,
            voting_power: voting.voting_power,
        });
    }

    let reward_token = match row.reward_token_id {
        None => None,
        Some(id) => {
            let token: TokenRow = tokens::table.find(id).first(conn)?;
            Some(RewardTokenView {
                address: address_text(conn, token.address_id)?,
                name: token.name,
            })
        }
    };

    let links = row
        .links
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| serde_json::Value::Array(vec![]));

    Ok(ProposalView {
        id: row.id,
        proposer,
        title: row.title,
        on_chain_description: row.on_chain_description,
        description: row.description,
        links,
        status: proposal_status(row.cancelled, row.start_timestamp, row.end_timestamp, now),
        start_timestamp: row.start_timestamp,
        end_timestamp: row.end_timestamp,
        tfuel_pot_amount: amount_f64(&row.tfuel_pot_amount),
        reward_token_pot_amount: amount_f64(&row.reward_token_pot_amount),
        voter_count: row.voter_count,
        reward_token,
        options: option_views,
        voting_tokens: voting_views,
    })
}

pub fn proposal(conn: &PgConnection, id: i64, now: i64) -> Result<Option<ProposalView>> {
    let row: Option<ProposalRow> = proposals::table.find(id).first(conn).optional()?;
    match row {
        Some(row) => Ok(Some(proposal_view(conn, row, now)?)),
        None => Ok(None),
    }
}

/// Newest-ending first, paged.
pub fn proposals_page(
    conn: &PgConnection,
    page: i64,
    per_page: i64,
    now: i64,
) -> Result<Vec<ProposalView>> {
    let rows: Vec<ProposalRow> = proposals::table
        .order(proposals::end_timestamp.desc())
        .offset(page * per_page)
        .limit(per_page)
        .load(conn)?;
    rows.into_iter()
        .map(|row| proposal_view(conn, row, now))
        .collect()
}

/// Off-chain display name for a token; `false` when the token is unknown.
pub fn set_token_name(conn: &PgConnection, address: &str, name: &str) -> Result<bool> {
    let address_id = match address_lookup(conn, address)? {
        Some(id) => id,
        None => return Ok(false),
    };
    let updated = diesel::update(tokens::table.filter(tokens::address_id.eq(address_id)))
        .set(tokens::name.eq(name))
        .execute(conn)?;
    Ok(updated > 0)
}

/// Off-chain proposal content. Each field updates independently so a partial
/// edit never clears the others.
pub fn update_proposal_content(
    conn: &PgConnection,
    proposal_id: i64,
    title: Option<&str>,
    description: Option<&str>,
    links: Option<&serde_json::Value>,
) -> Result<bool> {
    let exists: Option<i64> = proposals::table
        .find(proposal_id)
        .select(proposals::id)
        .first(conn)
        .optional()?;
    if exists.is_none() {
        return Ok(false);
    }
    if let Some(title) = title {
        diesel::update(proposals::table.find(proposal_id))
            .set(proposals::title.eq(title))
            .execute(conn)?;
    }
    if let Some(description) = description {
        diesel::update(proposals::table.find(proposal_id))
            .set(proposals::description.eq(description))
            .execute(conn)?;
    }
    if let Some(links) = links {
        diesel::update(proposals::table.find(proposal_id))
            .set(proposals::links.eq(links.to_string()))
            .execute(conn)?;
    }
    Ok(true)
}

/// Off-chain display text for one option, keyed by its on-chain index.
pub fn set_option_text(
    conn: &PgConnection,
    proposal_id: i64,
    on_chain_id: i32,
    text: &str,
) -> Result<bool> {
    let updated = diesel::update(
        options::table.filter(
            options::proposal_id
                .eq(proposal_id)
                .and(options::on_chain_id.eq(on_chain_id)),
        ),
    )
    .set(options::text.eq(text))
    .execute(conn)?;
    Ok(updated > 0)
}
