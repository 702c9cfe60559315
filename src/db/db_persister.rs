//! Diesel-backed [`Persister`] implementation.
//!
//! Identity rows (addresses, voters, proposers, tokens, transactions) are
//! resolved read-first with a single retry after a unique violation, so a
//! concurrent writer can never break resolution. Additive mutations run
//! inside one database transaction together with an applied-log marker, so a
//! re-scan of already-indexed blocks is a no-op.

use std::num::NonZeroUsize;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{debug, error, warn};
use lru::LruCache;

use super::models::{
    NewAddress, NewAppliedLog, NewConfig, NewOption, NewProposal, NewProposer, NewTnt20Deposit,
    NewTnt721Deposit, NewToken, NewTransaction, NewVote, NewVoter, NewVotingToken,
};
use super::persister::{Persister, ProposalSeed};
use super::schema::{
    addresses, applied_logs, config, options, proposals, proposers, tnt20_deposits,
    tnt721_deposits, tokens, transactions, voters, votes, voting_tokens,
};
use crate::events::ConfigParam;

const ADDRESS_CACHE_SIZE: usize = 10_000;

pub struct DatabasePersister {
    conn: PgConnection,
    address_ids: LruCache<String, i32>,
}

impl DatabasePersister {
    pub fn new(conn: PgConnection) -> Self {
        DatabasePersister {
            conn,
            address_ids: LruCache::new(
                NonZeroUsize::new(ADDRESS_CACHE_SIZE).expect("cache size is nonzero"),
            ),
        }
    }

    fn address_id(&mut self, address: &str) -> Result<i32> {
        if let Some(id) = self.address_ids.get(address) {
            return Ok(*id);
        }
        let id = resolve_address(&self.conn, address)?;
        self.address_ids.put(address.to_string(), id);
        Ok(id)
    }
}

/// Read-first resolution with one retry after a unique violation.
macro_rules! resolve_or_insert {
    ($lookup:expr, $insert:expr, $what:expr) => {{
        match $lookup? {
            Some(id) => Ok(id),
            None => match $insert {
                Ok(id) => Ok(id),
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => $lookup?
                    .ok_or_else(|| anyhow!("{} row vanished after unique violation", $what)),
                Err(err) => Err(err.into()),
            },
        }
    }};
}

fn resolve_address(conn: &PgConnection, address: &str) -> Result<i32> {
    resolve_or_insert!(
        addresses::table
            .filter(addresses::address.eq(address))
            .select(addresses::id)
            .first::<i32>(conn)
            .optional(),
        diesel::insert_into(addresses::table)
            .values(&NewAddress { address })
            .returning(addresses::id)
            .get_result::<i32>(conn),
        "address"
    )
}

fn resolve_transaction(
    conn: &PgConnection,
    block_height: i64,
    tx_hash: &str,
    timestamp: i64,
) -> Result<i32> {
    resolve_or_insert!(
        transactions::table
            .filter(transactions::tx_hash.eq(tx_hash))
            .select(transactions::id)
            .first::<i32>(conn)
            .optional(),
        diesel::insert_into(transactions::table)
            .values(&NewTransaction {
                block_height,
                tx_hash,
                timestamp,
            })
            .returning(transactions::id)
            .get_result::<i32>(conn),
        "transaction"
    )
}

fn resolve_voter(conn: &PgConnection, address_id: i32) -> Result<i32> {
    resolve_or_insert!(
        voters::table
            .filter(voters::address_id.eq(address_id))
            .select(voters::id)
            .first::<i32>(conn)
            .optional(),
        diesel::insert_into(voters::table)
            .values(&NewVoter { address_id })
            .returning(voters::id)
            .get_result::<i32>(conn),
        "voter"
    )
}

fn resolve_proposer(conn: &PgConnection, address_id: i32) -> Result<i32> {
    resolve_or_insert!(
        proposers::table
            .filter(proposers::address_id.eq(address_id))
            .select(proposers::id)
            .first::<i32>(conn)
            .optional(),
        diesel::insert_into(proposers::table)
            .values(&NewProposer {
                address_id,
                is_active: false,
            })
            .returning(proposers::id)
            .get_result::<i32>(conn),
        "proposer"
    )
}

fn resolve_token(
    conn: &PgConnection,
    address_id: i32,
    lock_address_id: i32,
    is_tnt20: bool,
) -> Result<i32> {
    resolve_or_insert!(
        tokens::table
            .filter(tokens::address_id.eq(address_id))
            .select(tokens::id)
            .first::<i32>(conn)
            .optional(),
        diesel::insert_into(tokens::table)
            .values(&NewToken {
                address_id,
                voting_power: 0,
                lock_address_id,
                is_tnt20,
                is_active: false,
            })
            .returning(tokens::id)
            .get_result::<i32>(conn),
        "token"
    )
}

fn lookup_token(conn: &PgConnection, address_id: i32) -> Result<Option<(i32, i64)>> {
    Ok(tokens::table
        .filter(tokens::address_id.eq(address_id))
        .select((tokens::id, tokens::voting_power))
        .first::<(i32, i64)>(conn)
        .optional()?)
}

fn tx_height(conn: &PgConnection, transaction_id: i32) -> Result<i64> {
    Ok(transactions::table
        .find(transaction_id)
        .select(transactions::block_height)
        .first::<i64>(conn)?)
}

/// Runs `apply` at most once per `(transaction, log)` pair. The marker insert
/// and the mutation commit atomically, so a crash between them cannot leave
/// a log half-applied.
fn apply_once<F>(conn: &PgConnection, transaction_id: i32, log_index: i32, apply: F) -> Result<()>
where
    F: FnOnce(&PgConnection) -> QueryResult<()>,
{
    conn.transaction::<_, DieselError, _>(|| {
        let fresh = diesel::insert_into(applied_logs::table)
            .values(&NewAppliedLog {
                transaction_id,
                log_index,
            })
            .on_conflict((applied_logs::transaction_id, applied_logs::log_index))
            .do_nothing()
            .execute(conn)?;
        if fresh == 0 {
            debug!(
                "log {}/{} already applied, skipping",
                transaction_id, log_index
            );
            return Ok(());
        }
        apply(conn)
    })?;
    Ok(())
}

#[async_trait(?Send)]
impl Persister for DatabasePersister {
    async fn transaction_id(
        &mut self,
        block_height: u64,
        tx_hash: &str,
        timestamp: i64,
    ) -> Result<i32> {
        resolve_transaction(&self.conn, block_height as i64, tx_hash, timestamp)
    }

    async fn lock_tnt20(
        &mut self,
        lock_address: &str,
        token: &str,
        user: &str,
        amount: BigDecimal,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()> {
        let token_address_id = self.address_id(token)?;
        let lock_address_id = self.address_id(lock_address)?;
        let user_address_id = self.address_id(user)?;
        let conn = &self.conn;
        let token_row = resolve_token(conn, token_address_id, lock_address_id, true)?;
        let voter_row = resolve_voter(conn, user_address_id)?;
        apply_once(conn, transaction_id, log_index, |conn| {
            diesel::insert_into(tnt20_deposits::table)
                .values(&NewTnt20Deposit {
                    voter_id: voter_row,
                    voting_token_id: token_row,
                    amount: amount.clone(),
                    transaction_id,
                })
                .on_conflict((tnt20_deposits::voter_id, tnt20_deposits::voting_token_id))
                .do_update()
                .set((
                    tnt20_deposits::amount.eq(tnt20_deposits::amount + amount.clone()),
                    tnt20_deposits::transaction_id.eq(transaction_id),
                ))
                .execute(conn)?;
            Ok(())
        })
    }

    async fn unlock_tnt20(
        &mut self,
        token: &str,
        user: &str,
        amount: BigDecimal,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()> {
        let token_address_id = self.address_id(token)?;
        let user_address_id = self.address_id(user)?;
        let conn = &self.conn;
        let token_row = match lookup_token(conn, token_address_id)? {
            Some((id, _)) => id,
            None => {
                error!("unlock for unregistered token {}", token);
                return Ok(());
            }
        };
        let voter_row = resolve_voter(conn, user_address_id)?;
        let user = user.to_string();
        let token = token.to_string();
        apply_once(conn, transaction_id, log_index, |conn| {
            let current: Option<BigDecimal> = tnt20_deposits::table
                .filter(
                    tnt20_deposits::voter_id
                        .eq(voter_row)
                        .and(tnt20_deposits::voting_token_id.eq(token_row)),
                )
                .select(tnt20_deposits::amount)
                .first(conn)
                .optional()?;
            match current {
                None => {
                    error!("unlock without deposit: user {} token {}", user, token);
                }
                Some(current) => {
                    let mut next = current - amount;
                    if next < BigDecimal::from(0) {
                        next = BigDecimal::from(0);
                    }
                    diesel::update(
                        tnt20_deposits::table.filter(
                            tnt20_deposits::voter_id
                                .eq(voter_row)
                                .and(tnt20_deposits::voting_token_id.eq(token_row)),
                        ),
                    )
                    .set((
                        tnt20_deposits::amount.eq(next),
                        tnt20_deposits::transaction_id.eq(transaction_id),
                    ))
                    .execute(conn)?;
                }
            }
            Ok(())
        })
    }

    async fn lock_tnt721(
        &mut self,
        lock_address: &str,
        token: &str,
        user: &str,
        nft_id: i64,
        transaction_id: i32,
    ) -> Result<()> {
        let token_address_id = self.address_id(token)?;
        let lock_address_id = self.address_id(lock_address)?;
        let user_address_id = self.address_id(user)?;
        let conn = &self.conn;
        let token_row = resolve_token(conn, token_address_id, lock_address_id, false)?;
        let voter_row = resolve_voter(conn, user_address_id)?;
        diesel::insert_into(tnt721_deposits::table)
            .values(&NewTnt721Deposit {
                token_id: nft_id,
                voting_token_id: token_row,
                voter_id: voter_row,
                transaction_id,
            })
            .on_conflict((tnt721_deposits::token_id, tnt721_deposits::voting_token_id))
            .do_update()
            .set((
                tnt721_deposits::voter_id.eq(voter_row),
                tnt721_deposits::transaction_id.eq(transaction_id),
            ))
            .execute(conn)?;
        Ok(())
    }

    async fn unlock_tnt721(&mut self, token: &str, user: &str, nft_id: i64) -> Result<()> {
        let token_address_id = self.address_id(token)?;
        let user_address_id = self.address_id(user)?;
        let conn = &self.conn;
        let token_row = match lookup_token(conn, token_address_id)? {
            Some((id, _)) => id,
            None => {
                error!("unlock for unregistered token {}", token);
                return Ok(());
            }
        };
        let voter_row = resolve_voter(conn, user_address_id)?;
        let deleted = diesel::delete(
            tnt721_deposits::table.filter(
                tnt721_deposits::token_id
                    .eq(nft_id)
                    .and(tnt721_deposits::voting_token_id.eq(token_row))
                    .and(tnt721_deposits::voter_id.eq(voter_row)),
            ),
        )
        .execute(conn)?;
        if deleted == 0 {
            error!("unlock without deposit: user {} nft {} of {}", user, nft_id, token);
        }
        Ok(())
    }

    async fn update_proposer(&mut self, proposer: &str, active: bool) -> Result<()> {
        let address_id = self.address_id(proposer)?;
        diesel::insert_into(proposers::table)
            .values(&NewProposer {
                address_id,
                is_active: active,
            })
            .on_conflict(proposers::address_id)
            .do_update()
            .set(proposers::is_active.eq(active))
            .execute(&self.conn)?;
        Ok(())
    }

    async fn update_token_info(
        &mut self,
        token: &str,
        voting_power: i64,
        lock_address: &str,
        is_tnt20: bool,
    ) -> Result<()> {
        let token_address_id = self.address_id(token)?;
        let lock_address_id = self.address_id(lock_address)?;
        // A token is usable for voting only while its voting power is set.
        diesel::insert_into(tokens::table)
            .values(&NewToken {
                address_id: token_address_id,
                voting_power,
                lock_address_id,
                is_tnt20,
                is_active: voting_power > 0,
            })
            .on_conflict(tokens::address_id)
            .do_update()
            .set((
                tokens::voting_power.eq(voting_power),
                tokens::lock_address_id.eq(lock_address_id),
                tokens::is_active.eq(voting_power > 0),
            ))
            .execute(&self.conn)?;
        Ok(())
    }

    async fn update_reward_token(&mut self, token: &str, is_reward_token: bool) -> Result<()> {
        let address_id = self.address_id(token)?;
        let updated = diesel::update(tokens::table.filter(tokens::address_id.eq(address_id)))
            .set(tokens::is_reward_token.eq(is_reward_token))
            .execute(&self.conn)?;
        if updated == 0 {
            error!("reward token update for unregistered token {}", token);
        }
        Ok(())
    }

    async fn set_config(
        &mut self,
        param: ConfigParam,
        value: i64,
        transaction_id: i32,
    ) -> Result<()> {
        let conn = &self.conn;
        let current: Option<Option<i32>> = config::table
            .find(param.as_str())
            .select(config::transaction_id)
            .first(conn)
            .optional()?;
        match current {
            None => {
                diesel::insert_into(config::table)
                    .values(&NewConfig {
                        name: param.as_str(),
                        value,
                        transaction_id: Some(transaction_id),
                    })
                    .execute(conn)?;
            }
            Some(provenance) => {
                // Seeded rows carry no transaction and always lose.
                let current_height = match provenance {
                    None => -1,
                    Some(id) => tx_height(conn, id)?,
                };
                let new_height = tx_height(conn, transaction_id)?;
                if new_height > current_height {
                    diesel::update(config::table.find(param.as_str()))
                        .set((
                            config::value.eq(value),
                            config::transaction_id.eq(Some(transaction_id)),
                        ))
                        .execute(conn)?;
                } else {
                    debug!(
                        "stale config update for {} from height {} ignored (have {})",
                        param.as_str(),
                        new_height,
                        current_height
                    );
                }
            }
        }
        Ok(())
    }

    async fn create_proposal(
        &mut self,
        seed: &ProposalSeed<'_>,
        transaction_id: i32,
    ) -> Result<()> {
        let proposer_address_id = self.address_id(seed.proposer)?;
        let conn = &self.conn;
        let proposer_row = resolve_proposer(conn, proposer_address_id)?;
        let first_sight = proposals::table
            .find(seed.proposal_id)
            .select(proposals::id)
            .first::<i64>(conn)
            .optional()?
            .is_none();

        diesel::insert_into(proposals::table)
            .values(&NewProposal {
                id: seed.proposal_id,
                proposer_id: proposer_row,
                start_timestamp: seed.start_timestamp,
                end_timestamp: seed.end_timestamp,
                title: format!("Proposal {}", seed.proposal_id),
                on_chain_description: seed.description,
                option_count: seed.options.len() as i32,
                tfuel_pot_amount: seed.tfuel_pot.clone(),
                reward_token_pot_amount: seed.reward_token_pot.clone(),
                transaction_id,
            })
            .on_conflict(proposals::id)
            .do_update()
            .set((
                proposals::proposer_id.eq(proposer_row),
                proposals::start_timestamp.eq(seed.start_timestamp),
                proposals::end_timestamp.eq(seed.end_timestamp),
                proposals::on_chain_description.eq(seed.description),
                proposals::option_count.eq(seed.options.len() as i32),
                proposals::tfuel_pot_amount.eq(seed.tfuel_pot.clone()),
                proposals::reward_token_pot_amount.eq(seed.reward_token_pot.clone()),
                proposals::transaction_id.eq(transaction_id),
            ))
            .execute(conn)?;

        let option_rows: Vec<NewOption> = seed
            .options
            .iter()
            .enumerate()
            .map(|(index, text)| NewOption {
                proposal_id: seed.proposal_id,
                on_chain_text: text,
                on_chain_id: index as i32,
            })
            .collect();
        diesel::insert_into(options::table)
            .values(&option_rows)
            .on_conflict((options::proposal_id, options::on_chain_id))
            .do_nothing()
            .execute(conn)?;

        if first_sight {
            diesel::update(proposers::table.find(proposer_row))
                .set(proposers::proposal_count.eq(proposers::proposal_count + 1))
                .execute(conn)?;
        }
        Ok(())
    }

    async fn enrich_proposal(
        &mut self,
        proposal_id: i64,
        reward_token: &str,
        voting_tokens: &[String],
    ) -> Result<()> {
        let reward_address_id = self.address_id(reward_token)?;
        let mut voting_address_ids = Vec::with_capacity(voting_tokens.len());
        for token in voting_tokens {
            voting_address_ids.push((token.as_str(), self.address_id(token)?));
        }

        let conn = &self.conn;
        match lookup_token(conn, reward_address_id)? {
            Some((token_row, _)) => {
                let updated = diesel::update(proposals::table.find(proposal_id))
                    .set(proposals::reward_token_id.eq(Some(token_row)))
                    .execute(conn)?;
                if updated == 0 {
                    warn!("enrichment for unknown proposal {}", proposal_id);
                }
            }
            None => warn!(
                "proposal {} reward token {} is not a registered token",
                proposal_id, reward_token
            ),
        }

        for (token, address_id) in voting_address_ids {
            match lookup_token(conn, address_id)? {
                None => warn!(
                    "proposal {} voting token {} is not a registered token",
                    proposal_id, token
                ),
                Some((token_row, voting_power)) => {
                    diesel::insert_into(voting_tokens::table)
                        .values(&NewVotingToken {
                            proposal_id,
                            token_id: token_row,
                            voting_power,
                        })
                        .on_conflict((voting_tokens::proposal_id, voting_tokens::token_id))
                        .do_nothing()
                        .execute(conn)?;
                }
            }
        }
        Ok(())
    }

    async fn cancel_proposal(&mut self, proposal_id: i64) -> Result<()> {
        let updated = diesel::update(proposals::table.find(proposal_id))
            .set(proposals::cancelled.eq(true))
            .execute(&self.conn)?;
        if updated == 0 {
            warn!("cancellation for unknown proposal {}", proposal_id);
        }
        Ok(())
    }

    async fn record_vote(
        &mut self,
        proposal_id: i64,
        voter: &str,
        option_index: i32,
        weight: i64,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()> {
        let voter_address_id = self.address_id(voter)?;
        let conn = &self.conn;
        let voter_row = resolve_voter(conn, voter_address_id)?;
        apply_once(conn, transaction_id, log_index, |conn| {
            let first_sight = votes::table
                .filter(
                    votes::proposal_id
                        .eq(proposal_id)
                        .and(votes::voter_id.eq(voter_row)),
                )
                .select(votes::id)
                .first::<i32>(conn)
                .optional()?
                .is_none();
            diesel::insert_into(votes::table)
                .values(&NewVote {
                    proposal_id,
                    voter_id: voter_row,
                    option_index,
                    vote_weight: weight,
                    transaction_id,
                })
                .on_conflict((votes::proposal_id, votes::voter_id))
                .do_update()
                .set((
                    votes::vote_weight.eq(votes::vote_weight + weight),
                    votes::option_index.eq(option_index),
                    votes::transaction_id.eq(transaction_id),
                ))
                .execute(conn)?;
            diesel::update(
                options::table.filter(
                    options::proposal_id
                        .eq(proposal_id)
                        .and(options::on_chain_id.eq(option_index)),
                ),
            )
            .set(options::votes.eq(options::votes + weight))
            .execute(conn)?;
            if first_sight {
                diesel::update(proposals::table.find(proposal_id))
                    .set(proposals::voter_count.eq(proposals::voter_count + 1))
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    async fn claim_reward(&mut self, proposal_id: i64, voter: &str) -> Result<()> {
        let voter_address_id = self.address_id(voter)?;
        let conn = &self.conn;
        let voter_row = resolve_voter(conn, voter_address_id)?;
        let updated = diesel::update(
            votes::table.filter(
                votes::proposal_id
                    .eq(proposal_id)
                    .and(votes::voter_id.eq(voter_row)),
            ),
        )
        .set(votes::claimed_reward.eq(true))
        .execute(conn)?;
        if updated == 0 {
            warn!(
                "reward claim without a vote: proposal {} voter {}",
                proposal_id, voter
            );
        }
        Ok(())
    }

    async fn scan_height(&mut self) -> Result<u64> {
        let height: Option<i64> = config::table
            .find(ConfigParam::BlockHeight.as_str())
            .select(config::value)
            .first(&self.conn)
            .optional()?;
        Ok(height.unwrap_or(0).max(0) as u64)
    }

    async fn set_scan_height(&mut self, height: u64) -> Result<()> {
        diesel::insert_into(config::table)
            .values(&NewConfig {
                name: ConfigParam::BlockHeight.as_str(),
                value: height as i64,
                transaction_id: None,
            })
            .on_conflict(config::name)
            .do_update()
            .set(config::value.eq(height as i64))
            .execute(&self.conn)?;
        Ok(())
    }
}
