//! The persistence seam between the scanner and the relational store.
//!
//! Every mutation the scanner can make is a method here. The production
//! implementation is [`super::db_persister::DatabasePersister`]; tests run
//! against the in-memory [`tests::TestPersister`], which mirrors the same
//! reducer semantics.

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::events::ConfigParam;

/// Phase-one payload of a new proposal, straight from the creation event.
/// Reward token and voting-token whitelist arrive later via
/// [`Persister::enrich_proposal`] once read back from the contract.
pub struct ProposalSeed<'a> {
    pub proposal_id: i64,
    pub proposer: &'a str,
    pub description: &'a str,
    pub options: &'a [String],
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub tfuel_pot: BigDecimal,
    pub reward_token_pot: BigDecimal,
}

/// All writes are idempotent under re-scan: keyed rows upsert, additive
/// mutations are fenced by an applied-log guard keyed on
/// `(transaction_id, log_index)`.
///
/// `?Send` because the database implementation holds a `PgConnection`
/// across its (synchronous) work; the scanner drives everything from a
/// single task.
#[async_trait(?Send)]
pub trait Persister {
    /// Returns the row id for a transaction, registering it on first sight.
    async fn transaction_id(
        &mut self,
        block_height: u64,
        tx_hash: &str,
        timestamp: i64,
    ) -> Result<i32>;

    async fn lock_tnt20(
        &mut self,
        lock_address: &str,
        token: &str,
        user: &str,
        amount: BigDecimal,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()>;

    /// Decreases a deposit, clamping at zero. An unlock with no matching
    /// deposit is logged and skipped.
    async fn unlock_tnt20(
        &mut self,
        token: &str,
        user: &str,
        amount: BigDecimal,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()>;

    async fn lock_tnt721(
        &mut self,
        lock_address: &str,
        token: &str,
        user: &str,
        nft_id: i64,
        transaction_id: i32,
    ) -> Result<()>;

    async fn unlock_tnt721(&mut self, token: &str, user: &str, nft_id: i64) -> Result<()>;

    async fn update_proposer(&mut self, proposer: &str, active: bool) -> Result<()>;

    async fn update_token_info(
        &mut self,
        token: &str,
        voting_power: i64,
        lock_address: &str,
        is_tnt20: bool,
    ) -> Result<()>;

    async fn update_reward_token(&mut self, token: &str, is_reward_token: bool) -> Result<()>;

    /// Config merge: a stored value is overwritten only by an update from a
    /// strictly higher block height; equal or lower heights are no-ops.
    async fn set_config(&mut self, param: ConfigParam, value: i64, transaction_id: i32)
        -> Result<()>;

    async fn create_proposal(&mut self, seed: &ProposalSeed<'_>, transaction_id: i32)
        -> Result<()>;

    /// Phase two of proposal creation, carrying contract state that the
    /// creation event itself does not include.
    async fn enrich_proposal(
        &mut self,
        proposal_id: i64,
        reward_token: &str,
        voting_tokens: &[String],
    ) -> Result<()>;

    async fn cancel_proposal(&mut self, proposal_id: i64) -> Result<()>;

    /// Additive per-(proposal, voter) vote upsert: repeated casts accumulate
    /// weight and the option index follows the latest cast.
    async fn record_vote(
        &mut self,
        proposal_id: i64,
        voter: &str,
        option_index: i32,
        weight: i64,
        transaction_id: i32,
        log_index: i32,
    ) -> Result<()>;

    async fn claim_reward(&mut self, proposal_id: i64, voter: &str) -> Result<()>;

    /// Highest fully-scanned block height, 0 before the first scan.
    async fn scan_height(&mut self) -> Result<u64>;

    async fn set_scan_height(&mut self, height: u64) -> Result<()>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestToken {
        pub voting_power: i64,
        pub lock_address: String,
        pub is_tnt20: bool,
        pub is_active: bool,
        pub is_reward_token: bool,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestProposal {
        pub proposer: String,
        pub start_timestamp: i64,
        pub end_timestamp: i64,
        pub description: String,
        pub options: Vec<String>,
        pub tfuel_pot: BigDecimal,
        pub reward_token_pot: BigDecimal,
        pub reward_token: Option<String>,
        pub voting_tokens: Vec<String>,
        pub cancelled: bool,
        pub voter_count: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct TestVote {
        pub option_index: i32,
        pub weight: i64,
        pub claimed_reward: bool,
    }

    /// In-memory stand-in mirroring the reducer semantics of the database
    /// persister, down to the applied-log guard and config merge rule.
    #[derive(Debug, Default)]
    pub struct TestPersister {
        /// Registered transactions; row id is index + 1.
        pub transactions: Vec<(u64, String, i64)>,
        pub applied_logs: HashSet<(i32, i32)>,
        /// (user, token) -> locked amount.
        pub tnt20_deposits: BTreeMap<(String, String), BigDecimal>,
        /// (nft id, token) -> user.
        pub tnt721_deposits: BTreeMap<(i64, String), String>,
        /// proposer -> (proposal count, active).
        pub proposers: BTreeMap<String, (i32, bool)>,
        pub tokens: BTreeMap<String, TestToken>,
        pub proposals: BTreeMap<i64, TestProposal>,
        /// (proposal, voter) -> vote.
        pub votes: BTreeMap<(i64, String), TestVote>,
        /// param -> (value, provenance block height).
        pub config: BTreeMap<&'static str, (i64, i64)>,
        pub scan_height: u64,
    }

    impl TestPersister {
        pub fn new() -> Self {
            Self::default()
        }

        fn tx_height(&self, transaction_id: i32) -> i64 {
            self.transactions
                .get((transaction_id - 1) as usize)
                .map(|(height, _, _)| *height as i64)
                .unwrap_or(-1)
        }

        fn mark_applied(&mut self, transaction_id: i32, log_index: i32) -> bool {
            self.applied_logs.insert((transaction_id, log_index))
        }
    }

    #[async_trait(?Send)]
    impl Persister for TestPersister {
        async fn transaction_id(
            &mut self,
            block_height: u64,
            tx_hash: &str,
            timestamp: i64,
        ) -> Result<i32> {
            if let Some(pos) = self
                .transactions
                .iter()
                .position(|(_, hash, _)| hash == tx_hash)
            {
                return Ok(pos as i32 + 1);
            }
            self.transactions
                .push((block_height, tx_hash.to_string(), timestamp));
            Ok(self.transactions.len() as i32)
        }

        async fn lock_tnt20(
            &mut self,
            _lock_address: &str,
            token: &str,
            user: &str,
            amount: BigDecimal,
            transaction_id: i32,
            log_index: i32,
        ) -> Result<()> {
            if !self.mark_applied(transaction_id, log_index) {
                return Ok(());
            }
            let deposit = self
                .tnt20_deposits
                .entry((user.to_string(), token.to_string()))
                .or_insert_with(|| BigDecimal::from(0));
            *deposit = deposit.clone() + amount;
            Ok(())
        }

        async fn unlock_tnt20(
            &mut self,
            token: &str,
            user: &str,
            amount: BigDecimal,
            transaction_id: i32,
            log_index: i32,
        ) -> Result<()> {
            if !self.mark_applied(transaction_id, log_index) {
                return Ok(());
            }
            if let Some(deposit) = self
                .tnt20_deposits
                .get_mut(&(user.to_string(), token.to_string()))
            {
                let next = deposit.clone() - amount;
                *deposit = if next < BigDecimal::from(0) {
                    BigDecimal::from(0)
                } else {
                    next
                };
            }
            Ok(())
        }

        async fn lock_tnt721(
            &mut self,
            _lock_address: &str,
            token: &str,
            user: &str,
            nft_id: i64,
            _transaction_id: i32,
        ) -> Result<()> {
            self.tnt721_deposits
                .insert((nft_id, token.to_string()), user.to_string());
            Ok(())
        }

        async fn unlock_tnt721(&mut self, token: &str, user: &str, nft_id: i64) -> Result<()> {
            let key = (nft_id, token.to_string());
            if self.tnt721_deposits.get(&key).map(String::as_str) == Some(user) {
                self.tnt721_deposits.remove(&key);
            }
            Ok(())
        }

        async fn update_proposer(&mut self, proposer: &str, active: bool) -> Result<()> {
            self.proposers.entry(proposer.to_string()).or_default().1 = active;
            Ok(())
        }

        async fn update_token_info(
            &mut self,
            token: &str,
            voting_power: i64,
            lock_address: &str,
            is_tnt20: bool,
        ) -> Result<()> {
            let entry = self
                .tokens
                .entry(token.to_string())
                .or_insert_with(|| TestToken {
                    is_tnt20,
                    ..TestToken::default()
                });
            entry.voting_power = voting_power;
            entry.lock_address = lock_address.to_string();
            entry.is_active = voting_power > 0;
            Ok(())
        }

        async fn update_reward_token(
            &mut self,
            token: &str,
            is_reward_token: bool,
        ) -> Result<()> {
            if let Some(entry) = self.tokens.get_mut(token) {
                entry.is_reward_token = is_reward_token;
            }
            Ok(())
        }

        async fn set_config(
            &mut self,
            param: ConfigParam,
            value: i64,
            transaction_id: i32,
        ) -> Result<()> {
            let height = self.tx_height(transaction_id);
            let entry = self.config.entry(param.as_str()).or_insert((value, height));
            if height > entry.1 {
                *entry = (value, height);
            }
            Ok(())
        }

        async fn create_proposal(
            &mut self,
            seed: &ProposalSeed<'_>,
            _transaction_id: i32,
        ) -> Result<()> {
            let first_sight = !self.proposals.contains_key(&seed.proposal_id);
            let entry = self.proposals.entry(seed.proposal_id).or_default();
            entry.proposer = seed.proposer.to_string();
            entry.start_timestamp = seed.start_timestamp;
            entry.end_timestamp = seed.end_timestamp;
            entry.description = seed.description.to_string();
            entry.options = seed.options.to_vec();
            entry.tfuel_pot = seed.tfuel_pot.clone();
            entry.reward_token_pot = seed.reward_token_pot.clone();
            if first_sight {
                self.proposers
                    .entry(seed.proposer.to_string())
                    .or_default()
                    .0 += 1;
            }
            Ok(())
        }

        async fn enrich_proposal(
            &mut self,
            proposal_id: i64,
            reward_token: &str,
            voting_tokens: &[String],
        ) -> Result<()> {
            if let Some(entry) = self.proposals.get_mut(&proposal_id) {
                entry.reward_token = Some(reward_token.to_string());
                entry.voting_tokens = voting_tokens.to_vec();
            }
            Ok(())
        }

        async fn cancel_proposal(&mut self, proposal_id: i64) -> Result<()> {
            if let Some(entry) = self.proposals.get_mut(&proposal_id) {
                entry.cancelled = true;
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
            if !self.mark_applied(transaction_id, log_index) {
                return Ok(());
            }
            let key = (proposal_id, voter.to_string());
            let first_sight = !self.votes.contains_key(&key);
            let vote = self.votes.entry(key).or_default();
            vote.option_index = option_index;
            vote.weight += weight;
            if first_sight {
                if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
                    proposal.voter_count += 1;
                }
            }
            Ok(())
        }

        async fn claim_reward(&mut self, proposal_id: i64, voter: &str) -> Result<()> {
            if let Some(vote) = self.votes.get_mut(&(proposal_id, voter.to_string())) {
                vote.claimed_reward = true;
            }
            Ok(())
        }

        async fn scan_height(&mut self) -> Result<u64> {
            Ok(self.scan_height)
        }

        async fn set_scan_height(&mut self, height: u64) -> Result<()> {
            self.scan_height = height;
            Ok(())
        }
    }

    #[tokio::test]
    async fn transactions_are_registered_once() -> Result<()> {
        let mut persister = TestPersister::new();
        let first = persister.transaction_id(10, "0xaaa", 1_700_000_000).await?;
        let second = persister.transaction_id(11, "0xbbb", 1_700_000_006).await?;
        let again = persister.transaction_id(10, "0xaaa", 1_700_000_000).await?;
        assert_eq!(first, again);
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn deposits_accumulate_and_clamp() -> Result<()> {
        let mut persister = TestPersister::new();
        let tx = persister.transaction_id(10, "0xaaa", 0).await?;
        persister
            .lock_tnt20("0xlock", "0xtoken", "0xuser", BigDecimal::from(30), tx, 0)
            .await?;
        persister
            .lock_tnt20("0xlock", "0xtoken", "0xuser", BigDecimal::from(20), tx, 1)
            .await?;
        let key = ("0xuser".to_string(), "0xtoken".to_string());
        assert_eq!(persister.tnt20_deposits[&key], BigDecimal::from(50));

        // Unlocking more than is held clamps at zero.
        persister
            .unlock_tnt20("0xtoken", "0xuser", BigDecimal::from(80), tx, 2)
            .await?;
        assert_eq!(persister.tnt20_deposits[&key], BigDecimal::from(0));
        Ok(())
    }

    #[tokio::test]
    async fn replayed_logs_are_ignored() -> Result<()> {
        let mut persister = TestPersister::new();
        let tx = persister.transaction_id(10, "0xaaa", 0).await?;
        for _ in 0..3 {
            persister
                .lock_tnt20("0xlock", "0xtoken", "0xuser", BigDecimal::from(30), tx, 0)
                .await?;
        }
        let key = ("0xuser".to_string(), "0xtoken".to_string());
        assert_eq!(persister.tnt20_deposits[&key], BigDecimal::from(30));
        Ok(())
    }

    #[tokio::test]
    async fn config_merges_by_height() -> Result<()> {
        let mut persister = TestPersister::new();
        let late = persister.transaction_id(200, "0xlate", 0).await?;
        let early = persister.transaction_id(100, "0xearly", 0).await?;
        persister
            .set_config(ConfigParam::MaxVotingTokens, 8, late)
            .await?;
        // An older update must not overwrite a newer one.
        persister
            .set_config(ConfigParam::MaxVotingTokens, 4, early)
            .await?;
        assert_eq!(persister.config["MaxVotingTokens"].0, 8);
        Ok(())
    }

    #[tokio::test]
    async fn equal_height_config_updates_are_ignored() -> Result<()> {
        let mut persister = TestPersister::new();
        let first = persister.transaction_id(100, "0xfirst", 0).await?;
        let second = persister.transaction_id(100, "0xsecond", 0).await?;
        persister
            .set_config(ConfigParam::MaxOptionValue, 5, first)
            .await?;
        // Only a strictly higher block height overwrites.
        persister
            .set_config(ConfigParam::MaxOptionValue, 3, second)
            .await?;
        assert_eq!(persister.config["MaxOptionValue"].0, 5);
        Ok(())
    }
}
