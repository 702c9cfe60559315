//! Sequential block scanner.
//!
//! One block at a time, in height order: fetch, walk every log of every
//! smart-contract transaction, decode against the watched catalogs, and feed
//! the resulting domain events to the persister. A block height is marked
//! scanned only after every event in it applied cleanly, so a crash resumes
//! on the failed block.

use std::cmp;
use std::collections::HashMap;

use anyhow::{bail, Result};
use log::{debug, info};

use crate::chain::{ChainReader, EARLIEST_BLOCK};
use crate::db::{Persister, ProposalSeed};
use crate::events::catalog::{ContractDefinition, SmartContract};
use crate::events::{ConfigEvent, DomainEvent, GovernanceEvent, LockEvent};
use crate::util::{addr_hex, u256_to_i64, wei_to_decimal};

pub struct Scanner<C, P> {
    client: C,
    persister: P,
    contracts: HashMap<String, SmartContract>,
}

impl<C: ChainReader, P: Persister> Scanner<C, P> {
    pub fn new(client: C, persister: P, definitions: Vec<ContractDefinition>) -> Result<Self> {
        let mut contracts = HashMap::new();
        for definition in definitions {
            if definition.address != definition.address.to_lowercase() {
                bail!(
                    "watched contract {} address must be lowercase: {}",
                    definition.name,
                    definition.address
                );
            }
            let contract = SmartContract::new(definition)?;
            let address = contract.address.to_string();
            if contracts.insert(address, contract).is_some() {
                bail!("duplicate watched contract address");
            }
        }
        Ok(Scanner {
            client,
            persister,
            contracts,
        })
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    /// The next height to scan: one past the bookkept height, floored by the
    /// configured start and the chain's earliest relevant block.
    pub async fn next_height(&mut self, initial_block: u64) -> Result<u64> {
        let scanned = self.persister.scan_height().await?;
        Ok(cmp::max(
            cmp::max(scanned + 1, initial_block),
            EARLIEST_BLOCK,
        ))
    }

    pub async fn mark_scanned(&mut self, height: u64) -> Result<()> {
        self.persister.set_scan_height(height).await
    }

    /// Fetches one block and applies every decodable log in order. Any error
    /// leaves the height unmarked so the caller retries the whole block.
    pub async fn scan_block(&mut self, height: u64) -> Result<()> {
        let block = self.client.block_by_height(height).await?;
        debug!(
            "block {}: {} smart-contract transactions",
            block.height,
            block.transactions.len()
        );
        let Scanner {
            client,
            persister,
            contracts,
        } = self;
        for tx in &block.transactions {
            for log in &tx.logs {
                let contract = match contracts.get(&log.address.to_lowercase()) {
                    Some(contract) => contract,
                    None => continue,
                };
                let event = match contract.decode(log)? {
                    Some(event) => event,
                    None => continue,
                };
                info!("block {} {}: {:?}", height, contract.name, event);
                let transaction_id = persister
                    .transaction_id(block.height, &tx.hash, block.timestamp)
                    .await?;
                dispatch(
                    &*client,
                    persister,
                    contract.address,
                    event,
                    transaction_id,
                    log.log_index as i32,
                )
                .await?;
            }
        }
        Ok(())
    }
}

async fn dispatch<C: ChainReader, P: Persister>(
    client: &C,
    persister: &mut P,
    contract: &str,
    event: DomainEvent,
    transaction_id: i32,
    log_index: i32,
) -> Result<()> {
    match event {
        DomainEvent::Lock(LockEvent::Tnt20Locked {
            token,
            user,
            amount,
        }) => {
            persister
                .lock_tnt20(
                    contract,
                    &addr_hex(&token),
                    &addr_hex(&user),
                    wei_to_decimal(amount),
                    transaction_id,
                    log_index,
                )
                .await
        }
        DomainEvent::Lock(LockEvent::Tnt20Unlocked {
            token,
            user,
            amount,
        }) => {
            persister
                .unlock_tnt20(
                    &addr_hex(&token),
                    &addr_hex(&user),
                    wei_to_decimal(amount),
                    transaction_id,
                    log_index,
                )
                .await
        }
        DomainEvent::Lock(LockEvent::Tnt721Locked {
            token,
            user,
            token_id,
        }) => {
            persister
                .lock_tnt721(
                    contract,
                    &addr_hex(&token),
                    &addr_hex(&user),
                    u256_to_i64(token_id)?,
                    transaction_id,
                )
                .await
        }
        DomainEvent::Lock(LockEvent::Tnt721Unlocked {
            token,
            user,
            token_id,
        }) => {
            persister
                .unlock_tnt721(&addr_hex(&token), &addr_hex(&user), u256_to_i64(token_id)?)
                .await
        }
        DomainEvent::Governance(GovernanceEvent::ProposalCreated(created)) => {
            let proposal_id = u256_to_i64(created.proposal_id)?;
            let proposer = addr_hex(&created.proposer);
            let seed = ProposalSeed {
                proposal_id,
                proposer: &proposer,
                description: &created.description,
                options: &created.options,
                start_timestamp: u256_to_i64(created.start_time)?,
                end_timestamp: u256_to_i64(created.end_time)?,
                tfuel_pot: wei_to_decimal(created.tfuel_amount),
                reward_token_pot: wei_to_decimal(created.reward_token_amount),
            };
            persister.create_proposal(&seed, transaction_id).await?;

            // Second phase: the creation event does not carry the reward
            // token or the voting-token whitelist, so read them back.
            let data = client.proposal_data(contract, proposal_id as u64).await?;
            let voting: Vec<String> = data.voting_tokens.iter().map(addr_hex).collect();
            persister
                .enrich_proposal(proposal_id, &addr_hex(&data.reward_token), &voting)
                .await
        }
        DomainEvent::Governance(GovernanceEvent::ProposalCanceled { proposal_id }) => {
            persister.cancel_proposal(u256_to_i64(proposal_id)?).await
        }
        DomainEvent::Governance(GovernanceEvent::VoteCast {
            voter,
            proposal_id,
            option,
            votes,
        }) => {
            persister
                .record_vote(
                    u256_to_i64(proposal_id)?,
                    &addr_hex(&voter),
                    option as i32,
                    u256_to_i64(votes)?,
                    transaction_id,
                    log_index,
                )
                .await
        }
        DomainEvent::Governance(GovernanceEvent::RewardClaimed {
            voter, proposal_id, ..
        }) => {
            persister
                .claim_reward(u256_to_i64(proposal_id)?, &addr_hex(&voter))
                .await
        }
        DomainEvent::Governance(GovernanceEvent::ProposerRoleUpdated { proposer, active }) => {
            persister.update_proposer(&addr_hex(&proposer), active).await
        }
        DomainEvent::Governance(GovernanceEvent::TokenInfoUpdated {
            token,
            voting_power,
            lock_address,
            is_tnt20,
        }) => {
            persister
                .update_token_info(
                    &addr_hex(&token),
                    u256_to_i64(voting_power)?,
                    &addr_hex(&lock_address),
                    is_tnt20,
                )
                .await
        }
        DomainEvent::Governance(GovernanceEvent::RewardTokenUpdated {
            token,
            is_reward_token,
        }) => {
            persister
                .update_reward_token(&addr_hex(&token), is_reward_token)
                .await
        }
        DomainEvent::Config(ConfigEvent { param, value }) => {
            persister
                .set_config(param, u256_to_i64(value)?, transaction_id)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{self, ParamType, Token};
    use crate::chain::{ChainError, ProposalData, ThetaBlock, ThetaLog, ThetaTransaction};
    use crate::db::persister::tests::TestPersister;
    use crate::events::contracts::{
        self, TDROP_LOCK_ADDRESS, TDROP_TOKEN_ADDRESS, V4R_ADDRESS,
    };
    use alloy_primitives::{hex, Address, B256, U256};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;

    struct MockChain {
        blocks: HashMap<u64, ThetaBlock>,
        proposals: HashMap<u64, ProposalData>,
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn block_by_height(&self, height: u64) -> Result<ThetaBlock, ChainError> {
            self.blocks
                .get(&height)
                .cloned()
                .ok_or(ChainError::BlockOutOfRange {
                    height,
                    floor: EARLIEST_BLOCK,
                })
        }

        async fn proposal_data(
            &self,
            _contract: &str,
            proposal_id: u64,
        ) -> Result<ProposalData, ChainError> {
            self.proposals
                .get(&proposal_id)
                .cloned()
                .ok_or_else(|| ChainError::CallFailed("no such proposal".to_string()))
        }

        async fn tfuel_price_usd(&self) -> Result<f64, ChainError> {
            Ok(0.05)
        }
    }

    fn addr(byte: u8) -> Address {
        Address::from_slice(&[byte; 20])
    }

    fn topic_addr(address: Address) -> B256 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_slice());
        B256::from(word)
    }

    fn topic_uint(value: u64) -> B256 {
        B256::from(U256::from(value).to_be_bytes::<32>())
    }

    fn topic_bool(value: bool) -> B256 {
        let mut word = [0u8; 32];
        word[31] = value as u8;
        B256::from(word)
    }

    fn log(address: &str, topics: Vec<B256>, data: Vec<u8>, log_index: u32) -> ThetaLog {
        ThetaLog {
            address: address.to_string(),
            topics,
            data: format!("0x{}", hex::encode(data)),
            log_index,
        }
    }

    fn wei(tokens: u64) -> U256 {
        U256::from(tokens) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn token_info_log(log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic(
            "TokenInfoUpdated",
            &[
                ParamType::Address,
                ParamType::Uint256,
                ParamType::Address,
                ParamType::Bool,
            ],
        );
        let token: Address = TDROP_TOKEN_ADDRESS.parse().unwrap();
        let lock: Address = TDROP_LOCK_ADDRESS.parse().unwrap();
        let data = abi::encode(&[
            Token::Uint(U256::from(1000u64)),
            Token::Address(lock),
            Token::Bool(true),
        ]);
        log(V4R_ADDRESS, vec![topic0, topic_addr(token)], data, log_index)
    }

    fn proposer_role_log(proposer: Address, active: bool, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic(
            "ProposerRoleUpdated",
            &[ParamType::Address, ParamType::Bool],
        );
        log(
            V4R_ADDRESS,
            vec![topic0, topic_addr(proposer), topic_bool(active)],
            vec![],
            log_index,
        )
    }

    fn locked_log(user: Address, amount: U256, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic("Locked", &[ParamType::Address, ParamType::Uint256]);
        let data = abi::encode(&[Token::Uint(amount)]);
        log(
            TDROP_LOCK_ADDRESS,
            vec![topic0, topic_addr(user)],
            data,
            log_index,
        )
    }

    fn unlocked_log(user: Address, amount: U256, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic("Unlocked", &[ParamType::Address, ParamType::Uint256]);
        let data = abi::encode(&[Token::Uint(amount)]);
        log(
            TDROP_LOCK_ADDRESS,
            vec![topic0, topic_addr(user)],
            data,
            log_index,
        )
    }

    fn proposal_created_log(proposal_id: u64, proposer: Address, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic(
            "ProposalCreated",
            &[
                ParamType::Uint256,
                ParamType::Address,
                ParamType::String,
                ParamType::StringArray,
                ParamType::Uint256,
                ParamType::Uint256,
                ParamType::Uint256,
                ParamType::Uint256,
            ],
        );
        let data = abi::encode(&[
            Token::String("raise the pot".to_string()),
            Token::StringArray(vec!["yes".to_string(), "no".to_string()]),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::from(1_700_604_800u64)),
            Token::Uint(wei(100)),
            Token::Uint(wei(500)),
        ]);
        log(
            V4R_ADDRESS,
            vec![topic0, topic_uint(proposal_id), topic_addr(proposer)],
            data,
            log_index,
        )
    }

    fn vote_cast_log(voter: Address, proposal_id: u64, option: u64, votes: u64, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic(
            "VoteCast",
            &[
                ParamType::Address,
                ParamType::Uint256,
                ParamType::Uint8,
                ParamType::Uint256,
            ],
        );
        let data = abi::encode(&[Token::Uint(U256::from(option)), Token::Uint(U256::from(votes))]);
        log(
            V4R_ADDRESS,
            vec![topic0, topic_addr(voter), topic_uint(proposal_id)],
            data,
            log_index,
        )
    }

    fn reward_claimed_log(voter: Address, proposal_id: u64, log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic(
            "RewardClaimed",
            &[
                ParamType::Address,
                ParamType::Uint256,
                ParamType::Uint256,
                ParamType::Uint256,
            ],
        );
        let data = abi::encode(&[Token::Uint(wei(3)), Token::Uint(wei(1))]);
        log(
            V4R_ADDRESS,
            vec![topic0, topic_addr(voter), topic_uint(proposal_id)],
            data,
            log_index,
        )
    }

    fn config_log(log_index: u32) -> ThetaLog {
        let topic0 = abi::event_topic("MaxVotingTokensUpdated", &[ParamType::Uint256]);
        let data = abi::encode(&[Token::Uint(U256::from(8u64))]);
        log(V4R_ADDRESS, vec![topic0], data, log_index)
    }

    fn block(height: u64, transactions: Vec<ThetaTransaction>) -> ThetaBlock {
        ThetaBlock {
            height,
            hash: format!("0xblock{}", height),
            timestamp: 1_700_000_000 + height as i64,
            transactions,
        }
    }

    fn tx(hash: &str, logs: Vec<ThetaLog>) -> ThetaTransaction {
        ThetaTransaction {
            hash: hash.to_string(),
            contract_address: V4R_ADDRESS.to_string(),
            logs,
        }
    }

    fn canned_proposal(proposal_id: u64, proposer: Address) -> ProposalData {
        ProposalData {
            id: proposal_id,
            proposer,
            start_time: 1_700_000_000,
            end_time: 1_700_604_800,
            tfuel_reward_info: wei(500),
            token_reward_info: wei(100),
            reward_token: TDROP_TOKEN_ADDRESS.parse().unwrap(),
            canceled: false,
            description: "raise the pot".to_string(),
            voting_tokens: vec![TDROP_TOKEN_ADDRESS.parse().unwrap()],
        }
    }

    fn scanner(chain: MockChain) -> Scanner<MockChain, TestPersister> {
        Scanner::new(chain, TestPersister::new(), contracts::watched_contracts()).unwrap()
    }

    #[tokio::test]
    async fn scans_a_full_governance_flow() -> Result<()> {
        let height = EARLIEST_BLOCK + 10;
        let user = addr(0xaa);
        let proposer = addr(0xbb);
        let chain = MockChain {
            blocks: HashMap::from([(
                height,
                block(
                    height,
                    vec![
                        tx(
                            "0xsetup",
                            vec![token_info_log(0), proposer_role_log(proposer, true, 1)],
                        ),
                        tx("0xlock", vec![locked_log(user, wei(50), 0)]),
                        tx(
                            "0xgov",
                            vec![
                                proposal_created_log(7, proposer, 0),
                                vote_cast_log(user, 7, 1, 40, 1),
                                reward_claimed_log(user, 7, 2),
                                config_log(3),
                            ],
                        ),
                    ],
                ),
            )]),
            proposals: HashMap::from([(7, canned_proposal(7, proposer))]),
        };

        let mut scanner = scanner(chain);
        assert_eq!(scanner.next_height(0).await?, EARLIEST_BLOCK);
        scanner.scan_block(height).await?;
        scanner.mark_scanned(height).await?;

        let state = scanner.persister();
        let user_hex = addr_hex(&user);
        let proposer_hex = addr_hex(&proposer);

        // Token registered and deposit booked.
        assert!(state.tokens[TDROP_TOKEN_ADDRESS].is_tnt20);
        assert_eq!(
            state.tnt20_deposits[&(user_hex.clone(), TDROP_TOKEN_ADDRESS.to_string())],
            BigDecimal::from(50)
        );

        // Proposal created and enriched from read-back.
        let proposal = &state.proposals[&7];
        assert_eq!(proposal.proposer, proposer_hex);
        assert_eq!(proposal.options, vec!["yes", "no"]);
        assert_eq!(
            proposal.reward_token.as_deref(),
            Some(TDROP_TOKEN_ADDRESS)
        );
        assert_eq!(proposal.voting_tokens, vec![TDROP_TOKEN_ADDRESS]);
        assert_eq!(proposal.voter_count, 1);

        // Proposer bookkeeping.
        assert_eq!(state.proposers[&proposer_hex], (1, true));

        // Vote recorded and reward claimed.
        let vote = &state.votes[&(7, user_hex)];
        assert_eq!(vote.option_index, 1);
        assert_eq!(vote.weight, 40);
        assert!(vote.claimed_reward);

        // Config updated and height bookkept.
        assert_eq!(state.config["MaxVotingTokens"].0, 8);
        assert_eq!(scanner.next_height(0).await?, height + 1);
        Ok(())
    }

    #[tokio::test]
    async fn rescanning_a_block_changes_nothing() -> Result<()> {
        let height = EARLIEST_BLOCK + 5;
        let user = addr(0xaa);
        let proposer = addr(0xbb);
        let chain = MockChain {
            blocks: HashMap::from([(
                height,
                block(
                    height,
                    vec![
                        tx("0xlock", vec![locked_log(user, wei(30), 0)]),
                        tx(
                            "0xgov",
                            vec![
                                proposal_created_log(7, proposer, 0),
                                vote_cast_log(user, 7, 0, 25, 1),
                            ],
                        ),
                    ],
                ),
            )]),
            proposals: HashMap::from([(7, canned_proposal(7, proposer))]),
        };

        let mut scanner = scanner(chain);
        scanner.scan_block(height).await?;
        scanner.scan_block(height).await?;

        let state = scanner.persister();
        let user_hex = addr_hex(&user);
        assert_eq!(
            state.tnt20_deposits[&(user_hex.clone(), TDROP_TOKEN_ADDRESS.to_string())],
            BigDecimal::from(30)
        );
        assert_eq!(state.votes[&(7, user_hex)].weight, 25);
        assert_eq!(state.proposers[&addr_hex(&proposer)].0, 1);
        assert_eq!(state.proposals[&7].voter_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unlock_clamps_at_zero() -> Result<()> {
        let first = EARLIEST_BLOCK + 1;
        let second = EARLIEST_BLOCK + 2;
        let user = addr(0xaa);
        let chain = MockChain {
            blocks: HashMap::from([
                (
                    first,
                    block(first, vec![tx("0xlock", vec![locked_log(user, wei(20), 0)])]),
                ),
                (
                    second,
                    block(
                        second,
                        vec![tx("0xunlock", vec![unlocked_log(user, wei(70), 0)])],
                    ),
                ),
            ]),
            proposals: HashMap::new(),
        };

        let mut scanner = scanner(chain);
        scanner.scan_block(first).await?;
        scanner.scan_block(second).await?;

        let key = (addr_hex(&user), TDROP_TOKEN_ADDRESS.to_string());
        assert_eq!(scanner.persister().tnt20_deposits[&key], BigDecimal::from(0));
        Ok(())
    }

    #[tokio::test]
    async fn missing_block_leaves_no_trace() {
        let chain = MockChain {
            blocks: HashMap::new(),
            proposals: HashMap::new(),
        };
        let mut scanner = scanner(chain);
        let err = scanner.scan_block(EARLIEST_BLOCK + 1).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(scanner.persister().transactions.is_empty());
    }

    #[tokio::test]
    async fn unwatched_contracts_are_skipped() -> Result<()> {
        let height = EARLIEST_BLOCK + 3;
        let stray = log(
            "0x000000000000000000000000000000000000dead",
            vec![topic_uint(1)],
            vec![],
            0,
        );
        let chain = MockChain {
            blocks: HashMap::from([(height, block(height, vec![tx("0xother", vec![stray])]))]),
            proposals: HashMap::new(),
        };
        let mut scanner = scanner(chain);
        scanner.scan_block(height).await?;
        assert!(scanner.persister().transactions.is_empty());
        Ok(())
    }
}
