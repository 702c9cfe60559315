//! The deployed contracts this indexer watches, with their event catalogs.

use alloy_primitives::Address;

use crate::abi::ParamType;
use crate::events::catalog::{ContractDefinition, EventAbi, EventParam};
use crate::events::{
    ConfigEvent, ConfigParam, DomainEvent, GovernanceEvent, LockEvent, ProposalCreated,
};

/// The governance contract.
pub const V4R_ADDRESS: &str = "0x90632afc1a70d65bad19334d1f31ac671e80c830";

/// TNT-20 lock contract and the token it locks.
pub const TDROP_LOCK_ADDRESS: &str = "0x44f4070857060fdf7fc2e63816667d4e5f88371e";
pub const TDROP_TOKEN_ADDRESS: &str = "0x11cac290c3a12744dc7cb647e7b6032303c64152";

/// TNT-721 lock contract and the collection it locks.
pub const OTIES_LOCK_ADDRESS: &str = "0xca28463bed2076be12358222cb1692b5d69f23e3";
pub const OTIES_TOKEN_ADDRESS: &str = "0x5f98156b5f6401e7fd899e9fa2d60b07233d25b6";

/// Every contract the scanner watches.
pub fn watched_contracts() -> Vec<ContractDefinition> {
    vec![
        v4r(),
        lock_contract("LockTDrop", TDROP_LOCK_ADDRESS, TDROP_TOKEN_ADDRESS, true),
        lock_contract("LockOties", OTIES_LOCK_ADDRESS, OTIES_TOKEN_ADDRESS, false),
    ]
}

fn param(name: &'static str, kind: ParamType, indexed: bool) -> EventParam {
    EventParam {
        name,
        kind,
        indexed,
    }
}

/// A lock contract emits `Locked`/`Unlocked(address user, uint256 amount)`
/// for TNT-20 and `Locked`/`Unlocked(address user, uint256 tokenId)` for
/// TNT-721. The locked token's address is fixed per deployment, so the
/// handlers carry it.
fn lock_contract(
    name: &'static str,
    address: &'static str,
    token: &'static str,
    is_tnt20: bool,
) -> ContractDefinition {
    let token: Address = token.parse().expect("token address literal");
    let value_field = if is_tnt20 { "amount" } else { "tokenId" };
    let lock = move |fields: &super::catalog::Fields| {
        let user = fields.address("user")?;
        let value = fields.uint(value_field)?;
        Ok(DomainEvent::Lock(if is_tnt20 {
            LockEvent::Tnt20Locked {
                token,
                user,
                amount: value,
            }
        } else {
            LockEvent::Tnt721Locked {
                token,
                user,
                token_id: value,
            }
        }))
    };
    let unlock = move |fields: &super::catalog::Fields| {
        let user = fields.address("user")?;
        let value = fields.uint(value_field)?;
        Ok(DomainEvent::Lock(if is_tnt20 {
            LockEvent::Tnt20Unlocked {
                token,
                user,
                amount: value,
            }
        } else {
            LockEvent::Tnt721Unlocked {
                token,
                user,
                token_id: value,
            }
        }))
    };
    ContractDefinition {
        name,
        address,
        events: vec![
            EventAbi {
                name: "Locked",
                inputs: vec![
                    param("user", ParamType::Address, true),
                    param(value_field, ParamType::Uint256, false),
                ],
                handler: Box::new(lock),
            },
            EventAbi {
                name: "Unlocked",
                inputs: vec![
                    param("user", ParamType::Address, true),
                    param(value_field, ParamType::Uint256, false),
                ],
                handler: Box::new(unlock),
            },
        ],
    }
}

/// An event carrying a single non-indexed uint256 that replaces one global
/// config parameter.
fn config_update(
    event_name: &'static str,
    field: &'static str,
    config_param: ConfigParam,
) -> EventAbi {
    EventAbi {
        name: event_name,
        inputs: vec![param(field, ParamType::Uint256, false)],
        handler: Box::new(move |fields| {
            Ok(DomainEvent::Config(ConfigEvent {
                param: config_param,
                value: fields.uint(field)?,
            }))
        }),
    }
}

pub fn v4r() -> ContractDefinition {
    ContractDefinition {
        name: "V4R",
        address: V4R_ADDRESS,
        events: vec![
            EventAbi {
                name: "ProposalCreated",
                inputs: vec![
                    param("id", ParamType::Uint256, true),
                    param("proposer", ParamType::Address, true),
                    param("description", ParamType::String, false),
                    param("votingOptions", ParamType::StringArray, false),
                    param("startTime", ParamType::Uint256, false),
                    param("endTime", ParamType::Uint256, false),
                    param("proposalTokenRatioAmount", ParamType::Uint256, false),
                    param("proposaltFuelRatioAmount", ParamType::Uint256, false),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(GovernanceEvent::ProposalCreated(
                        ProposalCreated {
                            proposal_id: fields.uint("id")?,
                            proposer: fields.address("proposer")?,
                            description: fields.string("description")?,
                            options: fields.string_array("votingOptions")?,
                            start_time: fields.uint("startTime")?,
                            end_time: fields.uint("endTime")?,
                            reward_token_amount: fields.uint("proposalTokenRatioAmount")?,
                            tfuel_amount: fields.uint("proposaltFuelRatioAmount")?,
                        },
                    )))
                }),
            },
            EventAbi {
                name: "ProposalCanceled",
                inputs: vec![param("id", ParamType::Uint256, true)],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(GovernanceEvent::ProposalCanceled {
                        proposal_id: fields.uint("id")?,
                    }))
                }),
            },
            EventAbi {
                name: "VoteCast",
                inputs: vec![
                    param("voter", ParamType::Address, true),
                    param("proposalId", ParamType::Uint256, true),
                    param("option", ParamType::Uint8, false),
                    param("votes", ParamType::Uint256, false),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(GovernanceEvent::VoteCast {
                        voter: fields.address("voter")?,
                        proposal_id: fields.uint("proposalId")?,
                        option: fields.uint8("option")?,
                        votes: fields.uint("votes")?,
                    }))
                }),
            },
            EventAbi {
                name: "RewardClaimed",
                inputs: vec![
                    param("voter", ParamType::Address, true),
                    param("proposalId", ParamType::Uint256, true),
                    param("rewardTFuel", ParamType::Uint256, false),
                    param("rewardToken", ParamType::Uint256, false),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(GovernanceEvent::RewardClaimed {
                        voter: fields.address("voter")?,
                        proposal_id: fields.uint("proposalId")?,
                        reward_tfuel: fields.uint("rewardTFuel")?,
                        reward_token: fields.uint("rewardToken")?,
                    }))
                }),
            },
            EventAbi {
                name: "ProposerRoleUpdated",
                inputs: vec![
                    param("proposer", ParamType::Address, true),
                    param("status", ParamType::Bool, true),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(
                        GovernanceEvent::ProposerRoleUpdated {
                            proposer: fields.address("proposer")?,
                            active: fields.flag("status")?,
                        },
                    ))
                }),
            },
            EventAbi {
                name: "TokenInfoUpdated",
                inputs: vec![
                    param("token", ParamType::Address, true),
                    param("votingPower", ParamType::Uint256, false),
                    param("lockAddress", ParamType::Address, false),
                    param("isTNT20", ParamType::Bool, false),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(GovernanceEvent::TokenInfoUpdated {
                        token: fields.address("token")?,
                        voting_power: fields.uint("votingPower")?,
                        lock_address: fields.address("lockAddress")?,
                        is_tnt20: fields.flag("isTNT20")?,
                    }))
                }),
            },
            EventAbi {
                name: "RewardTokenUpdated",
                inputs: vec![
                    param("newRewardToken", ParamType::Address, false),
                    param("status", ParamType::Bool, false),
                ],
                handler: Box::new(|fields| {
                    Ok(DomainEvent::Governance(
                        GovernanceEvent::RewardTokenUpdated {
                            token: fields.address("newRewardToken")?,
                            is_reward_token: fields.flag("status")?,
                        },
                    ))
                }),
            },
            config_update(
                "MinProposalPeriodUpdated",
                "newMinProposalPeriod",
                ConfigParam::MinProposalPeriod,
            ),
            config_update(
                "MaxProposalPeriodUpdated",
                "newMaxProposalPeriod",
                ConfigParam::MaxProposalPeriod,
            ),
            config_update(
                "MinVotingPeriodUpdated",
                "newMinVotingPeriod",
                ConfigParam::MinVotingPeriod,
            ),
            config_update(
                "MaxVotingPeriodUpdated",
                "newMaxVotingPeriod",
                ConfigParam::MaxVotingPeriod,
            ),
            config_update(
                "SplitTFuelOwnersRatioUpdated",
                "newSplitTFuelOwnersRatio",
                ConfigParam::SplitTFuelOwnersRatio,
            ),
            config_update(
                "PotProposalRewardRatioUpdated",
                "newPotProposalRewardRatio",
                ConfigParam::PotProposalRewardRatio,
            ),
            config_update(
                "MaxOptionValueUpdated",
                "newMaxOptionValue",
                ConfigParam::MaxOptionValue,
            ),
            config_update(
                "MaxVotingTokensUpdated",
                "newMaxVotingTokens",
                ConfigParam::MaxVotingTokens,
            ),
        ],
    }
}
