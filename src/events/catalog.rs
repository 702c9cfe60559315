//! Per-contract event catalogs.
//!
//! A [`SmartContract`] holds an immutable lookup table built once at startup,
//! keyed by `(topic0, topic count)`. Two overloads of an event that share a
//! name but differ in indexed-parameter count therefore dispatch to different
//! entries, and a log whose topic layout matches no entry is skipped rather
//! than misdecoded.

use std::collections::HashMap;

use alloy_primitives::{hex, B256};
use anyhow::{bail, Context, Result};

use crate::abi::{self, ParamType, Token};
use crate::chain::ThetaLog;
use crate::events::DomainEvent;

/// Turns the decoded fields of one log into a normalized [`DomainEvent`].
pub type Handler = Box<dyn Fn(&Fields) -> Result<DomainEvent> + Send + Sync>;

pub struct EventParam {
    pub name: &'static str,
    pub kind: ParamType,
    pub indexed: bool,
}

/// One event as declared in a contract's ABI, plus its handler.
pub struct EventAbi {
    pub name: &'static str,
    pub inputs: Vec<EventParam>,
    pub handler: Handler,
}

/// A watched contract: its lowercase address and the events to decode.
pub struct ContractDefinition {
    pub name: &'static str,
    pub address: &'static str,
    pub events: Vec<EventAbi>,
}

/// Decoded parameters of one log, addressable by declared name.
pub struct Fields(Vec<(&'static str, Token)>);

impl Fields {
    fn get(&self, name: &str) -> Result<&Token> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, token)| token)
            .with_context(|| format!("event field `{}` missing", name))
    }

    pub fn address(&self, name: &str) -> Result<alloy_primitives::Address> {
        self.get(name)?
            .as_address()
            .with_context(|| format!("event field `{}` is not an address", name))
    }

    pub fn uint(&self, name: &str) -> Result<alloy_primitives::U256> {
        self.get(name)?
            .as_uint()
            .with_context(|| format!("event field `{}` is not a uint", name))
    }

    pub fn uint8(&self, name: &str) -> Result<u8> {
        let value = self.uint(name)?;
        let limbs = value.as_limbs();
        if limbs[1] != 0 || limbs[2] != 0 || limbs[3] != 0 || limbs[0] > u8::MAX as u64 {
            bail!("event field `{}` does not fit in u8", name);
        }
        Ok(limbs[0] as u8)
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        self.get(name)?
            .as_bool()
            .with_context(|| format!("event field `{}` is not a bool", name))
    }

    pub fn string(&self, name: &str) -> Result<String> {
        Ok(self
            .get(name)?
            .as_string()
            .with_context(|| format!("event field `{}` is not a string", name))?
            .to_string())
    }

    pub fn string_array(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .get(name)?
            .as_string_array()
            .with_context(|| format!("event field `{}` is not a string[]", name))?
            .to_vec())
    }
}

/// One catalog entry, with the declaration split into topic and data halves.
pub struct ContractEvent {
    pub name: &'static str,
    pub signature: String,
    pub topic: B256,
    /// topic0 plus one topic per indexed parameter.
    pub topic_count: usize,
    topic_fields: Vec<(&'static str, ParamType)>,
    data_fields: Vec<(&'static str, ParamType)>,
    handler: Handler,
}

impl ContractEvent {
    fn new(abi: EventAbi) -> Self {
        let kinds: Vec<ParamType> = abi.inputs.iter().map(|p| p.kind).collect();
        let signature = abi::event_signature(abi.name, &kinds);
        let topic = abi::event_topic(abi.name, &kinds);
        let mut topic_fields = Vec::new();
        let mut data_fields = Vec::new();
        for param in &abi.inputs {
            if param.indexed {
                topic_fields.push((param.name, param.kind));
            } else {
                data_fields.push((param.name, param.kind));
            }
        }
        ContractEvent {
            name: abi.name,
            signature,
            topic,
            topic_count: topic_fields.len() + 1,
            topic_fields,
            data_fields,
            handler: abi.handler,
        }
    }

    /// Decodes a log already matched to this entry by `(topic0, topic count)`.
    fn decode(&self, log: &ThetaLog) -> Result<DomainEvent> {
        let raw = hex::decode(&log.data)
            .with_context(|| format!("{}: log data is not hex", self.name))?;
        let kinds: Vec<ParamType> = self.data_fields.iter().map(|(_, k)| *k).collect();
        let tokens = abi::decode(&kinds, &raw)
            .with_context(|| format!("{}: malformed log data", self.name))?;

        let mut fields = Vec::with_capacity(self.topic_fields.len() + tokens.len());
        for (i, (name, kind)) in self.topic_fields.iter().enumerate() {
            let token = abi::decode_topic(*kind, &log.topics[i + 1])
                .with_context(|| format!("{}: malformed topic `{}`", self.name, name))?;
            fields.push((*name, token));
        }
        for ((name, _), token) in self.data_fields.iter().zip(tokens) {
            fields.push((*name, token));
        }
        (self.handler)(&Fields(fields))
    }
}

/// A watched contract with its immutable dispatch table.
pub struct SmartContract {
    pub name: &'static str,
    pub address: &'static str,
    events: HashMap<(B256, usize), ContractEvent>,
}

impl SmartContract {
    /// Builds the dispatch table, failing fast on any key collision.
    pub fn new(definition: ContractDefinition) -> Result<Self> {
        let mut events = HashMap::new();
        for abi in definition.events {
            let event = ContractEvent::new(abi);
            let key = (event.topic, event.topic_count);
            if let Some(existing) = events.insert(key, event) {
                bail!(
                    "{}: events `{}` and `{}` share topic {} with {} topics",
                    definition.name,
                    existing.name,
                    events[&key].name,
                    key.0,
                    key.1
                );
            }
        }
        Ok(SmartContract {
            name: definition.name,
            address: definition.address,
            events,
        })
    }

    /// Decodes a log emitted by this contract. `Ok(None)` means the log's
    /// topic layout matches no cataloged event and should be skipped; `Err`
    /// means a matched log failed to decode and the scan must halt.
    pub fn decode(&self, log: &ThetaLog) -> Result<Option<DomainEvent>> {
        let topic0 = match log.topics.first() {
            Some(t) => *t,
            None => return Ok(None),
        };
        match self.events.get(&(topic0, log.topics.len())) {
            Some(event) => event.decode(log).map(Some),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.values().map(|e| e.name).collect()
    }
}
