//! Minimal ABI codec for contract event logs and `eth_call` payloads.
//!
//! Covers exactly the parameter types the watched contracts emit. Decoding is
//! strict: malformed words or truncated payloads are errors, never silently
//! masked, because a misdecoded log is a misindexed vote or deposit.

use alloy_primitives::{keccak256, Address, B256, U256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("abi data too short: wanted {wanted} bytes, have {have}")]
    DataTooShort { wanted: usize, have: usize },
    #[error("abi offset or length out of bounds: {0}")]
    OutOfBounds(usize),
    #[error("invalid boolean word")]
    InvalidBool,
    #[error("uint{width} value out of range")]
    UintOverflow { width: usize },
    #[error("invalid utf-8 in abi string")]
    InvalidUtf8,
    #[error("indexed parameter of type {0} cannot be decoded from a topic")]
    UnsupportedTopic(&'static str),
}

/// The Solidity types used by the watched contracts' events and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    AddressArray,
    Bool,
    Bytes,
    String,
    StringArray,
    Uint8,
    Uint64,
    Uint256,
    Uint256Array,
}

impl ParamType {
    /// Canonical name as it appears in an event signature.
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Address => "address",
            ParamType::AddressArray => "address[]",
            ParamType::Bool => "bool",
            ParamType::Bytes => "bytes",
            ParamType::String => "string",
            ParamType::StringArray => "string[]",
            ParamType::Uint8 => "uint8",
            ParamType::Uint64 => "uint64",
            ParamType::Uint256 => "uint256",
            ParamType::Uint256Array => "uint256[]",
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            ParamType::AddressArray
                | ParamType::Bytes
                | ParamType::String
                | ParamType::StringArray
                | ParamType::Uint256Array
        )
    }
}

/// A decoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    AddressArray(Vec<Address>),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    StringArray(Vec<String>),
    Uint(U256),
    UintArray(Vec<U256>),
}

impl Token {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Token::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Token::StringArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_address_array(&self) -> Option<&[Address]> {
        match self {
            Token::AddressArray(v) => Some(v),
            _ => None,
        }
    }
}

/// Canonical event signature, e.g. `VoteCast(address,uint256,uint8,uint256)`.
pub fn event_signature(name: &str, kinds: &[ParamType]) -> String {
    let params: Vec<&str> = kinds.iter().map(ParamType::name).collect();
    format!("{}({})", name, params.join(","))
}

/// keccak256 of the canonical signature; topic[0] of every matching log.
pub fn event_topic(name: &str, kinds: &[ParamType]) -> B256 {
    keccak256(event_signature(name, kinds).as_bytes())
}

/// First four bytes of the signature hash; prefix of `eth_call` data.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Decodes a batch of parameters from `data` in declaration order.
pub fn decode(kinds: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut tokens = Vec::with_capacity(kinds.len());
    for (slot, kind) in kinds.iter().enumerate() {
        let word = read_word(data, slot * 32)?;
        let token = if kind.is_dynamic() {
            let offset = read_usize(&word)?;
            decode_dynamic(*kind, data, offset)?
        } else {
            decode_static(*kind, &word)?
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Decodes one indexed parameter from a log topic. Only value types may be
/// decoded this way; a dynamic indexed parameter is stored hashed on chain.
pub fn decode_topic(kind: ParamType, topic: &B256) -> Result<Token, AbiError> {
    if kind.is_dynamic() {
        return Err(AbiError::UnsupportedTopic(kind.name()));
    }
    decode_static(kind, &topic.0)
}

fn decode_static(kind: ParamType, word: &[u8; 32]) -> Result<Token, AbiError> {
    match kind {
        ParamType::Address => Ok(Token::Address(Address::from_slice(&word[12..]))),
        ParamType::Bool => {
            if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
                return Err(AbiError::InvalidBool);
            }
            Ok(Token::Bool(word[31] == 1))
        }
        ParamType::Uint8 => {
            if word[..31].iter().any(|b| *b != 0) {
                return Err(AbiError::UintOverflow { width: 8 });
            }
            Ok(Token::Uint(U256::from(word[31])))
        }
        ParamType::Uint64 => {
            if word[..24].iter().any(|b| *b != 0) {
                return Err(AbiError::UintOverflow { width: 64 });
            }
            Ok(Token::Uint(U256::from_be_slice(word)))
        }
        ParamType::Uint256 => Ok(Token::Uint(U256::from_be_slice(word))),
        _ => unreachable!("dynamic types are handled by decode_dynamic"),
    }
}

fn decode_dynamic(kind: ParamType, data: &[u8], offset: usize) -> Result<Token, AbiError> {
    let len = read_usize(&read_word(data, offset)?)?;
    if len > data.len() {
        return Err(AbiError::OutOfBounds(len));
    }
    let base = offset + 32;
    match kind {
        ParamType::Bytes => Ok(Token::Bytes(read_bytes(data, base, len)?.to_vec())),
        ParamType::String => {
            let raw = read_bytes(data, base, len)?;
            let text = std::str::from_utf8(raw).map_err(|_| AbiError::InvalidUtf8)?;
            Ok(Token::String(text.to_string()))
        }
        ParamType::AddressArray => {
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let word = read_word(data, base + i * 32)?;
                items.push(Address::from_slice(&word[12..]));
            }
            Ok(Token::AddressArray(items))
        }
        ParamType::Uint256Array => {
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let word = read_word(data, base + i * 32)?;
                items.push(U256::from_be_slice(&word));
            }
            Ok(Token::UintArray(items))
        }
        ParamType::StringArray => {
            // Element offsets are relative to the start of the array body.
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let elem_offset = read_usize(&read_word(data, base + i * 32)?)?;
                match decode_dynamic(ParamType::String, &data[base..], elem_offset)? {
                    Token::String(s) => items.push(s),
                    _ => unreachable!(),
                }
            }
            Ok(Token::StringArray(items))
        }
        _ => unreachable!("static types are handled by decode_static"),
    }
}

/// Encodes a batch of values; the exact inverse of [`decode`].
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        match encode_static(token) {
            Some(word) => head.extend_from_slice(&word),
            None => {
                push_uint(&mut head, U256::from((head_len + tail.len()) as u64));
                encode_dynamic(token, &mut tail);
            }
        }
    }
    head.extend_from_slice(&tail);
    head
}

fn encode_static(token: &Token) -> Option<[u8; 32]> {
    let mut word = [0u8; 32];
    match token {
        Token::Address(a) => word[12..].copy_from_slice(a.as_slice()),
        Token::Bool(b) => word[31] = *b as u8,
        Token::Uint(v) => word = v.to_be_bytes::<32>(),
        _ => return None,
    }
    Some(word)
}

fn encode_dynamic(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Bytes(raw) => {
            push_uint(out, U256::from(raw.len() as u64));
            out.extend_from_slice(raw);
            pad_to_word(out, raw.len());
        }
        Token::String(s) => encode_dynamic(&Token::Bytes(s.as_bytes().to_vec()), out),
        Token::AddressArray(items) => {
            push_uint(out, U256::from(items.len() as u64));
            for a in items {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(a.as_slice());
                out.extend_from_slice(&word);
            }
        }
        Token::UintArray(items) => {
            push_uint(out, U256::from(items.len() as u64));
            for v in items {
                push_uint(out, *v);
            }
        }
        Token::StringArray(items) => {
            push_uint(out, U256::from(items.len() as u64));
            let head_len = items.len() * 32;
            let mut heads = Vec::with_capacity(head_len);
            let mut tails = Vec::new();
            for s in items {
                push_uint(&mut heads, U256::from((head_len + tails.len()) as u64));
                encode_dynamic(&Token::String(s.clone()), &mut tails);
            }
            out.extend_from_slice(&heads);
            out.extend_from_slice(&tails);
        }
        _ => unreachable!("static tokens are handled by encode_static"),
    }
}

fn push_uint(out: &mut Vec<u8>, value: U256) {
    out.extend_from_slice(&value.to_be_bytes::<32>());
}

fn pad_to_word(out: &mut Vec<u8>, content_len: usize) {
    let rem = content_len % 32;
    if rem != 0 {
        out.extend(std::iter::repeat(0u8).take(32 - rem));
    }
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let raw = read_bytes(data, offset, 32)?;
    let mut word = [0u8; 32];
    word.copy_from_slice(raw);
    Ok(word)
}

fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(len).ok_or(AbiError::OutOfBounds(offset))?;
    if end > data.len() {
        return Err(AbiError::DataTooShort {
            wanted: end,
            have: data.len(),
        });
    }
    Ok(&data[offset..end])
}

fn read_usize(word: &[u8; 32]) -> Result<usize, AbiError> {
    if word[..28].iter().any(|b| *b != 0) {
        return Err(AbiError::OutOfBounds(usize::MAX));
    }
    let value = U256::from_be_slice(word);
    Ok(value.as_limbs()[0] as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn signature_is_canonical() {
        let sig = event_signature(
            "VoteCast",
            &[
                ParamType::Address,
                ParamType::Uint256,
                ParamType::Uint8,
                ParamType::Uint256,
            ],
        );
        assert_eq!(sig, "VoteCast(address,uint256,uint8,uint256)");
        // Known keccak256 of ERC-20 Transfer as a reference point.
        let transfer = event_topic(
            "Transfer",
            &[ParamType::Address, ParamType::Address, ParamType::Uint256],
        );
        assert_eq!(
            format!("{transfer:x}"),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn decodes_proposal_created_payload() {
        // (string description, string[] options, uint256 start, uint256 end)
        let tokens = vec![
            Token::String("upgrade the pot".to_string()),
            Token::StringArray(vec!["yes".to_string(), "no".to_string()]),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::from(1_700_604_800u64)),
        ];
        let data = encode(&tokens);
        let kinds = [
            ParamType::String,
            ParamType::StringArray,
            ParamType::Uint256,
            ParamType::Uint256,
        ];
        let decoded = decode(&kinds, &data).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn decodes_address_arrays() {
        let a = Address::from_str("0x11cac290c3a12744dc7cb647e7b6032303c64152").unwrap();
        let b = Address::from_str("0x5f98156b5f6401e7fd899e9fa2d60b07233d25b6").unwrap();
        let data = encode(&[Token::AddressArray(vec![a, b])]);
        let decoded = decode(&[ParamType::AddressArray], &data).unwrap();
        assert_eq!(decoded[0].as_address_array().unwrap(), &[a, b]);
    }

    #[test]
    fn topic_decoding_is_strict() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xaa; 20]);
        let topic = B256::from(word);
        let token = decode_topic(ParamType::Address, &topic).unwrap();
        assert_eq!(
            token.as_address().unwrap(),
            Address::from_slice(&[0xaa; 20])
        );

        assert_eq!(
            decode_topic(ParamType::String, &topic),
            Err(AbiError::UnsupportedTopic("string"))
        );
    }

    #[test]
    fn rejects_malformed_words() {
        let mut word = [0u8; 32];
        word[31] = 2;
        assert_eq!(
            decode(&[ParamType::Bool], &word),
            Err(AbiError::InvalidBool)
        );

        let mut big = [0u8; 32];
        big[0] = 1;
        assert_eq!(
            decode(&[ParamType::Uint8], &big),
            Err(AbiError::UintOverflow { width: 8 })
        );

        assert_eq!(
            decode(&[ParamType::Uint256], &[0u8; 16]),
            Err(AbiError::DataTooShort {
                wanted: 32,
                have: 16
            })
        );
    }

    #[test]
    fn rejects_truncated_dynamic_payloads() {
        let data = encode(&[Token::String("hello world".to_string())]);
        let err = decode(&[ParamType::String], &data[..data.len() - 32]).unwrap_err();
        assert!(matches!(err, AbiError::DataTooShort { .. }));
    }
}
