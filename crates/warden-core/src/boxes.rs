use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WardenError;
use crate::types::{Address, BoxId, Height, TokenAmount, TokenId, TxId, Value};

// ── Tokens ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub amount: TokenAmount,
}

impl Token {
    pub fn new(id: TokenId, amount: TokenAmount) -> Self {
        Self { id, amount }
    }
}

/// Ordered list of tokens held by a box. Each id appears at most once; the
/// first entry is the marker token that identifies the box's purpose.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBag(Vec<Token>);

impl TokenBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` of `id`, merging into an existing entry.
    /// Zero amounts are never stored.
    pub fn add(&mut self, id: TokenId, amount: TokenAmount) -> Result<(), WardenError> {
        if amount == 0 {
            return Ok(());
        }
        match self.0.iter_mut().find(|t| t.id == id) {
            Some(t) => t.amount = t.amount.checked_add(amount).ok_or(WardenError::TokenOverflow(id))?,
            None => self.0.push(Token::new(id, amount)),
        }
        Ok(())
    }

    /// Set `id` to exactly `amount`, keeping its position if present.
    pub fn with(mut self, id: TokenId, amount: TokenAmount) -> Self {
        match self.0.iter().position(|t| t.id == id) {
            Some(i) if amount == 0 => {
                self.0.remove(i);
            }
            Some(i) => self.0[i].amount = amount,
            None if amount == 0 => {}
            None => self.0.push(Token::new(id, amount)),
        }
        self
    }

    pub fn amount_of(&self, id: &TokenId) -> TokenAmount {
        self.0.iter().find(|t| &t.id == id).map(|t| t.amount).unwrap_or(0)
    }

    pub fn first(&self) -> Option<&Token> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Registers ────────────────────────────────────────────────────────────────

/// Non-mandatory registers R4..R9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterId {
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
}

impl RegisterId {
    pub const ALL: [RegisterId; 6] = [
        RegisterId::R4,
        RegisterId::R5,
        RegisterId::R6,
        RegisterId::R7,
        RegisterId::R8,
        RegisterId::R9,
    ];

    fn index(self) -> usize {
        match self {
            RegisterId::R4 => 0,
            RegisterId::R5 => 1,
            RegisterId::R6 => 2,
            RegisterId::R7 => 3,
            RegisterId::R8 => 4,
            RegisterId::R9 => 5,
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index() + 4)
    }
}

/// Typed register content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterValue {
    Bytes(Vec<u8>),
    BytesColl(Vec<Vec<u8>>),
    Long(i64),
    LongColl(Vec<i64>),
}

/// Fixed-size register file. An absent register is `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers([Option<RegisterValue>; 6]);

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: RegisterId, value: RegisterValue) {
        self.0[id.index()] = Some(value);
    }

    pub fn with(mut self, id: RegisterId, value: RegisterValue) -> Self {
        self.set(id, value);
        self
    }

    pub fn get(&self, id: RegisterId) -> Option<&RegisterValue> {
        self.0[id.index()].as_ref()
    }

    /// Read a `Bytes` register.
    pub fn bytes(&self, id: RegisterId) -> Result<&[u8], WardenError> {
        match self.get(id) {
            Some(RegisterValue::Bytes(b)) => Ok(b),
            Some(_) => Err(WardenError::MalformedRegister(id)),
            None => Err(WardenError::MissingRegister(id)),
        }
    }

    /// Read a `BytesColl` register.
    pub fn bytes_coll(&self, id: RegisterId) -> Result<&[Vec<u8>], WardenError> {
        match self.get(id) {
            Some(RegisterValue::BytesColl(c)) => Ok(c),
            Some(_) => Err(WardenError::MalformedRegister(id)),
            None => Err(WardenError::MissingRegister(id)),
        }
    }

    /// Read a `LongColl` register.
    pub fn long_coll(&self, id: RegisterId) -> Result<&[i64], WardenError> {
        match self.get(id) {
            Some(RegisterValue::LongColl(c)) => Ok(c),
            Some(_) => Err(WardenError::MalformedRegister(id)),
            None => Err(WardenError::MissingRegister(id)),
        }
    }
}

// ── Boxes ────────────────────────────────────────────────────────────────────

/// Read access to the assets carried by a box, shared by candidates and
/// on-chain boxes so that conservation checks can mix both.
pub trait Assets {
    fn value(&self) -> Value;
    fn tokens(&self) -> &TokenBag;
}

/// Total value of `boxes`.
pub fn value_sum<A: Assets>(boxes: &[A]) -> Result<Value, WardenError> {
    boxes
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_add(b.value()))
        .ok_or(WardenError::ValueOverflow)
}

/// Total amount of token `id` held by `boxes`.
pub fn token_sum<A: Assets>(boxes: &[A], id: &TokenId) -> Result<TokenAmount, WardenError> {
    boxes
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_add(b.tokens().amount_of(id)))
        .ok_or(WardenError::TokenOverflow(*id))
}

/// A proposed transaction output. It has no id until it is placed in a
/// transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCandidate {
    pub value: Value,
    pub address: Address,
    pub creation_height: Height,
    pub tokens: TokenBag,
    pub registers: Registers,
}

impl BoxCandidate {
    pub fn new(value: Value, address: Address, creation_height: Height) -> Self {
        Self {
            value,
            address,
            creation_height,
            tokens: TokenBag::new(),
            registers: Registers::new(),
        }
    }

    /// Canonical bytes (bincode).
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("box candidate serialization is infallible")
    }

    /// Materialise this candidate as output `index` of transaction `tx_id`.
    pub fn into_box(self, tx_id: &TxId, index: u16) -> UtxoBox {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.to_bytes());
        hasher.update(tx_id.as_bytes());
        hasher.update(&index.to_be_bytes());
        let box_id = BoxId(*hasher.finalize().as_bytes());
        UtxoBox {
            box_id,
            tx_id: *tx_id,
            index,
            value: self.value,
            address: self.address,
            creation_height: self.creation_height,
            tokens: self.tokens,
            registers: self.registers,
        }
    }
}

impl Assets for BoxCandidate {
    fn value(&self) -> Value {
        self.value
    }
    fn tokens(&self) -> &TokenBag {
        &self.tokens
    }
}

/// An unspent (or historically created) box on the target chain.
/// Immutable: spending is recorded by the store, never on the box itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoBox {
    pub box_id: BoxId,
    /// Transaction that created the box.
    pub tx_id: TxId,
    /// Output index inside the creating transaction.
    pub index: u16,
    pub value: Value,
    pub address: Address,
    pub creation_height: Height,
    pub tokens: TokenBag,
    pub registers: Registers,
}

impl UtxoBox {
    /// The output candidate this box was created from.
    pub fn candidate(&self) -> BoxCandidate {
        BoxCandidate {
            value: self.value,
            address: self.address.clone(),
            creation_height: self.creation_height,
            tokens: self.tokens.clone(),
            registers: self.registers.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("box serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WardenError> {
        bincode::deserialize(bytes).map_err(|e| WardenError::Serialization(e.to_string()))
    }
}

impl Assets for UtxoBox {
    fn value(&self) -> Value {
        self.value
    }
    fn tokens(&self) -> &TokenBag {
        &self.tokens
    }
}
