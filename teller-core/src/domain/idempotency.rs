//! Idempotency primitives for safe retries of money movements
//!
//! A caller attaches an [`IdempotencyKey`] to a deposit, withdrawal or
//! transfer. The ledger stores the key together with a [`PayloadHash`] of the
//! canonical request once the movement commits. A retry with the same key and
//! payload replays the stored outcome; a retry with a different payload is a
//! conflict.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Client-provided idempotency key (UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random key
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdempotencyKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("idempotency key must not be empty".to_string());
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| "idempotency key must be a valid UUID".to_string())
    }
}

/// The movement a key was first used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOperation {
    Deposit,
    Withdrawal,
    Transfer,
}

impl LedgerOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!("unknown ledger operation '{}'", other)),
        }
    }
}

/// SHA-256 of a canonical request, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadHash(String);

impl PayloadHash {
    /// Hash the canonical fields of a request
    ///
    /// Fields are joined with a unit separator so that `["ab", "c"]` and
    /// `["a", "bc"]` hash differently.
    pub fn of_fields(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stored link between a key and the transaction it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub operation: LedgerOperation,
    pub request_hash: PayloadHash,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Outcome of looking a key up before executing a movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyLookup {
    /// Key never seen; execute normally
    Fresh,
    /// Same operation and payload; replay the recorded transaction
    Replay(Uuid),
    /// Key reused for a different request
    Conflict,
}

impl IdempotencyRecord {
    pub fn lookup(
        existing: Option<&IdempotencyRecord>,
        operation: LedgerOperation,
        request_hash: &PayloadHash,
    ) -> IdempotencyLookup {
        match existing {
            None => IdempotencyLookup::Fresh,
            Some(record)
                if record.operation == operation && &record.request_hash == request_hash =>
            {
                IdempotencyLookup::Replay(record.transaction_id)
            }
            Some(_) => IdempotencyLookup::Conflict,
        }
    }
}
