//! # Core Entities
//!
//! Chain identifiers, mining round ids and the block feed wire format.
//!
//! Hashes and addresses are plain byte arrays; in JSON they are hex strings
//! with an optional `0x` prefix (see [`hex_bytes`]).

use crate::amount::Amount;
use crate::errors::{PoolNameError, RoundIdError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte block or transaction hash.
pub type Hash = [u8; 32];

/// 20-byte account or token contract address.
pub type Address = [u8; 20];

/// Block height.
pub type BlockNumber = u64;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// All-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Format an address as `0x`-prefixed lowercase hex.
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Format a hash as `0x`-prefixed lowercase hex.
pub fn hash_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Identifier of a mining round.
///
/// Round boundaries are configuration, so the identifier is an opaque
/// non-empty label of at most [`RoundId::MAX_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoundId(String);

impl RoundId {
    /// Round ids are length-prefixed with one byte in storage keys.
    pub const MAX_LEN: usize = 255;

    pub fn new(id: impl Into<String>) -> Result<Self, RoundIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RoundIdError::Empty);
        }
        if id.len() > Self::MAX_LEN {
            return Err(RoundIdError::TooLong {
                len: id.len(),
                max: Self::MAX_LEN,
            });
        }
        Ok(RoundId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoundId {
    type Error = RoundIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoundId::new(value)
    }
}

impl From<RoundId> for String {
    fn from(id: RoundId) -> Self {
        id.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a reward pool within a mining round.
///
/// A round may split its reward across several pools; credits are keyed by
/// pool so that two pools crediting the same holder in the same block do
/// not collide. Credits from the block feed without a pool land in
/// [`PoolName::EXTERNAL`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolName(String);

impl PoolName {
    /// Pool names are length-prefixed with one byte in storage keys.
    pub const MAX_LEN: usize = 255;

    /// Pool of externally computed credits.
    pub const EXTERNAL: &'static str = "external";

    pub fn new(name: impl Into<String>) -> Result<Self, PoolNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PoolNameError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(PoolNameError::TooLong {
                len: name.len(),
                max: Self::MAX_LEN,
            });
        }
        Ok(PoolName(name))
    }

    pub fn external() -> Self {
        PoolName(Self::EXTERNAL.to_string())
    }

    pub fn is_external(&self) -> bool {
        self.0 == Self::EXTERNAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PoolName {
    fn default() -> Self {
        Self::external()
    }
}

impl TryFrom<String> for PoolName {
    type Error = PoolNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PoolName::new(value)
    }
}

impl From<PoolName> for String {
    fn from(name: PoolName) -> Self {
        name.0
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Block identity as seen by the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    #[serde(with = "hex_bytes")]
    pub hash: Hash,
    #[serde(with = "hex_bytes")]
    pub parent_hash: Hash,
}

/// A signed balance change emitted by a token-transfer log.
///
/// A transfer of `x` from A to B arrives as two deltas: `-x` for A and `+x`
/// for B, sharing the transaction hash and event index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDelta {
    #[serde(with = "hex_bytes")]
    pub transaction_hash: Hash,
    pub event_index: u32,
    #[serde(with = "hex_bytes")]
    pub token: Address,
    #[serde(with = "hex_bytes")]
    pub holder: Address,
    pub amount: Amount,
}

/// An externally computed mining reward credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCredit {
    pub round: RoundId,
    #[serde(default)]
    pub pool: PoolName,
    #[serde(with = "hex_bytes")]
    pub holder: Address,
    pub amount: Amount,
}

/// One canonical block together with everything the ledger derives from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlock {
    pub number: BlockNumber,
    #[serde(with = "hex_bytes")]
    pub hash: Hash,
    #[serde(with = "hex_bytes")]
    pub parent_hash: Hash,
    #[serde(default)]
    pub events: Vec<TransferDelta>,
    #[serde(default)]
    pub credits: Vec<RewardCredit>,
}

impl ChainBlock {
    /// A block carrying no events or credits.
    pub fn empty(number: BlockNumber, hash: Hash, parent_hash: Hash) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            events: Vec::new(),
            credits: Vec::new(),
        }
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
        }
    }
}

/// Serde adapter for fixed-size byte arrays.
///
/// Human-readable formats get `0x`-prefixed hex; binary formats get the raw
/// bytes.
pub mod hex_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            let digits = text.strip_prefix("0x").unwrap_or(&text);
            hex::decode(digits).map_err(D::Error::custom)?
        } else {
            serde_bytes_vec(deserializer)?
        };

        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {len}")))
    }

    fn serde_bytes_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> serde::de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a byte array")
            }

            fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Vec<u8>, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    out.push(byte);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
