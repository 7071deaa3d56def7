use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary value of a box in the smallest denomination of the target chain.
pub type Value = u64;

/// Block height on either the source or the target chain.
pub type Height = u64;

/// Amount of a single token held in a box.
pub type TokenAmount = u64;

/// Defines a 32-byte identifier with hex rendering and a shortened `Debug`.
macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        // Hex in human-readable formats (JSON config, RPC), raw bytes in bincode.
        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    <[u8; 32]>::deserialize(deserializer).map(Self)
                }
            }
        }

        impl $name {
            pub fn from_bytes(b: [u8; 32]) -> Self {
                Self(b)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse a 64-character hex string. Anything else is rejected.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut arr = [0u8; 32];
                hex::decode_to_slice(s, &mut arr)?;
                Ok(Self(arr))
            }

            /// Build from a byte slice that must be exactly 32 bytes long.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let arr: [u8; 32] = bytes.try_into().ok()?;
                Some(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}…)", stringify!($name), &self.to_hex()[..16])
            }
        }
    };
}

// ── Identifiers ──────────────────────────────────────────────────────────────

hash_id!(
    /// Identifier of a box: BLAKE3 over its candidate bytes, creating tx and output index.
    BoxId
);

hash_id!(
    /// Identifier of a token (the id of the box that minted it).
    TokenId
);

hash_id!(
    /// Transaction identifier: BLAKE3 of the canonical unsigned body.
    TxId
);

hash_id!(
    /// A 256-bit digest produced by the workspace hash primitive.
    Digest
);

hash_id!(
    /// Watcher identifier. Derived as BLAKE3(public key) of the watcher's
    /// signing key, so every bonded identity maps to exactly one WID.
    Wid
);

// ── Address ──────────────────────────────────────────────────────────────────

/// An owning script / address. The watcher never interprets its contents;
/// equality is byte equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash of the script this address pays to, stamped into trigger boxes.
    pub fn script_hash(&self) -> Digest {
        Digest(*blake3::hash(self.0.as_bytes()).as_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(12).collect();
        write!(f, "Address({short}…)")
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
