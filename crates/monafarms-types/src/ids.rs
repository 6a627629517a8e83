//! Type-safe identifier wrappers.
//!
//! Tiles and crops are addressed on-chain by small integers; players by
//! their wallet address; confirmed mutations by a transaction hash. Each
//! gets its own newtype so a tile index can never be passed where a crop
//! id is expected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around an unsigned integer with standard derives.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub $inner);

        impl $name {
            /// Return the inner integer value.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_index! {
    /// Ordinal position of a tile within a player's farm.
    TileIndex(u32)
}

define_index! {
    /// Stable identifier of a crop (and of the seed that grows it).
    CropId(u16)
}

/// Length of a wallet address in hex digits, excluding the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// Errors produced when parsing a [`PlayerAddress`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The address does not start with `0x`.
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    /// The address body is not exactly 40 characters long.
    #[error("address must have 40 hex digits, got {len}")]
    BadLength {
        /// Number of characters after the prefix.
        len: usize,
    },

    /// The address body contains a non-hex character.
    #[error("address contains non-hex character {0:?}")]
    NotHex(char),
}

/// A player's wallet address, normalized to lowercase `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(try_from = "String", into = "String")]
pub struct PlayerAddress(String);

impl PlayerAddress {
    /// Parse and normalize a wallet address.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] describing the first problem found.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_owned()))?;

        let len = body.chars().count();
        if len != ADDRESS_HEX_LEN {
            return Err(AddressError::BadLength { len });
        }
        if let Some(bad) = body.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(AddressError::NotHex(bad));
        }

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// Return the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlayerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PlayerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PlayerAddress> for String {
    fn from(address: PlayerAddress) -> Self {
        address.0
    }
}

/// Hash of a confirmed backend transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TxHash(pub String);

impl core::fmt::Display for TxHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
