//! Rewards wallet validation.
//!
//! Only the length is checked; there is no checksum or curve validation.

use std::fmt;

use thiserror::Error;

use crate::constants::{MAX_WALLET_LEN, MIN_WALLET_LEN};

/// Why a candidate wallet was refused. The `Display` text is shown to the user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletRejection {
    #[error("Wallet address is too short ({len} characters, minimum {})", MIN_WALLET_LEN)]
    TooShort { len: usize },

    #[error("Wallet address is too long ({len} characters, maximum {})", MAX_WALLET_LEN)]
    TooLong { len: usize },
}

/// A rewards wallet that passed the length check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Surrounding whitespace is dropped before the length is measured.
    pub fn parse(candidate: &str) -> Result<Self, WalletRejection> {
        let candidate = candidate.trim();
        let len = candidate.chars().count();
        if len < MIN_WALLET_LEN {
            return Err(WalletRejection::TooShort { len });
        }
        if len > MAX_WALLET_LEN {
            return Err(WalletRejection::TooLong { len });
        }
        Ok(Self(candidate.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
