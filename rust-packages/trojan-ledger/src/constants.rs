//! Constants shared by the ledger, the bot and the CLI.

// =============================================================================
// REFERRALS
// =============================================================================

/// Prefix of a referral token: `ref_<user id>`.
pub const REFERRAL_PREFIX: &str = "ref_";

/// Deep-link prefix used to build referral links.
pub const DEEP_LINK_PREFIX: &str = "https://t.me";

/// Bot handle used in referral links when `BOT_USERNAME` is unset.
pub const DEFAULT_BOT_USERNAME: &str = "Thanatos_TrojanBot";

// =============================================================================
// WALLETS
// =============================================================================

/// Shortest accepted rewards wallet (inclusive).
pub const MIN_WALLET_LEN: usize = 32;

/// Longest accepted rewards wallet (inclusive).
pub const MAX_WALLET_LEN: usize = 44;

// =============================================================================
// STORAGE
// =============================================================================

/// Snapshot file used when `USER_DATA_FILE` is unset.
pub const DEFAULT_USER_DATA_FILE: &str = "users.json";

/// Label given to users that expose neither a username nor a first name.
pub const FALLBACK_DISPLAY_NAME: &str = "User";

// =============================================================================
// ADDRESS POOL
// =============================================================================

/// Built-in deposit address pool as `(label, address)` pairs.
pub const DEFAULT_POOL: [(&str, &str); 2] = [
    ("Team 1", "8rMj1dMR6tp428j7DaGUn6TpLi89fpdYNQEwqUzyFCe3"),
    ("Team 2", "EATAgjcHTZxCaudus4VvktLRfxYjtHMbNLSnyDJYXtnt"),
];
