//! # trojan-ledger
//!
//! User and referral ledger behind the Trojan chat bot.
//!
//! Every user who sends `/start` gets a record with a deposit address drawn from a small
//! rotating pool. Registrations that arrive with a `ref_<id>` token credit the referrer one
//! direct referral and the referrer's own referrer one indirect referral. All state lives in a
//! single JSON snapshot that is rewritten atomically on every mutation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trojan_ledger::{AddressAllocator, AddressPool, AllocationPolicy, LedgerService};
//!
//! let allocator = AddressAllocator::new(AddressPool::default(), AllocationPolicy::Alternate);
//! let service = LedgerService::open("users.json", allocator);
//!
//! let alice = service.on_start("1001", "alice", None);
//! let bob = service.on_start("1002", "bob", Some("ref_1001"));
//! assert_eq!(bob.user.referred_by.as_deref(), Some("1001"));
//! # let _ = alice;
//! ```

pub mod constants;
pub mod error;
pub mod pool;
pub mod referral;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod store;
mod timestamp;
pub mod user;
pub mod wallet;

pub use constants::*;
pub use error::{LedgerError, Result};
pub use pool::{AddressAllocator, AddressPool, AllocationPolicy, PoolEntry};
pub use referral::{
    audit_counters, parse_referral_token, referral_link, referral_token, CounterMismatch,
    ReferralCredit, ReferralLedger,
};
pub use service::{FreeTextOutcome, LedgerService};
pub use session::{SessionState, SessionStateMachine};
pub use snapshot::{backfill_snapshot, Snapshot};
pub use store::{LedgerStats, LoadOutcome, LoadReport, Registration, UserMutation, UserStore};
pub use user::{UserId, UserRecord};
pub use wallet::{WalletAddress, WalletRejection};
