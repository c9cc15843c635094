//! Authoritative map of user records and its snapshot persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, Result};
use crate::pool::AddressAllocator;
use crate::referral::{audit_counters, CounterMismatch, ReferralCredit, ReferralLedger};
use crate::snapshot::{backfill_snapshot, Snapshot};
use crate::user::{UserId, UserRecord};
use crate::wallet::WalletAddress;

/// Field-level changes a caller may apply to an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMutation {
    SetRewardsWallet(WalletAddress),
    SetDisplayName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub user: UserRecord,
    pub created: bool,
    pub credit: Option<ReferralCredit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No snapshot on disk.
    Fresh,
    Loaded,
    /// Unreadable snapshot; the store started empty.
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub outcome: LoadOutcome,
    pub users: usize,
    /// Records upgraded by the migration pass.
    pub backfilled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub users: usize,
    pub referred_users: usize,
    pub direct_referrals: u64,
    pub indirect_referrals: u64,
    /// Users per deposit address.
    pub by_address: BTreeMap<String, usize>,
    pub used_addresses: usize,
}

impl LedgerStats {
    pub fn collect(
        users: &BTreeMap<UserId, UserRecord>,
        used_addresses: &BTreeSet<String>,
    ) -> Self {
        let mut stats = LedgerStats {
            users: users.len(),
            used_addresses: used_addresses.len(),
            ..LedgerStats::default()
        };
        for user in users.values() {
            if user.referred_by.is_some() {
                stats.referred_users += 1;
            }
            stats.direct_referrals += user.direct_referrals;
            stats.indirect_referrals += user.indirect_referrals;
            *stats
                .by_address
                .entry(user.deposit_address.clone())
                .or_default() += 1;
        }
        stats
    }
}

pub struct UserStore {
    path: PathBuf,
    users: BTreeMap<UserId, UserRecord>,
    used_addresses: BTreeSet<String>,
    allocator: AddressAllocator,
    last_saved: Option<DateTime<Utc>>,
    dirty: bool,
    /// The file on disk could be neither read nor moved aside; it must not be overwritten.
    preserve: bool,
}

impl UserStore {
    /// Empty store bound to `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>, allocator: AddressAllocator) -> Self {
        Self {
            path: path.into(),
            users: BTreeMap::new(),
            used_addresses: BTreeSet::new(),
            allocator,
            last_saved: None,
            dirty: false,
            preserve: false,
        }
    }

    /// Constructs the store and loads whatever snapshot is on disk.
    pub fn open(path: impl Into<PathBuf>, allocator: AddressAllocator) -> Self {
        let mut store = Self::new(path, allocator);
        store.load();
        store
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Replaces in-memory state with the snapshot on disk.
    ///
    /// Never fails: a missing file starts an empty store, an unreadable one is moved aside and
    /// the store starts empty with a warning. Older snapshots are upgraded and re-saved.
    ///
    /// If an unreadable file cannot be moved aside either, the store stays dirty and refuses
    /// to write over it until the next successful load.
    pub fn load(&mut self) -> LoadReport {
        self.users.clear();
        self.used_addresses.clear();
        self.last_saved = None;
        self.dirty = false;
        self.preserve = false;

        let mut snapshot = match Snapshot::read(&self.path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(path = %self.path.display(), "No existing user data found, starting fresh");
                return self.report(LoadOutcome::Fresh, 0);
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Error loading users, starting with an empty store");
                if !self.quarantine() {
                    self.preserve = true;
                    self.dirty = true;
                }
                return self.report(LoadOutcome::Recovered, 0);
            }
        };

        let backfilled = backfill_snapshot(&mut snapshot);
        self.users = snapshot.users;
        self.used_addresses = snapshot.used_addresses;
        self.last_saved = snapshot.last_updated;
        info!(users = self.users.len(), path = %self.path.display(), "Loaded users from storage");

        if backfilled > 0 {
            info!(records = backfilled, "Backfilled rewards wallets from deposit addresses");
            self.persist();
        }
        self.report(LoadOutcome::Loaded, backfilled)
    }

    /// Rewrites the whole snapshot atomically.
    pub fn save(&mut self) -> Result<()> {
        if self.preserve {
            return Err(LedgerError::Preserved {
                path: self.path.clone(),
            });
        }
        let now = Utc::now();
        let snapshot = Snapshot {
            users: self.users.clone(),
            used_addresses: self.used_addresses.clone(),
            last_updated: Some(now),
        };
        snapshot.write_atomic(&self.path)?;
        self.last_saved = Some(now);
        self.dirty = false;
        debug!(users = self.users.len(), path = %self.path.display(), "Saved users to storage");
        Ok(())
    }

    /// Saves after a mutation. Failure keeps the in-memory state and latches `dirty` until the
    /// next successful save.
    fn persist(&mut self) {
        if let Err(err) = self.save() {
            self.dirty = true;
            metrics::counter!("snapshot_save_failures_total").increment(1);
            error!(path = %self.path.display(), error = %err, "Error saving users");
        }
    }

    /// Moves the unreadable snapshot to `<file>.corrupt-<unix-ts>`, falling back to a copy.
    /// Returns whether a backup now exists.
    fn quarantine(&self) -> bool {
        let backup = PathBuf::from(format!(
            "{}.corrupt-{}",
            self.path.display(),
            Utc::now().timestamp()
        ));
        let err = match fs::rename(&self.path, &backup) {
            Ok(()) => {
                warn!(backup = %backup.display(), "Moved unreadable snapshot aside");
                return true;
            }
            Err(err) => err,
        };
        match fs::copy(&self.path, &backup) {
            Ok(_) => {
                warn!(backup = %backup.display(), rename_error = %err, "Copied unreadable snapshot aside");
                true
            }
            Err(copy_err) => {
                error!(
                    path = %self.path.display(),
                    rename_error = %err,
                    copy_error = %copy_err,
                    "Could not back up unreadable snapshot, refusing to overwrite it"
                );
                false
            }
        }
    }

    fn report(&self, outcome: LoadOutcome, backfilled: usize) -> LoadReport {
        metrics::gauge!("users_total").set(self.users.len() as f64);
        LoadReport {
            outcome,
            users: self.users.len(),
            backfilled,
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    pub fn get(&self, user_id: &str) -> Option<&UserRecord> {
        self.users.get(user_id)
    }

    /// Returns the existing record, or registers a new user: assigns a deposit address,
    /// resolves the referral token, inserts the record and saves the snapshot.
    ///
    /// The referrer's counters and the new record land in the same snapshot write.
    pub fn get_or_create(
        &mut self,
        user_id: &str,
        display_name: &str,
        referral_token: Option<&str>,
    ) -> Registration {
        if let Some(user) = self.users.get(user_id) {
            return Registration {
                user: user.clone(),
                created: false,
                credit: None,
            };
        }

        let now = Utc::now();
        let deposit_address = self
            .allocator
            .assign(self.users.len(), &mut self.used_addresses);
        let credit =
            ReferralLedger::new(&mut self.users).register_referral(user_id, referral_token, now);
        let user = UserRecord::new(
            user_id,
            display_name,
            deposit_address,
            credit.as_ref().map(|c| c.referrer.clone()),
            now,
        );
        self.users.insert(user.id.clone(), user.clone());
        self.persist();

        metrics::counter!("users_registered_total").increment(1);
        metrics::gauge!("users_total").set(self.users.len() as f64);
        if let Some(credit) = &credit {
            metrics::counter!("referrals_direct_total").increment(1);
            if credit.grand_referrer.is_some() {
                metrics::counter!("referrals_indirect_total").increment(1);
            }
            info!(
                user = %user.id,
                referrer = %credit.referrer,
                grand_referrer = ?credit.grand_referrer,
                "Referral credited"
            );
        }
        info!(
            user = %user.id,
            name = %user.display_name,
            deposit_address = %user.deposit_address,
            "New user registered"
        );

        Registration {
            user,
            created: true,
            credit,
        }
    }

    /// Applies `mutation`, touches `last_updated` and saves. `None` if the user is unknown.
    pub fn update(&mut self, user_id: &str, mutation: UserMutation) -> Option<UserRecord> {
        let user = self.users.get_mut(user_id)?;
        match mutation {
            UserMutation::SetRewardsWallet(wallet) => user.rewards_wallet = wallet.into_inner(),
            UserMutation::SetDisplayName(name) => user.display_name = name,
        }
        user.touch(Utc::now());
        let user = user.clone();
        self.persist();
        Some(user)
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn users(&self) -> &BTreeMap<UserId, UserRecord> {
        &self.users
    }

    pub fn used_addresses(&self) -> &BTreeSet<String> {
        &self.used_addresses
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// True while the most recent snapshot write failed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats::collect(&self.users, &self.used_addresses)
    }

    pub fn audit(&self) -> Vec<CounterMismatch> {
        audit_counters(&self.users)
    }
}
