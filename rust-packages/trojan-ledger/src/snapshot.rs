//! On-disk snapshot of the whole store.
//!
//! ```json
//! {
//!   "users": { "<id>": { "id": "...", "depositAddress": "...", ... } },
//!   "usedAddresses": ["..."],
//!   "lastUpdated": "2024-05-01T10:20:30.123456Z"
//! }
//! ```
//!
//! Writes go to a temp file in the same directory which is then renamed over the target, so a
//! crash mid-write leaves either the old snapshot or the new one, never a truncated file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{LedgerError, Result};
use crate::timestamp;
use crate::user::{UserId, UserRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserRecord>,

    #[serde(default, alias = "used_addresses")]
    pub used_addresses: BTreeSet<String>,

    #[serde(default, alias = "last_updated", with = "timestamp::option")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(LedgerError::io(dir))?;

        let mut body = serde_json::to_vec_pretty(self)?;
        body.push(b'\n');

        let mut tmp = NamedTempFile::new_in(dir).map_err(LedgerError::io(dir))?;
        tmp.write_all(&body).map_err(LedgerError::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(LedgerError::io(tmp.path()))?;
        tmp.persist(path).map_err(|err| LedgerError::Persist {
            path: path.to_path_buf(),
            source: err.error,
        })?;
        Ok(())
    }
}

/// Upgrades records written before `rewardsWallet` existed, and older files whose used-address
/// set or record ids were never filled in. Returns how many records changed.
///
/// Safe to run on an already upgraded snapshot: it then changes nothing and returns 0.
pub fn backfill_snapshot(snapshot: &mut Snapshot) -> usize {
    let mut changed = 0;
    for (key, user) in snapshot.users.iter_mut() {
        let mut touched = false;
        if user.id.is_empty() {
            user.id = key.clone();
            touched = true;
        }
        if user.rewards_wallet.is_empty() && !user.deposit_address.is_empty() {
            user.rewards_wallet = user.deposit_address.clone();
            touched = true;
        }
        if touched {
            changed += 1;
        }
    }
    snapshot.used_addresses.extend(
        snapshot
            .users
            .values()
            .filter(|u| !u.deposit_address.is_empty())
            .map(|u| u.deposit_address.clone()),
    );
    changed
}
