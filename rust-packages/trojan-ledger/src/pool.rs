//! Deposit address pool and the allocator that hands addresses out.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::DEFAULT_POOL;
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub label: String,
    pub address: String,
}

/// Fixed, ordered list of deposit addresses. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    entries: Vec<PoolEntry>,
}

impl AddressPool {
    pub fn new(entries: Vec<PoolEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(LedgerError::InvalidPool("pool has no addresses".into()));
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.label.trim().is_empty() {
                return Err(LedgerError::InvalidPool(format!(
                    "address {} has an empty label",
                    entry.address
                )));
            }
            if entry.address.trim().is_empty() {
                return Err(LedgerError::InvalidPool(format!(
                    "entry {} has an empty address",
                    entry.label
                )));
            }
            if !seen.insert(entry.address.as_str()) {
                return Err(LedgerError::InvalidPool(format!(
                    "address {} is listed twice",
                    entry.address
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Parses `label=address` pairs separated by commas, e.g.
    /// `Team 1=8rMj...,Team 2=EATA...`.
    pub fn parse(spec: &str) -> Result<Self> {
        let entries = spec
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (label, address) = pair.split_once('=').ok_or_else(|| {
                    LedgerError::InvalidPool(format!("`{pair}` is not a label=address pair"))
                })?;
                Ok(PoolEntry {
                    label: label.trim().to_owned(),
                    address: address.trim().to_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn label_of(&self, address: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.label.as_str())
    }
}

impl Default for AddressPool {
    fn default() -> Self {
        Self {
            entries: DEFAULT_POOL
                .iter()
                .map(|(label, address)| PoolEntry {
                    label: (*label).to_owned(),
                    address: (*address).to_owned(),
                })
                .collect(),
        }
    }
}

/// How a new user's deposit address is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// `pool[existing_users % pool.len()]`. Deterministic round robin.
    #[default]
    Alternate,
    /// Random among pool entries never handed out, then random among all of them once every
    /// entry has been used. Kept for parity with earlier deployments; distribution drifts.
    LeastUsedRandom,
}

impl FromStr for AllocationPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alternate" | "alternating" | "round-robin" => Ok(Self::Alternate),
            "random" | "least-used-random" => Ok(Self::LeastUsedRandom),
            other => Err(LedgerError::InvalidPolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alternate => f.write_str("alternate"),
            Self::LeastUsedRandom => f.write_str("random"),
        }
    }
}

/// Picks the deposit address for each new user.
#[derive(Debug)]
pub struct AddressAllocator {
    pool: AddressPool,
    policy: AllocationPolicy,
    rng: StdRng,
}

impl AddressAllocator {
    pub fn new(pool: AddressPool, policy: AllocationPolicy) -> Self {
        Self::with_rng(pool, policy, StdRng::from_entropy())
    }

    pub fn with_rng(pool: AddressPool, policy: AllocationPolicy, rng: StdRng) -> Self {
        Self { pool, policy, rng }
    }

    pub fn pool(&self) -> &AddressPool {
        &self.pool
    }

    /// Chooses an address for the next user and records it in `used`.
    ///
    /// `existing_users` is the number of users already in the store, before the new one.
    pub fn assign(&mut self, existing_users: usize, used: &mut BTreeSet<String>) -> String {
        let entries = self.pool.entries();
        let index = match self.policy {
            AllocationPolicy::Alternate => existing_users % entries.len(),
            AllocationPolicy::LeastUsedRandom => {
                let unused: Vec<usize> = (0..entries.len())
                    .filter(|&i| !used.contains(&entries[i].address))
                    .collect();
                if unused.is_empty() {
                    self.rng.gen_range(0..entries.len())
                } else {
                    unused[self.rng.gen_range(0..unused.len())]
                }
            }
        };
        let address = entries[index].address.clone();
        used.insert(address.clone());
        address
    }
}
