//! User records as they appear in the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Stable identifier assigned by the chat platform, in string form.
pub type UserId = String;

/// One registered user.
///
/// Records are only ever handed out as copies; every mutation goes through
/// [`UserStore`](crate::UserStore) so that `deposit_address` and `referred_by` stay
/// write-once and the referral counters are only touched by the ledger.
///
/// The aliases accept the snake_case field names written by earlier revisions of the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, alias = "telegram_id")]
    pub id: UserId,

    #[serde(default, alias = "username")]
    pub display_name: String,

    #[serde(alias = "team_address")]
    pub deposit_address: String,

    /// Empty only on records read from snapshots that predate the field.
    #[serde(default, alias = "rewards_wallet")]
    pub rewards_wallet: String,

    #[serde(default, alias = "referred_by")]
    pub referred_by: Option<UserId>,

    #[serde(default, alias = "direct_referrals")]
    pub direct_referrals: u64,

    #[serde(default, alias = "indirect_referrals")]
    pub indirect_referrals: u64,

    #[serde(default, alias = "sol_balance")]
    pub sol_balance: f64,

    #[serde(default, alias = "referral_rewards")]
    pub referral_rewards: f64,

    #[serde(default, alias = "cashback_rewards")]
    pub cashback_rewards: f64,

    #[serde(default, alias = "total_paid_rewards")]
    pub total_paid_rewards: f64,

    #[serde(default = "Utc::now", alias = "created_at", with = "timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now", alias = "last_updated", with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

impl UserRecord {
    /// Fresh record with zeroed accumulators; the rewards wallet starts at the deposit address.
    pub fn new(
        id: impl Into<UserId>,
        display_name: impl Into<String>,
        deposit_address: impl Into<String>,
        referred_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        let deposit_address = deposit_address.into();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            rewards_wallet: deposit_address.clone(),
            deposit_address,
            referred_by,
            direct_referrals: 0,
            indirect_referrals: 0,
            sol_balance: 0.0,
            referral_rewards: 0.0,
            cashback_rewards: 0.0,
            total_paid_rewards: 0.0,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }

    pub fn total_referred(&self) -> u64 {
        self.direct_referrals.saturating_add(self.indirect_referrals)
    }

    pub fn total_unpaid(&self) -> f64 {
        self.referral_rewards + self.cashback_rewards
    }
}
