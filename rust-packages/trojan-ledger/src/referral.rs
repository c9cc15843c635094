//! Two-level referral accounting.
//!
//! A registration carrying `ref_<id>` credits `<id>` with one direct referral and, when `<id>`
//! was itself referred, credits that grand-referrer with one indirect referral. Credit is
//! written once, at registration time, and never propagates further up the chain.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::constants::{DEEP_LINK_PREFIX, REFERRAL_PREFIX};
use crate::user::{UserId, UserRecord};

/// Extracts the referrer id from a `ref_<id>` token. Anything else yields `None`.
pub fn parse_referral_token(token: &str) -> Option<&str> {
    token
        .trim()
        .strip_prefix(REFERRAL_PREFIX)
        .filter(|id| !id.is_empty())
}

pub fn referral_token(user_id: &str) -> String {
    format!("{REFERRAL_PREFIX}{user_id}")
}

/// `https://t.me/<bot>?start=ref_<id>`
pub fn referral_link(bot_username: &str, user_id: &str) -> String {
    format!(
        "{DEEP_LINK_PREFIX}/{}?start={}",
        bot_username.trim_start_matches('@'),
        referral_token(user_id)
    )
}

/// Counters credited by one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralCredit {
    /// Credited one direct referral; becomes the new user's `referred_by`.
    pub referrer: UserId,
    /// The referrer's own referrer, credited one indirect referral.
    pub grand_referrer: Option<UserId>,
}

/// Applies referral credit to the user map. Borrowed from the store for the duration of one
/// registration, so it always runs under the store's lock.
pub struct ReferralLedger<'a> {
    users: &'a mut BTreeMap<UserId, UserRecord>,
}

impl<'a> ReferralLedger<'a> {
    pub fn new(users: &'a mut BTreeMap<UserId, UserRecord>) -> Self {
        Self { users }
    }

    /// Resolves `token` for a user that is about to be inserted and credits the ancestors.
    ///
    /// Malformed tokens, unknown referrers and self-referrals resolve to `None` and change
    /// nothing. The caller must persist the map together with the new record.
    pub fn register_referral(
        &mut self,
        new_user_id: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<ReferralCredit> {
        let referrer_id = token.and_then(parse_referral_token)?;
        if referrer_id == new_user_id {
            return None;
        }

        let referrer = self.users.get_mut(referrer_id)?;
        referrer.direct_referrals = referrer.direct_referrals.saturating_add(1);
        referrer.touch(now);
        let referrer_id = referrer.id.clone();
        let grand_id = referrer.referred_by.clone();

        let grand_referrer = grand_id.and_then(|gid| {
            let grand = self.users.get_mut(&gid)?;
            grand.indirect_referrals = grand.indirect_referrals.saturating_add(1);
            grand.touch(now);
            Some(gid)
        });

        Some(ReferralCredit {
            referrer: referrer_id,
            grand_referrer,
        })
    }
}

/// Stored counters that disagree with the referral forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterMismatch {
    pub user_id: UserId,
    pub stored_direct: u64,
    pub expected_direct: u64,
    pub stored_indirect: u64,
    pub expected_indirect: u64,
}

/// Recomputes direct (children) and indirect (grandchildren) counts from `referred_by`.
pub fn audit_counters(users: &BTreeMap<UserId, UserRecord>) -> Vec<CounterMismatch> {
    let mut direct: HashMap<&str, u64> = HashMap::new();
    let mut indirect: HashMap<&str, u64> = HashMap::new();

    for user in users.values() {
        let Some(parent) = user.referred_by.as_deref() else {
            continue;
        };
        *direct.entry(parent).or_default() += 1;
        if let Some(grand) = users.get(parent).and_then(|p| p.referred_by.as_deref()) {
            *indirect.entry(grand).or_default() += 1;
        }
    }

    users
        .values()
        .filter_map(|user| {
            let expected_direct = direct.get(user.id.as_str()).copied().unwrap_or(0);
            let expected_indirect = indirect.get(user.id.as_str()).copied().unwrap_or(0);
            (user.direct_referrals != expected_direct
                || user.indirect_referrals != expected_indirect)
                .then(|| CounterMismatch {
                    user_id: user.id.clone(),
                    stored_direct: user.direct_referrals,
                    expected_direct,
                    stored_indirect: user.indirect_referrals,
                    expected_indirect,
                })
        })
        .collect()
}
