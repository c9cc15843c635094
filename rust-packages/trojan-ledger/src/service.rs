//! Event-level facade used by the chat front end.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::pool::AddressAllocator;
use crate::session::{SessionState, SessionStateMachine};
use crate::store::{LedgerStats, Registration, UserMutation, UserStore};
use crate::user::UserRecord;
use crate::wallet::{WalletAddress, WalletRejection};

/// What a free-text message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum FreeTextOutcome {
    WalletAccepted(UserRecord),
    WalletRejected(WalletRejection),
    /// No prompt was outstanding.
    Unrecognized,
}

/// Cloneable handle over the store and the session machine.
///
/// Every store operation runs under one lock, so concurrent registrations naming the same
/// referrer cannot lose an increment and snapshot writes never interleave.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<Mutex<UserStore>>,
    sessions: Arc<Mutex<SessionStateMachine>>,
}

impl LedgerService {
    pub fn new(store: UserStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            sessions: Arc::new(Mutex::new(SessionStateMachine::new())),
        }
    }

    /// Opens the snapshot at `path` and wraps the loaded store.
    pub fn open(path: impl Into<PathBuf>, allocator: AddressAllocator) -> Self {
        Self::new(UserStore::open(path, allocator))
    }

    /// `/start [ref_<id>]`.
    pub fn on_start(
        &self,
        user_id: &str,
        display_name: &str,
        referral_token: Option<&str>,
    ) -> Registration {
        let mut store = self.store.lock();
        let mut registration = store.get_or_create(user_id, display_name, referral_token);
        if !registration.created
            && !display_name.is_empty()
            && registration.user.display_name != display_name
        {
            if let Some(user) =
                store.update(user_id, UserMutation::SetDisplayName(display_name.to_owned()))
            {
                registration.user = user;
            }
        }
        registration
    }

    /// Opens a wallet prompt. `None` for users that never registered; their session is left
    /// untouched.
    pub fn on_set_rewards_wallet_requested(&self, user_id: &str) -> Option<UserRecord> {
        let user = self.store.lock().get(user_id).cloned()?;
        self.sessions.lock().request_wallet_change(user_id);
        Some(user)
    }

    pub fn on_free_text(&self, user_id: &str, text: &str) -> FreeTextOutcome {
        let state = self.sessions.lock().take(user_id);
        match state {
            SessionState::Idle => FreeTextOutcome::Unrecognized,
            SessionState::AwaitingWalletInput => self.apply_wallet(user_id, text),
        }
    }

    fn apply_wallet(&self, user_id: &str, text: &str) -> FreeTextOutcome {
        let wallet = match WalletAddress::parse(text) {
            Ok(wallet) => wallet,
            Err(rejection) => {
                metrics::counter!("wallet_rejections_total").increment(1);
                info!(user = %user_id, reason = %rejection, "Rewards wallet rejected");
                return FreeTextOutcome::WalletRejected(rejection);
            }
        };
        let updated = self
            .store
            .lock()
            .update(user_id, UserMutation::SetRewardsWallet(wallet));
        match updated {
            Some(user) => {
                metrics::counter!("wallet_updates_total").increment(1);
                info!(user = %user_id, wallet = %user.rewards_wallet, "Rewards wallet updated");
                FreeTextOutcome::WalletAccepted(user)
            }
            None => FreeTextOutcome::Unrecognized,
        }
    }

    pub fn session_state(&self, user_id: &str) -> SessionState {
        self.sessions.lock().state(user_id)
    }

    pub fn user(&self, user_id: &str) -> Option<UserRecord> {
        self.store.lock().get(user_id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.store.lock().len()
    }

    pub fn stats(&self) -> LedgerStats {
        self.store.lock().stats()
    }

    /// Forces a snapshot write; used on shutdown.
    pub fn flush(&self) -> Result<()> {
        self.store.lock().save()
    }

    pub fn is_dirty(&self) -> bool {
        self.store.lock().is_dirty()
    }
}
