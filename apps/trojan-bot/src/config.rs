//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use trojan_ledger::{
    referral_link, AddressPool, AllocationPolicy, LedgerError, DEFAULT_BOT_USERNAME,
    DEFAULT_USER_DATA_FILE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("BOT_TOKEN environment variable is required")]
    MissingToken,

    #[error("invalid listen address `{0}` (check HOST/PORT)")]
    InvalidListenAddr(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub bot_username: String,
    pub data_file: PathBuf,
    pub policy: AllocationPolicy,
    pub pool: AddressPool,
    pub listen: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::MissingToken)?;
        let bot_username = get("BOT_USERNAME").unwrap_or_else(|| DEFAULT_BOT_USERNAME.into());
        let data_file = get("USER_DATA_FILE")
            .unwrap_or_else(|| DEFAULT_USER_DATA_FILE.into())
            .into();
        let policy = match get("ALLOCATION_POLICY") {
            Some(raw) => raw.parse()?,
            None => AllocationPolicy::default(),
        };
        let pool = match get("ADDRESS_POOL") {
            Some(raw) => AddressPool::parse(&raw)?,
            None => AddressPool::default(),
        };

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = get("PORT").unwrap_or_else(|| "8080".into());
        let raw_addr = format!("{host}:{port}");
        let listen = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(raw_addr))?;

        Ok(Self {
            bot_token: bot_token.trim().to_owned(),
            bot_username: bot_username.trim().to_owned(),
            data_file,
            policy,
            pool,
            listen,
        })
    }

    pub fn referral_link(&self, user_id: &str) -> String {
        referral_link(&self.bot_username, user_id)
    }
}
