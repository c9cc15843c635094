//! Trojan CLI - operator tooling for the bot's user snapshot.
//!
//! Run against the snapshot while the bot is stopped; the bot rewrites the whole file on every
//! mutation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use trojan_ledger::{
    backfill_snapshot, AddressAllocator, AddressPool, AllocationPolicy, LedgerStats, LoadOutcome,
    Snapshot, UserRecord, UserStore, DEFAULT_BOT_USERNAME, DEFAULT_USER_DATA_FILE,
};

#[derive(Parser)]
#[command(name = "trojan")]
#[command(about = "Trojan bot user ledger CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Snapshot file
    #[arg(short, long, global = true, env = "USER_DATA_FILE", default_value = DEFAULT_USER_DATA_FILE)]
    data_file: PathBuf,

    /// Deposit address pool as `label=address,...` (used for labels only)
    #[arg(long, global = true, env = "ADDRESS_POOL")]
    address_pool: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot summary
    Info,
    /// Print one user record as JSON
    User {
        /// Chat user id
        id: String,
    },
    /// Show address assignment and referral totals
    Stats {
        /// Number of top referrers to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Upgrade an older snapshot in place
    Migrate,
    /// Print a user's referral deep link
    Link {
        /// Chat user id
        id: String,
        /// Bot username used in the link
        #[arg(long, env = "BOT_USERNAME", default_value = DEFAULT_BOT_USERNAME)]
        bot_username: String,
    },
    /// Check stored referral counters against the referral tree
    Verify,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let pool = match cli.address_pool.as_deref() {
        Some(raw) => AddressPool::parse(raw).context("ADDRESS_POOL")?,
        None => AddressPool::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("Snapshot: {}", cli.data_file.display());
            let Some(snapshot) = read_snapshot(&cli.data_file)? else {
                println!("No snapshot on disk");
                return Ok(());
            };
            println!("Users: {}", snapshot.users.len());
            println!("Used addresses: {}", snapshot.used_addresses.len());
            match snapshot.last_updated {
                Some(at) => println!("Last updated: {}", at.to_rfc3339()),
                None => println!("Last updated: unknown"),
            }
        }
        Commands::User { id } => {
            let snapshot = require_snapshot(&cli.data_file)?;
            let Some(user) = snapshot.users.get(&id) else {
                bail!("user {id} not found");
            };
            println!("{}", serde_json::to_string_pretty(user)?);
        }
        Commands::Stats { top } => {
            let snapshot = require_snapshot(&cli.data_file)?;
            let stats = LedgerStats::collect(&snapshot.users, &snapshot.used_addresses);
            println!("Users: {} ({} referred)", stats.users, stats.referred_users);
            println!(
                "Referrals: {} direct, {} indirect",
                stats.direct_referrals, stats.indirect_referrals
            );
            println!("Deposit addresses:");
            for (address, count) in &stats.by_address {
                let label = pool.label_of(address).unwrap_or("unlisted");
                println!("  {label:<10} {address} {count}");
            }
            let leaders = top_referrers(snapshot.users.values(), top);
            if !leaders.is_empty() {
                println!("Top referrers:");
                for user in leaders {
                    println!(
                        "  {} ({}) direct={} indirect={}",
                        user.id, user.display_name, user.direct_referrals, user.indirect_referrals
                    );
                }
            }
        }
        Commands::Migrate => {
            let allocator = AddressAllocator::new(pool, AllocationPolicy::default());
            let mut store = UserStore::new(&cli.data_file, allocator);
            let report = store.load();
            match report.outcome {
                LoadOutcome::Fresh => println!("No snapshot on disk, nothing to migrate"),
                LoadOutcome::Recovered => {
                    bail!("snapshot was unreadable and has been moved aside")
                }
                LoadOutcome::Loaded if store.is_dirty() => {
                    bail!("upgraded snapshot could not be written back")
                }
                LoadOutcome::Loaded => println!(
                    "Migrated {} of {} records",
                    report.backfilled, report.users
                ),
            }
        }
        Commands::Link { id, bot_username } => {
            println!("{}", trojan_ledger::referral_link(&bot_username, &id));
        }
        Commands::Verify => {
            let snapshot = require_snapshot(&cli.data_file)?;
            let mismatches = trojan_ledger::audit_counters(&snapshot.users);
            if mismatches.is_empty() {
                println!("OK: {} users, counters consistent", snapshot.users.len());
                return Ok(());
            }
            for m in &mismatches {
                println!(
                    "{}: direct {} (expected {}), indirect {} (expected {})",
                    m.user_id, m.stored_direct, m.expected_direct, m.stored_indirect,
                    m.expected_indirect
                );
            }
            bail!("{} users with inconsistent referral counters", mismatches.len());
        }
    }

    Ok(())
}

/// Reads and upgrades the snapshot in memory only; the file is left untouched.
fn read_snapshot(path: &Path) -> anyhow::Result<Option<Snapshot>> {
    let snapshot = Snapshot::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(snapshot.map(|mut snapshot| {
        backfill_snapshot(&mut snapshot);
        snapshot
    }))
}

fn require_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    read_snapshot(path)?.with_context(|| format!("no snapshot at {}", path.display()))
}

/// Users with at least one referral, most referrals first.
fn top_referrers<'a>(
    users: impl Iterator<Item = &'a UserRecord>,
    limit: usize,
) -> Vec<&'a UserRecord> {
    let mut ranked: Vec<_> = users.filter(|u| u.total_referred() > 0).collect();
    ranked.sort_by(|a, b| {
        b.total_referred()
            .cmp(&a.total_referred())
            .then_with(|| b.direct_referrals.cmp(&a.direct_referrals))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clap::CommandFactory;

    fn user(id: &str, direct: u64, indirect: u64) -> UserRecord {
        let mut user = UserRecord::new(id, id, "addr", None, Utc::now());
        user.direct_referrals = direct;
        user.indirect_referrals = indirect;
        user
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["trojan", "--data-file", "x.json", "stats", "--top", "3"])
            .unwrap();
        assert_eq!(cli.data_file, PathBuf::from("x.json"));
        assert!(matches!(cli.command, Commands::Stats { top: 3 }));

        let cli = Cli::try_parse_from(["trojan", "link", "42", "--bot-username", "b"]).unwrap();
        match cli.command {
            Commands::Link { id, bot_username } => {
                assert_eq!(id, "42");
                assert_eq!(bot_username, "b");
            }
            _ => panic!("expected link"),
        }
    }

    #[test]
    fn test_top_referrers_ordering() {
        let users = [
            user("a", 1, 0),
            user("b", 2, 3),
            user("c", 0, 0),
            user("d", 4, 1),
            user("e", 1, 0),
        ];
        let ids: Vec<_> = top_referrers(users.iter(), 10)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, ["d", "b", "a", "e"]);
        assert_eq!(top_referrers(users.iter(), 1).len(), 1);
    }

    #[test]
    fn test_read_snapshot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("users.json")).unwrap().is_none());
        assert!(require_snapshot(&dir.path().join("users.json")).is_err());
    }

    #[test]
    fn test_read_snapshot_leaves_legacy_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let legacy = r#"{"users":{"7":{"id":"7","username":"x","depositAddress":"D7"}}}"#;
        std::fs::write(&path, legacy).unwrap();

        let snapshot = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(snapshot.users["7"].rewards_wallet, "D7");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), legacy);
    }
}
