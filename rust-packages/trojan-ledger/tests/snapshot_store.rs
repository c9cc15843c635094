//! Snapshot persistence: round trips, recovery and the rewards-wallet migration.
//!
//! Run with: `cargo test --package trojan-ledger --test snapshot_store`

use std::fs;
use std::path::Path;

use trojan_ledger::{
    AddressAllocator, AddressPool, AllocationPolicy, LoadOutcome, Snapshot, UserMutation,
    UserStore, WalletAddress,
};

const TEAM_1: &str = "8rMj1dMR6tp428j7DaGUn6TpLi89fpdYNQEwqUzyFCe3";
const TEAM_2: &str = "EATAgjcHTZxCaudus4VvktLRfxYjtHMbNLSnyDJYXtnt";

fn allocator() -> AddressAllocator {
    AddressAllocator::new(AddressPool::default(), AllocationPolicy::Alternate)
}

fn open(path: &Path) -> UserStore {
    UserStore::open(path, allocator())
}

/// A file in the format written by the earliest persisted revision of the bot.
fn write_legacy_file(path: &Path) {
    let raw = serde_json::json!({
        "users": {
            "100": {
                "telegram_id": "100",
                "username": "alice",
                "team_address": TEAM_1,
                "referred_by": null,
                "direct_referrals": 1,
                "indirect_referrals": 0,
                "sol_balance": 0.0,
                "referral_rewards": 0.0,
                "cashback_rewards": 0.0,
                "total_paid_rewards": 0.0,
                "created_at": "2024-05-01 10:20:30.123456",
                "last_updated": "2024-05-01 10:20:30.123456"
            },
            "200": {
                "telegram_id": "200",
                "username": "bob",
                "team_address": TEAM_2,
                "referred_by": "100",
                "direct_referrals": 0,
                "indirect_referrals": 0,
                "sol_balance": 0.0,
                "referral_rewards": 0.0,
                "cashback_rewards": 0.0,
                "total_paid_rewards": 0.0,
                "created_at": "2024-05-01 10:21:00.000001",
                "last_updated": "2024-05-01 10:21:00.000001"
            }
        },
        "used_addresses": [TEAM_1, TEAM_2],
        "last_updated": "2024-05-01T10:21:00.000001"
    });
    fs::write(path, serde_json::to_vec_pretty(&raw).unwrap()).unwrap();
}

// =========================================================================
// LOAD
// =========================================================================

#[test]
fn test_missing_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = UserStore::new(dir.path().join("users.json"), allocator());
    let report = store.load();
    assert_eq!(report.outcome, LoadOutcome::Fresh);
    assert!(store.is_empty());
    assert!(!dir.path().join("users.json").exists());
}

#[test]
fn test_corrupt_file_recovers_empty_and_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    fs::write(&path, b"{\"users\": {\"1\": ").unwrap();

    let mut store = UserStore::new(&path, allocator());
    let report = store.load();
    assert_eq!(report.outcome, LoadOutcome::Recovered);
    assert!(store.is_empty());

    let backups: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .collect();
    assert_eq!(backups.len(), 1);

    // The store keeps working and writes a fresh snapshot.
    store.get_or_create("1", "alice", None);
    assert_eq!(Snapshot::read(&path).unwrap().unwrap().users.len(), 1);
}

#[test]
fn test_unreadable_snapshot_is_moved_aside_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    // Reading a directory fails with an I/O error rather than a parse error.
    let path = dir.path().join("users.json");
    fs::create_dir(&path).unwrap();
    fs::write(path.join("marker"), b"keep me").unwrap();

    let mut store = UserStore::new(&path, allocator());
    assert_eq!(store.load().outcome, LoadOutcome::Recovered);
    assert!(!store.is_dirty());

    let backup = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .expect("backup created");
    assert_eq!(fs::read(backup.path().join("marker")).unwrap(), b"keep me");

    store.get_or_create("new", "carol", None);
    assert_eq!(Snapshot::read(&path).unwrap().unwrap().users.len(), 1);
    assert!(backup.path().join("marker").exists());
}

#[test]
fn test_snapshot_that_cannot_be_backed_up_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    // The parent is a regular file: the snapshot can be neither read nor renamed.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"original").unwrap();
    let path = blocker.join("users.json");

    let mut store = UserStore::new(&path, allocator());
    assert_eq!(store.load().outcome, LoadOutcome::Recovered);
    assert!(store.is_dirty());

    let reg = store.get_or_create("1", "alice", None);
    assert!(reg.created);
    assert!(store.get("1").is_some());
    assert!(store.is_dirty());
    assert!(store.save().is_err());
    assert_eq!(fs::read(&blocker).unwrap(), b"original");
}

// =========================================================================
// ROUND TRIP
// =========================================================================

#[test]
fn test_save_then_load_reproduces_user_map() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    let mut store = open(&path);
    store.get_or_create("1", "alice", None);
    store.get_or_create("2", "bob", Some("ref_1"));
    store.get_or_create("3", "carol", Some("ref_2"));
    let wallet = WalletAddress::parse(&"W".repeat(40)).unwrap();
    store.update("2", UserMutation::SetRewardsWallet(wallet));
    store.save().unwrap();

    let reloaded = open(&path);
    assert_eq!(reloaded.users(), store.users());
    assert_eq!(reloaded.used_addresses(), store.used_addresses());
    assert_eq!(reloaded.last_saved(), store.last_saved());
}

#[test]
fn test_fractional_accumulators_round_trip_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    let mut store = open(&path);
    store.get_or_create("1", "alice", None);
    let mut snapshot = Snapshot::read(&path).unwrap().unwrap();
    {
        let user = snapshot.users.get_mut("1").unwrap();
        user.sol_balance = 0.1 + 0.2;
        user.referral_rewards = 1.0 / 3.0;
        user.cashback_rewards = 0.005;
        user.total_paid_rewards = 123_456.789_012_345;
    }
    snapshot.write_atomic(&path).unwrap();

    let reloaded = open(&path);
    let user = reloaded.get("1").unwrap();
    assert_eq!(user.sol_balance, 0.1 + 0.2);
    assert_eq!(user.referral_rewards, 1.0 / 3.0);
    assert_eq!(user.cashback_rewards, 0.005);
    assert_eq!(user.total_paid_rewards, 123_456.789_012_345);
}

#[test]
fn test_snapshot_uses_documented_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    open(&path).get_or_create("1", "alice", None);

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(json["users"]["1"]["depositAddress"].is_string());
    assert!(json["users"]["1"]["rewardsWallet"].is_string());
    assert!(json["usedAddresses"].is_array());
    assert!(json["lastUpdated"].is_string());
}

// =========================================================================
// MIGRATION
// =========================================================================

#[test]
fn test_legacy_file_is_backfilled_and_resaved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    write_legacy_file(&path);

    let mut store = UserStore::new(&path, allocator());
    let report = store.load();
    assert_eq!(report.outcome, LoadOutcome::Loaded);
    assert_eq!(report.backfilled, 2);
    assert_eq!(store.get("100").unwrap().rewards_wallet, TEAM_1);
    assert_eq!(store.get("200").unwrap().display_name, "bob");
    assert_eq!(store.get("200").unwrap().referred_by.as_deref(), Some("100"));

    let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["users"]["200"]["rewardsWallet"], TEAM_2);
    assert!(on_disk["users"]["200"].get("team_address").is_none());
}

#[test]
fn test_migration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    write_legacy_file(&path);

    let first = open(&path);
    let after_first = fs::read(&path).unwrap();

    let mut second = UserStore::new(&path, allocator());
    let report = second.load();
    assert_eq!(report.backfilled, 0);
    assert_eq!(second.users(), first.users());
    assert_eq!(fs::read(&path).unwrap(), after_first, "no rewrite on a migrated file");
}

#[test]
fn test_migration_keeps_explicit_wallets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let mut store = open(&path);
    store.get_or_create("1", "alice", None);
    let wallet = WalletAddress::parse(&"Z".repeat(44)).unwrap();
    store.update("1", UserMutation::SetRewardsWallet(wallet));

    let reloaded = open(&path);
    assert_eq!(reloaded.get("1").unwrap().rewards_wallet, "Z".repeat(44));
}

// =========================================================================
// UPDATE / SAVE FAILURES
// =========================================================================

#[test]
fn test_update_touches_last_updated_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let mut store = open(&path);
    let before = store.get_or_create("1", "alice", None).user;

    let after = store
        .update("1", UserMutation::SetDisplayName("alice2".into()))
        .unwrap();
    assert!(after.last_updated >= before.last_updated);
    assert_eq!(after.deposit_address, before.deposit_address);
    assert_eq!(open(&path).get("1").unwrap().display_name, "alice2");
}

#[test]
fn test_update_unknown_user_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir.path().join("users.json"));
    assert!(store
        .update("ghost", UserMutation::SetDisplayName("x".into()))
        .is_none());
    assert!(store.is_empty());
}

#[test]
fn test_failed_save_keeps_memory_and_marks_dirty() {
    let dir = tempfile::tempdir().unwrap();
    // The snapshot path is a directory, so the rename over it fails.
    let path = dir.path().join("occupied");
    fs::create_dir(&path).unwrap();

    let mut store = UserStore::new(&path, allocator());
    let reg = store.get_or_create("1", "alice", None);
    assert!(reg.created);
    assert!(store.is_dirty());
    assert!(store.get("1").is_some());
    assert!(store.save().is_err());
}
