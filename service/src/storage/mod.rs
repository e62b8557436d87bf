//! Relational storage for balances, transactions, stats, and game records.
//!
//! One connection per process, guarded by a mutex. Every balance mutation and its transaction
//! row commit in a single database transaction: SQLite uses `BEGIN IMMEDIATE`, Postgres locks
//! the payer rows with `SELECT ... FOR UPDATE`.

use postgres::{Client, NoTls};
use rusqlite::Connection;
use spinledger_types::casino::{GameRecord, PlayerStats};
use spinledger_types::{Account, Transaction, TransactionType};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use url::Url;

use crate::config::StorageConfig;
use crate::error::{LedgerError, StorageError};

mod postgres_backend;
mod sqlite;

enum Backend {
    Sqlite(Connection),
    Postgres(Client),
}

/// A balance mutation to apply atomically with its transaction row.
#[derive(Clone, Copy, Debug)]
pub struct Movement<'a> {
    pub user: &'a str,
    pub amount: u64,
    pub kind: TransactionType,
    pub description: &'a str,
    pub now_ms: u64,
}

/// Balances on both sides after a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferBalances {
    pub from_balance: u64,
    pub to_balance: u64,
}

/// New game record, before an id is assigned.
#[derive(Clone, Debug)]
pub struct NewGameRecord<'a> {
    pub user: &'a str,
    pub game_type: &'a str,
    pub bet_amount: u64,
    pub result_amount: u64,
    pub payload_json: String,
    pub rtp_at_time: f64,
    pub now_ms: u64,
}

/// Aggregates to fold into a player's stats row.
#[derive(Clone, Copy, Debug)]
pub struct StatsDelta<'a> {
    pub user: &'a str,
    pub bet: u64,
    pub payout: u64,
    pub initial_rtp: f64,
    pub now_ms: u64,
}

pub struct Storage {
    backend: Mutex<Backend>,
}

impl Storage {
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        match config {
            StorageConfig::Sqlite { path } => Self::open_sqlite(path),
            StorageConfig::Postgres { url } => Self::connect_postgres(url),
            StorageConfig::Memory => Self::open_in_memory(),
        }
    }

    pub fn open_sqlite(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        sqlite::init_schema(&conn)?;
        info!(path = %path.display(), "opened sqlite storage");
        Ok(Self::from_backend(Backend::Sqlite(conn)))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        sqlite::init_schema(&conn)?;
        Ok(Self::from_backend(Backend::Sqlite(conn)))
    }

    pub fn connect_postgres(url: &str) -> Result<Self, StorageError> {
        validate_postgres_url(url)?;
        let mut client = Client::connect(url, NoTls)?;
        postgres_backend::init_schema(&mut client)?;
        info!("connected postgres storage");
        Ok(Self::from_backend(Backend::Postgres(client)))
    }

    fn from_backend(backend: Backend) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    fn with_backend<T, E>(&self, f: impl FnOnce(&mut Backend) -> Result<T, E>) -> Result<T, E> {
        // A panic mid-transaction drops (and rolls back) the transaction, so the
        // connection is still usable.
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut backend)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => conn.execute_batch(sql).map_err(StorageError::from),
            Backend::Postgres(client) => client.batch_execute(sql).map_err(StorageError::from),
        })
    }

    /// Creates the balance row already holding `grant.amount`, with its transaction row, in one
    /// database transaction. Returns false, and grants nothing, when the user already exists.
    pub fn create_account_with_grant(&self, grant: Movement<'_>) -> Result<bool, LedgerError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::create_account_with_grant(conn, grant),
            Backend::Postgres(client) => postgres_backend::create_account_with_grant(client, grant),
        })
    }

    pub fn account(&self, user: &str) -> Result<Option<Account>, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::account(conn, user),
            Backend::Postgres(client) => postgres_backend::account(client, user),
        })
    }

    /// Returns the new balance.
    pub fn credit(&self, movement: Movement<'_>) -> Result<u64, LedgerError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::credit(conn, movement),
            Backend::Postgres(client) => postgres_backend::credit(client, movement),
        })
    }

    /// Returns the new balance.
    pub fn debit(&self, movement: Movement<'_>) -> Result<u64, LedgerError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::debit(conn, movement),
            Backend::Postgres(client) => postgres_backend::debit(client, movement),
        })
    }

    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
        description: &str,
        now_ms: u64,
    ) -> Result<TransferBalances, LedgerError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::transfer(conn, from, to, amount, description, now_ms),
            Backend::Postgres(client) => {
                postgres_backend::transfer(client, from, to, amount, description, now_ms)
            }
        })
    }

    /// Most recent transactions touching `user`, newest first.
    pub fn history(&self, user: &str, limit: usize) -> Result<Vec<Transaction>, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::history(conn, user, limit),
            Backend::Postgres(client) => postgres_backend::history(client, user, limit),
        })
    }

    /// Number of transactions touching `user`.
    pub fn transaction_count(&self, user: &str) -> Result<u64, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::transaction_count(conn, user),
            Backend::Postgres(client) => postgres_backend::transaction_count(client, user),
        })
    }

    /// Upserts the stats row and returns it with the recomputed RTP.
    pub fn record_spin(&self, delta: StatsDelta<'_>) -> Result<PlayerStats, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::record_spin(conn, delta),
            Backend::Postgres(client) => postgres_backend::record_spin(client, delta),
        })
    }

    pub fn stats(&self, user: &str) -> Result<Option<PlayerStats>, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::stats(conn, user),
            Backend::Postgres(client) => postgres_backend::stats(client, user),
        })
    }

    pub fn insert_game_record(&self, record: NewGameRecord<'_>) -> Result<i64, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::insert_game_record(conn, &record),
            Backend::Postgres(client) => postgres_backend::insert_game_record(client, &record),
        })
    }

    pub fn recent_games(&self, user: &str, limit: usize) -> Result<Vec<GameRecord>, StorageError> {
        self.with_backend(|backend| match backend {
            Backend::Sqlite(conn) => sqlite::recent_games(conn, user, limit),
            Backend::Postgres(client) => postgres_backend::recent_games(client, user, limit),
        })
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn parse_kind(value: &str) -> Result<TransactionType, StorageError> {
    value.parse().map_err(StorageError::Corrupt)
}

fn to_i64(value: u64, label: &'static str) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Conversion {
        label,
        value: value.to_string(),
    })
}

fn to_u64(value: i64, label: &'static str) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Conversion {
        label,
        value: value.to_string(),
    })
}

fn to_i64_usize(value: usize, label: &'static str) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Conversion {
        label,
        value: value.to_string(),
    })
}

fn validate_postgres_url(url: &str) -> Result<(), StorageError> {
    if allow_public_postgres() {
        return Ok(());
    }

    let invalid = |reason: &str| StorageError::InvalidUrl(reason.to_string());
    let parsed = Url::parse(url).map_err(|err| invalid(&format!("parse postgres url: {err}")))?;
    let scheme = parsed.scheme();
    if scheme != "postgres" && scheme != "postgresql" {
        return Err(invalid("postgres url must start with postgres:// or postgresql://"));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("postgres url missing host"))?;
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(());
    }

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Ok(());
        }
        return Err(invalid(
            "postgres host is public; set SPINLEDGER_DB_ALLOW_PUBLIC=1 to override",
        ));
    }

    if allow_postgres_hostname() {
        return Ok(());
    }

    Err(invalid(
        "postgres host must be a private IP; set SPINLEDGER_DB_ALLOW_HOSTNAME=1 to allow hostnames",
    ))
}

fn env_flag(var: &str) -> bool {
    matches!(
        std::env::var(var).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

fn allow_public_postgres() -> bool {
    env_flag("SPINLEDGER_DB_ALLOW_PUBLIC")
}

fn allow_postgres_hostname() -> bool {
    env_flag("SPINLEDGER_DB_ALLOW_HOSTNAME")
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinledger_types::casino::DEFAULT_INITIAL_RTP;

    fn movement<'a>(user: &'a str, amount: u64, kind: TransactionType) -> Movement<'a> {
        Movement {
            user,
            amount,
            kind,
            description: "test",
            now_ms: 1,
        }
    }

    #[test]
    fn test_postgres_url_validation() {
        assert!(validate_postgres_url("postgres://user:pw@localhost/db").is_ok());
        assert!(validate_postgres_url("postgresql://10.0.0.5:5432/db").is_ok());
        assert!(validate_postgres_url("postgres://127.0.0.1/db").is_ok());
        assert!(validate_postgres_url("mysql://10.0.0.5/db").is_err());
        assert!(validate_postgres_url("postgres://8.8.8.8/db").is_err());
    }

    #[test]
    fn test_create_account_is_idempotent() {
        let storage = Storage::open_in_memory().expect("storage");
        let grant = movement("alice", 0, TransactionType::BonusCredit);
        assert!(storage.create_account_with_grant(grant).expect("create"));
        let again = Movement {
            amount: 25,
            now_ms: 2,
            ..grant
        };
        assert!(!storage.create_account_with_grant(again).expect("create again"));
        let account = storage.account("alice").expect("query").expect("exists");
        assert_eq!(account.balance, 0);
        assert_eq!(storage.transaction_count("alice").expect("count"), 0);
        assert_eq!(account.created_at_ms, 1);
        assert!(storage.account("bob").expect("query").is_none());
    }

    #[test]
    fn test_failed_debit_writes_nothing() {
        let storage = Storage::open_in_memory().expect("storage");
        storage
            .create_account_with_grant(movement("alice", 40, TransactionType::BonusCredit))
            .expect("create");
        let err = storage
            .debit(movement("alice", 50, TransactionType::Wager))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { needed: 50, available: 40 }
        ));
        assert_eq!(storage.transaction_count("alice").expect("count"), 1);
        let account = storage.account("alice").expect("query").expect("exists");
        assert_eq!(account.balance, 40);
        account.validate_invariants().expect("consistent");
    }

    #[test]
    fn test_transfer_to_missing_user_rolls_back() {
        let storage = Storage::open_in_memory().expect("storage");
        storage
            .create_account_with_grant(movement("alice", 100, TransactionType::BonusCredit))
            .expect("create");
        let err = storage.transfer("alice", "ghost", 10, "gift", 2).unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(ref user) if user == "ghost"));
        let account = storage.account("alice").expect("query").expect("exists");
        assert_eq!(account.balance, 100);
        assert_eq!(storage.transaction_count("alice").expect("count"), 1);
    }

    #[test]
    fn test_stats_upsert_recomputes_rtp() {
        let storage = Storage::open_in_memory().expect("storage");
        let delta = |bet, payout, now_ms| StatsDelta {
            user: "alice",
            bet,
            payout,
            initial_rtp: DEFAULT_INITIAL_RTP,
            now_ms,
        };
        let first = storage.record_spin(delta(50, 0, 10)).expect("first");
        assert_eq!(first.total_spins, 1);
        assert_eq!(first.current_rtp, 0.0);

        let second = storage.record_spin(delta(50, 150, 20)).expect("second");
        assert_eq!(second.total_spins, 2);
        assert_eq!(second.total_wagered, 100);
        assert_eq!(second.total_won, 150);
        assert_eq!(second.biggest_win, 150);
        assert!((second.current_rtp - 150.0).abs() < 1e-9);
        assert_eq!(second.created_at_ms, 10);
        assert_eq!(second.updated_at_ms, 20);

        let stored = storage.stats("alice").expect("query").expect("exists");
        assert_eq!(stored, second);
    }

    #[test]
    fn test_on_disk_storage_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");
        {
            let storage = Storage::open_sqlite(&path).expect("open");
            storage
                .create_account_with_grant(movement("alice", 75, TransactionType::AdminAdjust))
                .expect("create");
        }
        let storage = Storage::open_sqlite(&path).expect("reopen");
        let account = storage.account("alice").expect("query").expect("exists");
        assert_eq!(account.balance, 75);
        let history = storage.history("alice", 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionType::AdminAdjust);
    }
}
