use rusqlite::{params, Connection, OptionalExtension, Transaction as SqlTransaction, TransactionBehavior};
use spinledger_types::casino::{compute_rtp, AuditPayload, GameRecord, PlayerStats};
use spinledger_types::{Account, Transaction};

use super::{parse_kind, Movement, NewGameRecord, StatsDelta, TransferBalances};
use crate::error::{LedgerError, StorageError};

pub(super) fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS balances (
             user_id TEXT PRIMARY KEY,
             balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
             total_earned INTEGER NOT NULL DEFAULT 0,
             total_spent INTEGER NOT NULL DEFAULT 0,
             created_at_ms INTEGER NOT NULL,
             updated_at_ms INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS transactions (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             from_user_id TEXT,
             to_user_id TEXT,
             amount INTEGER NOT NULL CHECK (amount > 0),
             transaction_type TEXT NOT NULL,
             description TEXT NOT NULL DEFAULT '',
             created_at_ms INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS transactions_from_user ON transactions(from_user_id);
         CREATE INDEX IF NOT EXISTS transactions_to_user ON transactions(to_user_id);
         CREATE INDEX IF NOT EXISTS transactions_created_at ON transactions(created_at_ms DESC);
         CREATE TABLE IF NOT EXISTS game_records (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             user_id TEXT NOT NULL,
             game_type TEXT NOT NULL,
             bet_amount INTEGER NOT NULL,
             result_amount INTEGER NOT NULL,
             audit_payload TEXT NOT NULL,
             rtp_at_time REAL NOT NULL,
             created_at_ms INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS game_records_user ON game_records(user_id, created_at_ms DESC);
         CREATE TABLE IF NOT EXISTS game_stats (
             user_id TEXT PRIMARY KEY,
             total_spins INTEGER NOT NULL DEFAULT 0,
             total_wagered INTEGER NOT NULL DEFAULT 0,
             total_won INTEGER NOT NULL DEFAULT 0,
             biggest_win INTEGER NOT NULL DEFAULT 0,
             current_rtp REAL NOT NULL,
             created_at_ms INTEGER NOT NULL,
             updated_at_ms INTEGER NOT NULL
         );",
    )?;
    Ok(())
}

fn create_account(
    conn: &Connection,
    user: &str,
    now_ms: u64,
) -> Result<bool, StorageError> {
    let inserted = conn.execute(
        "INSERT INTO balances (user_id, balance, total_earned, total_spent, created_at_ms, updated_at_ms)
         VALUES (?1, 0, 0, 0, ?2, ?2)
         ON CONFLICT(user_id) DO NOTHING",
        params![user, now_ms],
    )?;
    Ok(inserted == 1)
}

pub(super) fn create_account_with_grant(
    conn: &mut Connection,
    grant: Movement<'_>,
) -> Result<bool, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !create_account(&tx, grant.user, grant.now_ms)? {
        return Ok(false);
    }
    if grant.amount > 0 {
        tx.execute(
            "UPDATE balances SET balance = ?1, total_earned = ?1 WHERE user_id = ?2",
            params![grant.amount, grant.user],
        )?;
        insert_transaction(&tx, None, Some(grant.user), &grant)?;
    }
    tx.commit()?;
    Ok(true)
}

pub(super) fn account(conn: &Connection, user: &str) -> Result<Option<Account>, StorageError> {
    let account = conn
        .query_row(
            "SELECT user_id, balance, total_earned, total_spent, created_at_ms, updated_at_ms
             FROM balances WHERE user_id = ?1",
            params![user],
            |row| {
                Ok(Account {
                    user_id: row.get(0)?,
                    balance: row.get(1)?,
                    total_earned: row.get(2)?,
                    total_spent: row.get(3)?,
                    created_at_ms: row.get(4)?,
                    updated_at_ms: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(account)
}

fn locked_balance(tx: &SqlTransaction<'_>, user: &str) -> Result<u64, LedgerError> {
    tx.query_row(
        "SELECT balance FROM balances WHERE user_id = ?1",
        params![user],
        |row| row.get::<_, u64>(0),
    )
    .optional()?
    .ok_or_else(|| LedgerError::UserNotFound(user.to_string()))
}

fn insert_transaction(
    tx: &SqlTransaction<'_>,
    from: Option<&str>,
    to: Option<&str>,
    movement: &Movement<'_>,
) -> Result<(), LedgerError> {
    tx.execute(
        "INSERT INTO transactions (from_user_id, to_user_id, amount, transaction_type, description, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            from,
            to,
            movement.amount,
            movement.kind.as_str(),
            movement.description,
            movement.now_ms
        ],
    )?;
    Ok(())
}

pub(super) fn credit(conn: &mut Connection, movement: Movement<'_>) -> Result<u64, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let balance = locked_balance(&tx, movement.user)?;
    let next = balance
        .checked_add(movement.amount)
        .ok_or(LedgerError::InvalidAmount(i64::MAX))?;
    tx.execute(
        "UPDATE balances
         SET balance = balance + ?1, total_earned = total_earned + ?1, updated_at_ms = ?2
         WHERE user_id = ?3",
        params![movement.amount, movement.now_ms, movement.user],
    )?;
    insert_transaction(&tx, None, Some(movement.user), &movement)?;
    tx.commit()?;
    Ok(next)
}

pub(super) fn debit(conn: &mut Connection, movement: Movement<'_>) -> Result<u64, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let balance = locked_balance(&tx, movement.user)?;
    if balance < movement.amount {
        return Err(LedgerError::InsufficientFunds {
            needed: movement.amount,
            available: balance,
        });
    }
    tx.execute(
        "UPDATE balances
         SET balance = balance - ?1, total_spent = total_spent + ?1, updated_at_ms = ?2
         WHERE user_id = ?3",
        params![movement.amount, movement.now_ms, movement.user],
    )?;
    insert_transaction(&tx, Some(movement.user), None, &movement)?;
    tx.commit()?;
    Ok(balance - movement.amount)
}

pub(super) fn transfer(
    conn: &mut Connection,
    from: &str,
    to: &str,
    amount: u64,
    description: &str,
    now_ms: u64,
) -> Result<TransferBalances, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from_balance = locked_balance(&tx, from)?;
    let to_balance = locked_balance(&tx, to)?;
    if from_balance < amount {
        return Err(LedgerError::InsufficientFunds {
            needed: amount,
            available: from_balance,
        });
    }
    tx.execute(
        "UPDATE balances
         SET balance = balance - ?1, total_spent = total_spent + ?1, updated_at_ms = ?2
         WHERE user_id = ?3",
        params![amount, now_ms, from],
    )?;
    tx.execute(
        "UPDATE balances
         SET balance = balance + ?1, total_earned = total_earned + ?1, updated_at_ms = ?2
         WHERE user_id = ?3",
        params![amount, now_ms, to],
    )?;
    let movement = Movement {
        user: from,
        amount,
        kind: spinledger_types::TransactionType::Transfer,
        description,
        now_ms,
    };
    insert_transaction(&tx, Some(from), Some(to), &movement)?;
    tx.commit()?;
    Ok(TransferBalances {
        from_balance: from_balance - amount,
        to_balance: to_balance.saturating_add(amount),
    })
}

type RawTransaction = (i64, Option<String>, Option<String>, u64, String, String, u64);

fn decode_transaction(raw: RawTransaction) -> Result<Transaction, StorageError> {
    let (id, from_user, to_user, amount, kind, description, created_at_ms) = raw;
    Ok(Transaction {
        id,
        from_user,
        to_user,
        amount,
        kind: parse_kind(&kind)?,
        description,
        created_at_ms,
    })
}

pub(super) fn history(
    conn: &Connection,
    user: &str,
    limit: usize,
) -> Result<Vec<Transaction>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, from_user_id, to_user_id, amount, transaction_type, description, created_at_ms
         FROM transactions
         WHERE from_user_id = ?1 OR to_user_id = ?1
         ORDER BY created_at_ms DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user, limit as u64], |row| -> rusqlite::Result<RawTransaction> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    })?;
    let mut transactions = Vec::new();
    for row in rows {
        transactions.push(decode_transaction(row?)?);
    }
    Ok(transactions)
}

pub(super) fn transaction_count(conn: &Connection, user: &str) -> Result<u64, StorageError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE from_user_id = ?1 OR to_user_id = ?1",
        params![user],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn map_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerStats> {
    Ok(PlayerStats {
        user_id: row.get(0)?,
        total_spins: row.get(1)?,
        total_wagered: row.get(2)?,
        total_won: row.get(3)?,
        biggest_win: row.get(4)?,
        current_rtp: row.get(5)?,
        created_at_ms: row.get(6)?,
        updated_at_ms: row.get(7)?,
    })
}

pub(super) fn record_spin(
    conn: &Connection,
    delta: StatsDelta<'_>,
) -> Result<PlayerStats, StorageError> {
    let first_rtp = compute_rtp(delta.payout, delta.bet, delta.initial_rtp);
    let stats = conn.query_row(
        "INSERT INTO game_stats
             (user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp, created_at_ms, updated_at_ms)
         VALUES (?1, 1, ?2, ?3, ?3, ?4, ?6, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
             total_spins = total_spins + 1,
             total_wagered = total_wagered + excluded.total_wagered,
             total_won = total_won + excluded.total_won,
             biggest_win = MAX(biggest_win, excluded.biggest_win),
             current_rtp = CASE
                 WHEN total_wagered + excluded.total_wagered > 0
                 THEN CAST(total_won + excluded.total_won AS REAL) * 100.0
                      / (total_wagered + excluded.total_wagered)
                 ELSE ?5
             END,
             updated_at_ms = excluded.updated_at_ms
         RETURNING user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp,
                   created_at_ms, updated_at_ms",
        params![
            delta.user,
            delta.bet,
            delta.payout,
            first_rtp,
            delta.initial_rtp,
            delta.now_ms
        ],
        map_stats,
    )?;
    Ok(stats)
}

pub(super) fn stats(conn: &Connection, user: &str) -> Result<Option<PlayerStats>, StorageError> {
    let stats = conn
        .query_row(
            "SELECT user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp,
                    created_at_ms, updated_at_ms
             FROM game_stats WHERE user_id = ?1",
            params![user],
            map_stats,
        )
        .optional()?;
    Ok(stats)
}

pub(super) fn insert_game_record(
    conn: &Connection,
    record: &NewGameRecord<'_>,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO game_records
             (user_id, game_type, bet_amount, result_amount, audit_payload, rtp_at_time, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.user,
            record.game_type,
            record.bet_amount,
            record.result_amount,
            record.payload_json,
            record.rtp_at_time,
            record.now_ms
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn recent_games(
    conn: &Connection,
    user: &str,
    limit: usize,
) -> Result<Vec<GameRecord>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, game_type, bet_amount, result_amount, audit_payload, rtp_at_time, created_at_ms
         FROM game_records
         WHERE user_id = ?1
         ORDER BY created_at_ms DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user, limit as u64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u64>(3)?,
            row.get::<_, u64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, u64>(7)?,
        ))
    })?;
    let mut records = Vec::new();
    for row in rows {
        let (id, user_id, game_type, bet_amount, result_amount, payload, rtp_at_time, created_at_ms) =
            row?;
        let payload: AuditPayload = serde_json::from_str(&payload)?;
        records.push(GameRecord {
            id,
            user_id,
            game_type,
            bet_amount,
            result_amount,
            payload,
            rtp_at_time,
            created_at_ms,
        });
    }
    Ok(records)
}
