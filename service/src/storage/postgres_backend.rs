use postgres::{Client, Row, Transaction as PgTransaction};
use spinledger_types::casino::{compute_rtp, AuditPayload, GameRecord, PlayerStats};
use spinledger_types::{Account, Transaction, TransactionType};

use super::{
    parse_kind, to_i64, to_i64_usize, to_u64, Movement, NewGameRecord, StatsDelta,
    TransferBalances,
};
use crate::error::{LedgerError, StorageError};

pub(super) fn init_schema(client: &mut Client) -> Result<(), StorageError> {
    client.batch_execute(
        "CREATE TABLE IF NOT EXISTS balances (
            user_id TEXT PRIMARY KEY,
            balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
            total_earned BIGINT NOT NULL DEFAULT 0,
            total_spent BIGINT NOT NULL DEFAULT 0,
            created_at_ms BIGINT NOT NULL,
            updated_at_ms BIGINT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS transactions (
            id BIGSERIAL PRIMARY KEY,
            from_user_id TEXT,
            to_user_id TEXT,
            amount BIGINT NOT NULL CHECK (amount > 0),
            transaction_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at_ms BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS transactions_from_user ON transactions(from_user_id);
        CREATE INDEX IF NOT EXISTS transactions_to_user ON transactions(to_user_id);
        CREATE INDEX IF NOT EXISTS transactions_created_at ON transactions(created_at_ms DESC);
        CREATE TABLE IF NOT EXISTS game_records (
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL,
            game_type TEXT NOT NULL,
            bet_amount BIGINT NOT NULL,
            result_amount BIGINT NOT NULL,
            audit_payload TEXT NOT NULL,
            rtp_at_time DOUBLE PRECISION NOT NULL,
            created_at_ms BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS game_records_user ON game_records(user_id, created_at_ms DESC);
        CREATE TABLE IF NOT EXISTS game_stats (
            user_id TEXT PRIMARY KEY,
            total_spins BIGINT NOT NULL DEFAULT 0,
            total_wagered BIGINT NOT NULL DEFAULT 0,
            total_won BIGINT NOT NULL DEFAULT 0,
            biggest_win BIGINT NOT NULL DEFAULT 0,
            current_rtp DOUBLE PRECISION NOT NULL,
            created_at_ms BIGINT NOT NULL,
            updated_at_ms BIGINT NOT NULL
        );",
    )?;
    Ok(())
}

pub(super) fn create_account_with_grant(
    client: &mut Client,
    grant: Movement<'_>,
) -> Result<bool, LedgerError> {
    let amount = to_i64(grant.amount, "amount")?;
    let now_ms = to_i64(grant.now_ms, "now_ms")?;
    let mut tx = client.transaction()?;
    let inserted = tx.execute(
        "INSERT INTO balances (user_id, balance, total_earned, total_spent, created_at_ms, updated_at_ms)
         VALUES ($1, $2, $2, 0, $3, $3)
         ON CONFLICT (user_id) DO NOTHING",
        &[&grant.user, &amount, &now_ms],
    )?;
    if inserted != 1 {
        return Ok(false);
    }
    if grant.amount > 0 {
        insert_transaction(&mut tx, None, Some(grant.user), &grant)?;
    }
    tx.commit()?;
    Ok(true)
}

pub(super) fn account(client: &mut Client, user: &str) -> Result<Option<Account>, StorageError> {
    let row = client.query_opt(
        "SELECT user_id, balance, total_earned, total_spent, created_at_ms, updated_at_ms
         FROM balances WHERE user_id = $1",
        &[&user],
    )?;
    row.map(|row| -> Result<Account, StorageError> {
        Ok(Account {
            user_id: row.get(0),
            balance: to_u64(row.get(1), "balance")?,
            total_earned: to_u64(row.get(2), "total_earned")?,
            total_spent: to_u64(row.get(3), "total_spent")?,
            created_at_ms: to_u64(row.get(4), "created_at_ms")?,
            updated_at_ms: to_u64(row.get(5), "updated_at_ms")?,
        })
    })
    .transpose()
}

fn lock_balance(tx: &mut PgTransaction<'_>, user: &str) -> Result<u64, LedgerError> {
    let row = tx
        .query_opt(
            "SELECT balance FROM balances WHERE user_id = $1 FOR UPDATE",
            &[&user],
        )?
        .ok_or_else(|| LedgerError::UserNotFound(user.to_string()))?;
    Ok(to_u64(row.get(0), "balance")?)
}

fn insert_transaction(
    tx: &mut PgTransaction<'_>,
    from: Option<&str>,
    to: Option<&str>,
    movement: &Movement<'_>,
) -> Result<(), LedgerError> {
    let amount = to_i64(movement.amount, "amount")?;
    let now_ms = to_i64(movement.now_ms, "now_ms")?;
    tx.execute(
        "INSERT INTO transactions (from_user_id, to_user_id, amount, transaction_type, description, created_at_ms)
         VALUES ($1, $2, $3, $4, $5, $6)",
        &[
            &from,
            &to,
            &amount,
            &movement.kind.as_str(),
            &movement.description,
            &now_ms,
        ],
    )?;
    Ok(())
}

pub(super) fn credit(client: &mut Client, movement: Movement<'_>) -> Result<u64, LedgerError> {
    let amount = to_i64(movement.amount, "amount")?;
    let now_ms = to_i64(movement.now_ms, "now_ms")?;
    let mut tx = client.transaction()?;
    let balance = lock_balance(&mut tx, movement.user)?;
    tx.execute(
        "UPDATE balances
         SET balance = balance + $1, total_earned = total_earned + $1, updated_at_ms = $2
         WHERE user_id = $3",
        &[&amount, &now_ms, &movement.user],
    )?;
    insert_transaction(&mut tx, None, Some(movement.user), &movement)?;
    tx.commit()?;
    Ok(balance.saturating_add(movement.amount))
}

pub(super) fn debit(client: &mut Client, movement: Movement<'_>) -> Result<u64, LedgerError> {
    let amount = to_i64(movement.amount, "amount")?;
    let now_ms = to_i64(movement.now_ms, "now_ms")?;
    let mut tx = client.transaction()?;
    let balance = lock_balance(&mut tx, movement.user)?;
    if balance < movement.amount {
        return Err(LedgerError::InsufficientFunds {
            needed: movement.amount,
            available: balance,
        });
    }
    tx.execute(
        "UPDATE balances
         SET balance = balance - $1, total_spent = total_spent + $1, updated_at_ms = $2
         WHERE user_id = $3",
        &[&amount, &now_ms, &movement.user],
    )?;
    insert_transaction(&mut tx, Some(movement.user), None, &movement)?;
    tx.commit()?;
    Ok(balance - movement.amount)
}

pub(super) fn transfer(
    client: &mut Client,
    from: &str,
    to: &str,
    amount: u64,
    description: &str,
    now_ms: u64,
) -> Result<TransferBalances, LedgerError> {
    let amount_i64 = to_i64(amount, "amount")?;
    let now_i64 = to_i64(now_ms, "now_ms")?;
    let mut tx = client.transaction()?;

    // Lock in user-id order so opposite transfers cannot deadlock.
    let (from_balance, to_balance) = if from < to {
        let from_balance = lock_balance(&mut tx, from)?;
        (from_balance, lock_balance(&mut tx, to)?)
    } else {
        let to_balance = lock_balance(&mut tx, to)?;
        (lock_balance(&mut tx, from)?, to_balance)
    };
    if from_balance < amount {
        return Err(LedgerError::InsufficientFunds {
            needed: amount,
            available: from_balance,
        });
    }

    tx.execute(
        "UPDATE balances
         SET balance = balance - $1, total_spent = total_spent + $1, updated_at_ms = $2
         WHERE user_id = $3",
        &[&amount_i64, &now_i64, &from],
    )?;
    tx.execute(
        "UPDATE balances
         SET balance = balance + $1, total_earned = total_earned + $1, updated_at_ms = $2
         WHERE user_id = $3",
        &[&amount_i64, &now_i64, &to],
    )?;
    let movement = Movement {
        user: from,
        amount,
        kind: TransactionType::Transfer,
        description,
        now_ms,
    };
    insert_transaction(&mut tx, Some(from), Some(to), &movement)?;
    tx.commit()?;
    Ok(TransferBalances {
        from_balance: from_balance - amount,
        to_balance: to_balance.saturating_add(amount),
    })
}

fn decode_transaction(row: &Row) -> Result<Transaction, StorageError> {
    let kind: String = row.get(4);
    Ok(Transaction {
        id: row.get(0),
        from_user: row.get(1),
        to_user: row.get(2),
        amount: to_u64(row.get(3), "amount")?,
        kind: parse_kind(&kind)?,
        description: row.get(5),
        created_at_ms: to_u64(row.get(6), "created_at_ms")?,
    })
}

pub(super) fn history(
    client: &mut Client,
    user: &str,
    limit: usize,
) -> Result<Vec<Transaction>, StorageError> {
    let limit = to_i64_usize(limit, "limit")?;
    let rows = client.query(
        "SELECT id, from_user_id, to_user_id, amount, transaction_type, description, created_at_ms
         FROM transactions
         WHERE from_user_id = $1 OR to_user_id = $1
         ORDER BY created_at_ms DESC, id DESC
         LIMIT $2",
        &[&user, &limit],
    )?;
    rows.iter().map(decode_transaction).collect()
}

pub(super) fn transaction_count(client: &mut Client, user: &str) -> Result<u64, StorageError> {
    let row = client.query_one(
        "SELECT COUNT(*) FROM transactions WHERE from_user_id = $1 OR to_user_id = $1",
        &[&user],
    )?;
    to_u64(row.get(0), "count")
}

fn decode_stats(row: &Row) -> Result<PlayerStats, StorageError> {
    Ok(PlayerStats {
        user_id: row.get(0),
        total_spins: to_u64(row.get(1), "total_spins")?,
        total_wagered: to_u64(row.get(2), "total_wagered")?,
        total_won: to_u64(row.get(3), "total_won")?,
        biggest_win: to_u64(row.get(4), "biggest_win")?,
        current_rtp: row.get(5),
        created_at_ms: to_u64(row.get(6), "created_at_ms")?,
        updated_at_ms: to_u64(row.get(7), "updated_at_ms")?,
    })
}

pub(super) fn record_spin(
    client: &mut Client,
    delta: StatsDelta<'_>,
) -> Result<PlayerStats, StorageError> {
    let bet = to_i64(delta.bet, "bet")?;
    let payout = to_i64(delta.payout, "payout")?;
    let now_ms = to_i64(delta.now_ms, "now_ms")?;
    let first_rtp = compute_rtp(delta.payout, delta.bet, delta.initial_rtp);
    let row = client.query_one(
        "INSERT INTO game_stats
             (user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp, created_at_ms, updated_at_ms)
         VALUES ($1, 1, $2, $3, $3, $4, $6, $6)
         ON CONFLICT (user_id) DO UPDATE SET
             total_spins = game_stats.total_spins + 1,
             total_wagered = game_stats.total_wagered + EXCLUDED.total_wagered,
             total_won = game_stats.total_won + EXCLUDED.total_won,
             biggest_win = GREATEST(game_stats.biggest_win, EXCLUDED.biggest_win),
             current_rtp = CASE
                 WHEN game_stats.total_wagered + EXCLUDED.total_wagered > 0
                 THEN (game_stats.total_won + EXCLUDED.total_won)::DOUBLE PRECISION * 100.0
                      / (game_stats.total_wagered + EXCLUDED.total_wagered)::DOUBLE PRECISION
                 ELSE $5
             END,
             updated_at_ms = EXCLUDED.updated_at_ms
         RETURNING user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp,
                   created_at_ms, updated_at_ms",
        &[
            &delta.user,
            &bet,
            &payout,
            &first_rtp,
            &delta.initial_rtp,
            &now_ms,
        ],
    )?;
    decode_stats(&row)
}

pub(super) fn stats(client: &mut Client, user: &str) -> Result<Option<PlayerStats>, StorageError> {
    let row = client.query_opt(
        "SELECT user_id, total_spins, total_wagered, total_won, biggest_win, current_rtp,
                created_at_ms, updated_at_ms
         FROM game_stats WHERE user_id = $1",
        &[&user],
    )?;
    row.as_ref().map(decode_stats).transpose()
}

pub(super) fn insert_game_record(
    client: &mut Client,
    record: &NewGameRecord<'_>,
) -> Result<i64, StorageError> {
    let bet_amount = to_i64(record.bet_amount, "bet_amount")?;
    let result_amount = to_i64(record.result_amount, "result_amount")?;
    let now_ms = to_i64(record.now_ms, "now_ms")?;
    let row = client.query_one(
        "INSERT INTO game_records
             (user_id, game_type, bet_amount, result_amount, audit_payload, rtp_at_time, created_at_ms)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
        &[
            &record.user,
            &record.game_type,
            &bet_amount,
            &result_amount,
            &record.payload_json,
            &record.rtp_at_time,
            &now_ms,
        ],
    )?;
    Ok(row.get(0))
}

pub(super) fn recent_games(
    client: &mut Client,
    user: &str,
    limit: usize,
) -> Result<Vec<GameRecord>, StorageError> {
    let limit = to_i64_usize(limit, "limit")?;
    let rows = client.query(
        "SELECT id, user_id, game_type, bet_amount, result_amount, audit_payload, rtp_at_time, created_at_ms
         FROM game_records
         WHERE user_id = $1
         ORDER BY created_at_ms DESC, id DESC
         LIMIT $2",
        &[&user, &limit],
    )?;
    rows.iter()
        .map(|row| -> Result<GameRecord, StorageError> {
            let payload: String = row.get(5);
            let payload: AuditPayload = serde_json::from_str(&payload)?;
            Ok(GameRecord {
                id: row.get(0),
                user_id: row.get(1),
                game_type: row.get(2),
                bet_amount: to_u64(row.get(3), "bet_amount")?,
                result_amount: to_u64(row.get(4), "result_amount")?,
                payload,
                rtp_at_time: row.get(6),
                created_at_ms: to_u64(row.get(7), "created_at_ms")?,
            })
        })
        .collect()
}
