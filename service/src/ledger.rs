//! Atomic balance operations.
//!
//! Every successful credit, debit, or transfer writes exactly one transaction row in the same
//! database transaction as the balance change. Failures leave no partial effect.

use spinledger_types::{Account, Transaction, TransactionType};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::MAX_HISTORY_LIMIT;
use crate::error::LedgerError;
use crate::storage::{now_ms, Movement, Storage, TransferBalances};

fn validate_amount(amount: i64) -> Result<u64, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    // Positive by the check above.
    Ok(amount as u64)
}

pub struct Ledger {
    storage: Arc<Storage>,
    starting_balance: u64,
}

impl Ledger {
    pub fn new(storage: Arc<Storage>, starting_balance: u64) -> Self {
        Self {
            storage,
            starting_balance,
        }
    }

    /// Creates the user's balance row. Returns false when the user was already registered.
    ///
    /// A configured starting balance is credited as a bonus on first registration only.
    pub fn register(&self, user: &str) -> Result<bool, LedgerError> {
        let created = self.storage.create_account_with_grant(Movement {
            user,
            amount: self.starting_balance,
            kind: TransactionType::BonusCredit,
            description: "starting balance",
            now_ms: now_ms(),
        })?;
        if created {
            info!(user, grant = self.starting_balance, "registered user");
        }
        Ok(created)
    }

    /// Returns the new balance.
    pub fn credit(
        &self,
        user: &str,
        amount: i64,
        kind: TransactionType,
        description: &str,
    ) -> Result<u64, LedgerError> {
        let amount = validate_amount(amount)?;
        let balance = self.storage.credit(Movement {
            user,
            amount,
            kind,
            description,
            now_ms: now_ms(),
        })?;
        debug!(user, amount, %kind, balance, "credited balance");
        Ok(balance)
    }

    /// Returns the new balance. Fails with [`LedgerError::InsufficientFunds`] without mutating.
    pub fn debit(
        &self,
        user: &str,
        amount: i64,
        kind: TransactionType,
        description: &str,
    ) -> Result<u64, LedgerError> {
        let amount = validate_amount(amount)?;
        let balance = self.storage.debit(Movement {
            user,
            amount,
            kind,
            description,
            now_ms: now_ms(),
        })?;
        debug!(user, amount, %kind, balance, "debited balance");
        Ok(balance)
    }

    pub fn transfer(&self, from: &str, to: &str, amount: i64) -> Result<TransferBalances, LedgerError> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let amount = validate_amount(amount)?;
        let description = format!("transfer from {from} to {to}");
        let balances = self
            .storage
            .transfer(from, to, amount, &description, now_ms())?;
        info!(from, to, amount, "transferred balance");
        Ok(balances)
    }

    /// Current balance. Reads without locking.
    pub fn balance(&self, user: &str) -> Result<u64, LedgerError> {
        Ok(self.account(user)?.balance)
    }

    pub fn account(&self, user: &str) -> Result<Account, LedgerError> {
        self.storage
            .account(user)?
            .ok_or_else(|| LedgerError::UserNotFound(user.to_string()))
    }

    /// Most recent transactions touching `user`, newest first.
    pub fn history(&self, user: &str, limit: usize) -> Result<Vec<Transaction>, LedgerError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.storage.history(user, limit)?)
    }

    /// Credits a positive delta or debits a negative one, recorded as an admin adjustment.
    pub fn admin_adjust(&self, user: &str, delta: i64, reason: &str) -> Result<u64, LedgerError> {
        let balance = match delta {
            0 => return Err(LedgerError::InvalidAmount(0)),
            delta if delta > 0 => self.credit(user, delta, TransactionType::AdminAdjust, reason)?,
            delta => {
                let amount = delta.checked_neg().ok_or(LedgerError::InvalidAmount(delta))?;
                self.debit(user, amount, TransactionType::AdminAdjust, reason)?
            }
        };
        info!(user, delta, reason, balance, "admin adjusted balance");
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ledger() -> Ledger {
        let storage = Arc::new(Storage::open_in_memory().expect("storage"));
        Ledger::new(storage, 0)
    }

    fn funded(ledger: &Ledger, user: &str, amount: i64) {
        ledger.register(user).expect("register");
        ledger
            .credit(user, amount, TransactionType::BonusCredit, "seed")
            .expect("credit");
    }

    #[test]
    fn test_register_grants_starting_balance_once() {
        let storage = Arc::new(Storage::open_in_memory().expect("storage"));
        let ledger = Ledger::new(storage, 100);
        assert!(ledger.register("alice").expect("register"));
        assert!(!ledger.register("alice").expect("register again"));
        assert_eq!(ledger.balance("alice").expect("balance"), 100);
        let history = ledger.history("alice", 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionType::BonusCredit);
    }

    #[test]
    fn test_failed_grant_leaves_user_unregistered() {
        let storage = Arc::new(Storage::open_in_memory().expect("storage"));
        let ledger = Ledger::new(storage.clone(), 100);
        storage
            .execute_raw(
                "CREATE TRIGGER reject_grant BEFORE INSERT ON transactions
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .expect("trigger");
        assert!(matches!(
            ledger.register("alice"),
            Err(LedgerError::Storage(_))
        ));
        assert!(storage.account("alice").expect("query").is_none());

        storage.execute_raw("DROP TRIGGER reject_grant").expect("drop trigger");
        assert!(ledger.register("alice").expect("register"));
        assert_eq!(ledger.balance("alice").expect("balance"), 100);
        assert_eq!(ledger.history("alice", 10).expect("history").len(), 1);
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let ledger = ledger();
        funded(&ledger, "alice", 10);
        for amount in [0, -5] {
            assert!(matches!(
                ledger.credit("alice", amount, TransactionType::Win, "x"),
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                ledger.debit("alice", amount, TransactionType::Wager, "x"),
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert!(matches!(
            ledger.admin_adjust("alice", 0, "noop"),
            Err(LedgerError::InvalidAmount(0))
        ));
    }

    #[test]
    fn test_unknown_user() {
        let ledger = ledger();
        assert!(matches!(ledger.balance("ghost"), Err(LedgerError::UserNotFound(_))));
        assert!(matches!(
            ledger.credit("ghost", 5, TransactionType::Win, "x"),
            Err(LedgerError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_credit_and_debit_records() {
        let ledger = ledger();
        funded(&ledger, "alice", 100);
        assert_eq!(
            ledger.debit("alice", 30, TransactionType::Wager, "bet").expect("debit"),
            70
        );
        let history = ledger.history("alice", 10).expect("history");
        assert_eq!(history.len(), 2);
        let wager = history
            .iter()
            .find(|tx| tx.kind == TransactionType::Wager)
            .expect("wager row");
        assert_eq!(wager.from_user.as_deref(), Some("alice"));
        assert_eq!(wager.to_user, None);
        let seed = history
            .iter()
            .find(|tx| tx.kind == TransactionType::BonusCredit)
            .expect("credit row");
        assert_eq!(seed.from_user, None);
        assert_eq!(seed.to_user.as_deref(), Some("alice"));

        let account = ledger.account("alice").expect("account");
        assert_eq!(account.total_earned, 100);
        assert_eq!(account.total_spent, 30);
        account.validate_invariants().expect("consistent");
    }

    #[test]
    fn test_transfer_moves_funds() {
        let ledger = ledger();
        funded(&ledger, "alice", 100);
        ledger.register("bob").expect("register");
        let balances = ledger.transfer("alice", "bob", 40).expect("transfer");
        assert_eq!(balances, TransferBalances { from_balance: 60, to_balance: 40 });

        let history = ledger.history("bob", 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionType::Transfer);
        assert_eq!(history[0].from_user.as_deref(), Some("alice"));
        assert_eq!(history[0].to_user.as_deref(), Some("bob"));
        assert_eq!(history[0].delta_for("bob"), 40);
    }

    #[test]
    fn test_transfer_rejections() {
        let ledger = ledger();
        funded(&ledger, "alice", 10);
        ledger.register("bob").expect("register");
        assert!(matches!(
            ledger.transfer("alice", "alice", 5),
            Err(LedgerError::SelfTransfer)
        ));
        assert!(matches!(
            ledger.transfer("alice", "bob", 11),
            Err(LedgerError::InsufficientFunds { needed: 11, available: 10 })
        ));
        assert_eq!(ledger.balance("alice").expect("balance"), 10);
        assert_eq!(ledger.balance("bob").expect("balance"), 0);
    }

    #[test]
    fn test_admin_adjust_both_directions() {
        let ledger = ledger();
        ledger.register("alice").expect("register");
        assert_eq!(ledger.admin_adjust("alice", 500, "grant").expect("credit"), 500);
        assert_eq!(ledger.admin_adjust("alice", -200, "penalty").expect("debit"), 300);
        assert!(matches!(
            ledger.admin_adjust("alice", -301, "too much"),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        let history = ledger.history("alice", 10).expect("history");
        assert!(history.iter().all(|tx| tx.kind == TransactionType::AdminAdjust));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let ledger = ledger();
        funded(&ledger, "alice", 1_000);
        for amount in 1..=15 {
            ledger
                .debit("alice", amount, TransactionType::Wager, "bet")
                .expect("debit");
        }
        let history = ledger.history("alice", 10).expect("history");
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].amount, 15);
        assert!(history.windows(2).all(|pair| pair[0].id > pair[1].id));
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(Storage::open_sqlite(&dir.path().join("ledger.db")).expect("storage"));
        let ledger = Arc::new(Ledger::new(storage, 0));
        funded(&ledger, "alice", 1_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let mut succeeded = 0u64;
                    for _ in 0..50 {
                        match ledger.debit("alice", 7, TransactionType::Wager, "bet") {
                            Ok(_) => succeeded += 1,
                            Err(LedgerError::InsufficientFunds { .. }) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                    succeeded
                })
            })
            .collect();
        let succeeded: u64 = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .sum();

        let account = ledger.account("alice").expect("account");
        assert_eq!(succeeded, 1_000 / 7);
        assert_eq!(account.balance, 1_000 - succeeded * 7);
        account.validate_invariants().expect("consistent");
    }

    #[test]
    fn test_concurrent_transfers_conserve_money() {
        let ledger = Arc::new(ledger());
        funded(&ledger, "alice", 500);
        funded(&ledger, "bob", 500);

        let handles: Vec<_> = [("alice", "bob"), ("bob", "alice")]
            .into_iter()
            .map(|(from, to)| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = ledger.transfer(from, to, 9);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        let alice = ledger.balance("alice").expect("balance");
        let bob = ledger.balance("bob").expect("balance");
        assert_eq!(alice + bob, 1_000);
    }
}
