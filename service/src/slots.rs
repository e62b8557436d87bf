//! Spin orchestration.
//!
//! A spin moves money strictly: the bet is debited before the grid exists, and a failed grid
//! is refunded. Everything after the payout is best effort: stats, weight adjustment, and the
//! audit record are logged and counted when they fail, and the spin still succeeds.

use spinledger_execution::{play_spin, GridSource, RtpManager};
use spinledger_types::casino::SpinResult;
use spinledger_types::TransactionType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::{LedgerError, SpinError};
use crate::ledger::Ledger;
use crate::metrics::ServiceMetrics;
use crate::records::GameRecords;
use crate::stats::StatsStore;

/// Caller-supplied deadline and cancellation flag, checked before any money moves.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), SpinError> {
        if self.is_cancelled() {
            return Err(SpinError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(SpinError::DeadlineExceeded);
        }
        Ok(())
    }
}

pub struct SlotMachine {
    ledger: Arc<Ledger>,
    stats: Arc<StatsStore>,
    records: Arc<GameRecords>,
    rtp: RtpManager,
    grids: Arc<dyn GridSource>,
    metrics: Arc<ServiceMetrics>,
    bet: u64,
}

impl SlotMachine {
    pub fn new(
        ledger: Arc<Ledger>,
        stats: Arc<StatsStore>,
        records: Arc<GameRecords>,
        rtp: RtpManager,
        grids: Arc<dyn GridSource>,
        metrics: Arc<ServiceMetrics>,
        bet: u64,
    ) -> Self {
        Self {
            ledger,
            stats,
            records,
            rtp,
            grids,
            metrics,
            bet,
        }
    }

    pub fn rtp(&self) -> &RtpManager {
        &self.rtp
    }

    /// Plays one paid spin, including any free spins it triggers.
    pub fn play_slot(&self, user: &str, ctx: &CallContext) -> Result<SpinResult, SpinError> {
        if let Err(err) = ctx.check() {
            self.metrics.inc_cancelled_spin();
            return Err(err);
        }

        let bet = self.bet;
        let wager = i64::try_from(bet).map_err(|_| LedgerError::InvalidAmount(i64::MAX))?;
        let balance = self.ledger.balance(user)?;
        if balance < bet {
            self.metrics.inc_insufficient_funds();
            return Err(LedgerError::InsufficientFunds {
                needed: bet,
                available: balance,
            }
            .into());
        }

        let after_debit = match self
            .ledger
            .debit(user, wager, TransactionType::Wager, "slot machine bet")
        {
            Ok(balance) => balance,
            Err(err) => {
                if matches!(err, LedgerError::InsufficientFunds { .. }) {
                    self.metrics.inc_insufficient_funds();
                }
                return Err(err.into());
            }
        };

        let weights = self.rtp.get_weights(user);
        let play = match play_spin(self.grids.as_ref(), &weights, bet) {
            Ok(play) => play,
            Err(err) => {
                warn!(user, ?err, "grid generation failed; refunding bet");
                self.metrics.inc_refund();
                if let Err(refund_err) =
                    self.ledger
                        .credit(user, wager, TransactionType::Refund, "slot machine refund")
                {
                    error!(user, bet, ?refund_err, "failed to refund bet");
                }
                return Err(err.into());
            }
        };

        if let Some(err) = &play.free_spin_error {
            self.metrics.inc_free_spin_failure();
            warn!(
                user,
                ?err,
                awarded = play.base.free_spins_awarded,
                played = play.free_spin_rounds.len(),
                "free spins cut short"
            );
        }

        let total_payout = play.total_payout();
        let mut balance_after = after_debit;
        if total_payout > 0 {
            let credited = i64::try_from(total_payout)
                .map_err(|_| LedgerError::InvalidAmount(i64::MAX))
                .and_then(|amount| {
                    self.ledger
                        .credit(user, amount, TransactionType::Win, "slot machine win")
                });
            match credited {
                Ok(balance) => balance_after = balance,
                Err(err) => {
                    self.metrics.inc_payout_credit_failure();
                    error!(user, total_payout, ?err, "failed to credit slot payout");
                }
            }
        }

        let current_rtp = match self.stats.record_spin(user, bet, total_payout) {
            Ok(stats) => stats.current_rtp,
            Err(err) => {
                self.metrics.inc_stats_failure();
                error!(user, ?err, "failed to update slot stats");
                self.stats.get_or_default(user).current_rtp
            }
        };
        self.rtp.adjust_weights(user, current_rtp);

        let result = SpinResult {
            bet,
            grid: play.base.grid,
            win_lines: play.base.win_lines,
            bonus_count: play.base.bonus_count,
            bonus_credit: play.base.bonus_credit,
            free_spins_awarded: play.base.free_spins_awarded,
            free_spin_rounds: play.free_spin_rounds,
            total_payout,
            is_win: total_payout > 0,
            balance_after,
        };

        if let Err(err) = self.records.save_spin(user, &result, current_rtp) {
            self.metrics.inc_audit_failure();
            error!(user, ?err, "failed to save game record");
        }

        self.metrics
            .record_spin(bet, total_payout, result.free_spin_rounds.len());
        info!(
            user,
            bet,
            payout = total_payout,
            free_spins = result.free_spin_rounds.len(),
            rtp = current_rtp,
            balance = balance_after,
            "slot spin complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use spinledger_execution::mocks::{
        grid_with_run, losing_grid, with_bonus, RecordingGrids, ScriptedGrids,
    };
    use spinledger_execution::GenerationError;
    use spinledger_types::casino::{SymbolId, WeightVector};

    struct Harness {
        ledger: Arc<Ledger>,
        stats: Arc<StatsStore>,
        records: Arc<GameRecords>,
        metrics: Arc<ServiceMetrics>,
        storage: Arc<Storage>,
    }

    fn harness() -> Harness {
        harness_on(Storage::open_in_memory().expect("storage"))
    }

    fn harness_on(storage: Storage) -> Harness {
        let storage = Arc::new(storage);
        Harness {
            ledger: Arc::new(Ledger::new(Arc::clone(&storage), 0)),
            stats: Arc::new(StatsStore::new(Arc::clone(&storage), 96.0)),
            records: Arc::new(GameRecords::new(Arc::clone(&storage))),
            metrics: Arc::new(ServiceMetrics::default()),
            storage,
        }
    }

    impl Harness {
        fn machine(&self, grids: Arc<dyn GridSource>) -> SlotMachine {
            SlotMachine::new(
                Arc::clone(&self.ledger),
                Arc::clone(&self.stats),
                Arc::clone(&self.records),
                RtpManager::default(),
                grids,
                Arc::clone(&self.metrics),
                50,
            )
        }

        fn fund(&self, user: &str, amount: i64) {
            self.ledger.register(user).expect("register");
            self.ledger
                .credit(user, amount, TransactionType::BonusCredit, "seed")
                .expect("credit");
        }

        fn history_kinds(&self, user: &str) -> Vec<TransactionType> {
            self.ledger
                .history(user, 100)
                .expect("history")
                .into_iter()
                .map(|tx| tx.kind)
                .collect()
        }
    }

    #[test]
    fn test_insufficient_funds_moves_nothing() {
        let h = harness();
        h.fund("alice", 40);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![losing_grid()])));

        let err = machine.play_slot("alice", &CallContext::new()).unwrap_err();
        assert!(matches!(
            err,
            SpinError::Ledger(LedgerError::InsufficientFunds { needed: 50, available: 40 })
        ));
        assert_eq!(h.ledger.balance("alice").expect("balance"), 40);
        assert_eq!(h.history_kinds("alice"), vec![TransactionType::BonusCredit]);
        assert!(h.stats.get("alice").expect("stats").is_none());
        assert_eq!(h.metrics.snapshot().insufficient_funds, 1);
    }

    #[test]
    fn test_losing_spin_debits_once() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![losing_grid()])));

        let result = machine.play_slot("alice", &CallContext::new()).expect("spin");
        assert_eq!(result.total_payout, 0);
        assert!(!result.is_win);
        assert_eq!(result.balance_after, 950);
        assert_eq!(h.ledger.balance("alice").expect("balance"), 950);
        assert_eq!(
            h.history_kinds("alice"),
            vec![TransactionType::Wager, TransactionType::BonusCredit]
        );

        let stats = h.stats.get("alice").expect("stats").expect("row");
        assert_eq!(stats.total_spins, 1);
        assert_eq!(stats.current_rtp, 0.0);
        assert_eq!(h.records.recent("alice", 10).expect("records").len(), 1);
    }

    #[test]
    fn test_winning_spin_balances_exactly() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![
            with_bonus(grid_with_run(0, SymbolId::Seven, 5), 3),
            grid_with_run(2, SymbolId::Cherry, 3),
        ])));

        let before = h.ledger.balance("alice").expect("balance");
        let result = machine.play_slot("alice", &CallContext::new()).expect("spin");
        // Seven five-of-a-kind, bonus credit, then a cherry triple in the free spin.
        assert_eq!(result.win_lines.len(), 1);
        assert_eq!(result.bonus_credit, 100);
        assert_eq!(result.free_spins_awarded, 1);
        assert_eq!(result.free_spin_rounds.len(), 1);
        assert_eq!(result.total_payout, 50 * 50 + 100 + 50 * 2);
        assert!(result.is_win);

        let after = h.ledger.balance("alice").expect("balance");
        assert_eq!(after, before - 50 + result.total_payout);
        assert_eq!(result.balance_after, after);
        assert_eq!(
            h.history_kinds("alice"),
            vec![TransactionType::Win, TransactionType::Wager, TransactionType::BonusCredit]
        );
        h.ledger
            .account("alice")
            .expect("account")
            .validate_invariants()
            .expect("consistent");
    }

    #[test]
    fn test_generation_failure_refunds() {
        let h = harness();
        h.fund("alice", 100);
        let machine = h.machine(Arc::new(ScriptedGrids::new(vec![Err(
            GenerationError::ZeroTotalWeight,
        )])));

        let err = machine.play_slot("alice", &CallContext::new()).unwrap_err();
        assert!(matches!(err, SpinError::GenerationFailed(_)));
        assert_eq!(h.ledger.balance("alice").expect("balance"), 100);
        assert_eq!(
            h.history_kinds("alice"),
            vec![TransactionType::Refund, TransactionType::Wager, TransactionType::BonusCredit]
        );
        assert!(h.stats.get("alice").expect("stats").is_none());
        assert_eq!(h.metrics.snapshot().refunds, 1);
    }

    #[test]
    fn test_cancelled_context_moves_nothing() {
        let h = harness();
        h.fund("alice", 100);
        let grids = Arc::new(ScriptedGrids::from_grids(vec![losing_grid()]));
        let machine = h.machine(grids.clone());

        let ctx = CallContext::new();
        ctx.cancel();
        assert!(matches!(
            machine.play_slot("alice", &ctx),
            Err(SpinError::Cancelled)
        ));

        let expired = CallContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(
            machine.play_slot("alice", &expired),
            Err(SpinError::DeadlineExceeded)
        ));

        assert_eq!(h.ledger.balance("alice").expect("balance"), 100);
        assert_eq!(grids.calls(), 0);
        assert_eq!(h.metrics.snapshot().cancelled_spins, 2);
    }

    #[test]
    fn test_high_rtp_lowers_premium_weights_next_spin() {
        let h = harness();
        h.fund("alice", 1_000);
        let grids = Arc::new(RecordingGrids::new(grid_with_run(0, SymbolId::Seven, 5)));
        let machine = h.machine(grids.clone());

        machine.play_slot("alice", &CallContext::new()).expect("first spin");
        machine.play_slot("alice", &CallContext::new()).expect("second spin");

        let seen = grids.seen();
        let baseline = WeightVector::baseline();
        assert_eq!(seen[0], baseline, "first spin uses baseline weights");
        let adjusted = seen[1];
        assert!(adjusted.get(SymbolId::Seven) < baseline.get(SymbolId::Seven));
        assert!(adjusted.get(SymbolId::Diamond) < baseline.get(SymbolId::Diamond));
        assert!(h.stats.get("alice").expect("stats").expect("row").current_rtp > 98.0);
    }

    #[test]
    fn test_stats_failure_is_absorbed() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![losing_grid()])));
        h.storage
            .execute_raw("DROP TABLE game_stats")
            .expect("drop stats table");

        let result = machine.play_slot("alice", &CallContext::new()).expect("spin succeeds");
        assert_eq!(result.balance_after, 950);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.stats_failures, 1);
        assert_eq!(snapshot.spins, 1);
    }

    #[test]
    fn test_payout_credit_failure_keeps_wager() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![grid_with_run(
            0,
            SymbolId::Seven,
            5,
        )])));
        h.storage
            .execute_raw(
                "CREATE TRIGGER reject_win BEFORE INSERT ON transactions
                 WHEN NEW.transaction_type = 'win'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .expect("trigger");

        let result = machine.play_slot("alice", &CallContext::new()).expect("spin succeeds");
        assert_eq!(result.total_payout, 50 * 50);
        assert_eq!(result.balance_after, 950);
        assert_eq!(h.ledger.balance("alice").expect("balance"), 950);
        assert_eq!(
            h.history_kinds("alice"),
            vec![TransactionType::Wager, TransactionType::BonusCredit]
        );
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.payout_credit_failures, 1);
        assert_eq!(snapshot.spins, 1);
    }

    #[test]
    fn test_audit_failure_is_absorbed() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::from_grids(vec![losing_grid()])));
        h.storage
            .execute_raw("DROP TABLE game_records")
            .expect("drop records table");

        let result = machine.play_slot("alice", &CallContext::new()).expect("spin succeeds");
        assert_eq!(result.balance_after, 950);
        assert_eq!(h.ledger.balance("alice").expect("balance"), 950);
        assert_eq!(
            h.history_kinds("alice"),
            vec![TransactionType::Wager, TransactionType::BonusCredit]
        );
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.audit_failures, 1);
        assert_eq!(snapshot.spins, 1);
    }

    #[test]
    fn test_cut_short_free_spins_are_counted() {
        let h = harness();
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(ScriptedGrids::new(vec![
            Ok(with_bonus(losing_grid(), 4)),
            Err(GenerationError::ZeroTotalWeight),
        ])));

        let result = machine.play_slot("alice", &CallContext::new()).expect("spin succeeds");
        assert_eq!(result.free_spins_awarded, 2);
        assert!(result.free_spin_rounds.is_empty());
        assert_eq!(result.total_payout, 200);
        assert_eq!(h.ledger.balance("alice").expect("balance"), 1_000 - 50 + 200);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.free_spin_failures, 1);
        assert_eq!(snapshot.free_spins_played, 0);
        assert_eq!(snapshot.refunds, 0);
    }

    #[test]
    fn test_concurrent_spins_never_overdraw() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness_on(Storage::open_sqlite(&dir.path().join("ledger.db")).expect("open"));
        h.fund("alice", 1_000);
        let machine = h.machine(Arc::new(RecordingGrids::new(losing_grid())));

        let machine = &machine;
        let outcomes: Vec<Result<SpinResult, SpinError>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(move |_| {
                    scope.spawn(move || {
                        (0..10)
                            .map(|_| machine.play_slot("alice", &CallContext::new()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().expect("worker"))
                .collect()
        });

        let played = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(played, 20);
        for outcome in &outcomes {
            match outcome {
                Ok(result) => assert!(result.balance_after < 1_000),
                Err(err) => assert!(
                    matches!(err, SpinError::Ledger(LedgerError::InsufficientFunds { .. })),
                    "unexpected error: {err}"
                ),
            }
        }

        let account = h.ledger.account("alice").expect("account");
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_spent, 20 * 50);
        assert_eq!(account.balance, account.total_earned - account.total_spent);
        account.validate_invariants().expect("consistent");
        let stats = h.stats.get("alice").expect("stats").expect("row");
        assert_eq!(stats.total_spins, 20);
        assert_eq!(h.metrics.snapshot().insufficient_funds, 60);
    }
}
