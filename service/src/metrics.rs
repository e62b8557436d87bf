use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServiceMetricsSnapshot {
    pub spins: u64,
    pub wins: u64,
    pub free_spins_played: u64,
    pub free_spin_failures: u64,
    pub wagered: u64,
    pub paid_out: u64,
    pub refunds: u64,
    pub insufficient_funds: u64,
    pub cancelled_spins: u64,
    pub transfers: u64,
    pub payout_credit_failures: u64,
    pub stats_failures: u64,
    pub audit_failures: u64,
    pub pool_rejections: u64,
}

/// Service counters, updated with relaxed atomics.
#[derive(Default)]
pub struct ServiceMetrics {
    spins: AtomicU64,
    wins: AtomicU64,
    free_spins_played: AtomicU64,
    free_spin_failures: AtomicU64,
    wagered: AtomicU64,
    paid_out: AtomicU64,
    refunds: AtomicU64,
    insufficient_funds: AtomicU64,
    cancelled_spins: AtomicU64,
    transfers: AtomicU64,
    payout_credit_failures: AtomicU64,
    stats_failures: AtomicU64,
    audit_failures: AtomicU64,
    pool_rejections: AtomicU64,
}

impl ServiceMetrics {
    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            spins: self.spins.load(Ordering::Relaxed),
            wins: self.wins.load(Ordering::Relaxed),
            free_spins_played: self.free_spins_played.load(Ordering::Relaxed),
            free_spin_failures: self.free_spin_failures.load(Ordering::Relaxed),
            wagered: self.wagered.load(Ordering::Relaxed),
            paid_out: self.paid_out.load(Ordering::Relaxed),
            refunds: self.refunds.load(Ordering::Relaxed),
            insufficient_funds: self.insufficient_funds.load(Ordering::Relaxed),
            cancelled_spins: self.cancelled_spins.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            payout_credit_failures: self.payout_credit_failures.load(Ordering::Relaxed),
            stats_failures: self.stats_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            pool_rejections: self.pool_rejections.load(Ordering::Relaxed),
        }
    }

    pub fn record_spin(&self, bet: u64, payout: u64, free_spins_played: usize) {
        self.spins.fetch_add(1, Ordering::Relaxed);
        self.wagered.fetch_add(bet, Ordering::Relaxed);
        if payout > 0 {
            self.wins.fetch_add(1, Ordering::Relaxed);
            self.paid_out.fetch_add(payout, Ordering::Relaxed);
        }
        self.free_spins_played
            .fetch_add(free_spins_played as u64, Ordering::Relaxed);
    }

    /// A free spin failed to generate and the rest of the chain was skipped.
    pub fn inc_free_spin_failure(&self) {
        self.free_spin_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_refund(&self) {
        self.refunds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_insufficient_funds(&self) {
        self.insufficient_funds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled_spin(&self) {
        self.cancelled_spins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transfer(&self) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payout_credit_failure(&self) {
        self.payout_credit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stats_failure(&self) {
        self.stats_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pool_rejection(&self) {
        self.pool_rejections.fetch_add(1, Ordering::Relaxed);
    }
}
