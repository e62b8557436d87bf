//! Ledger, spin orchestration, and HTTP surface for spinledger.
//!
//! [`Service`] wires storage, the [`ledger::Ledger`], the [`slots::SlotMachine`], and the
//! stats and audit stores together. Every call on it is synchronous and may block on the
//! database; the [`api`] module runs them on Tokio's blocking pool through a
//! [`pool::WorkerPool`].

use spinledger_execution::{GridSource, RandomGrids, RtpManager};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::info;

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod pool;
pub mod records;
pub mod slots;
pub mod stats;
pub mod storage;

use config::{ConfigError, ServiceConfig};
use error::StorageError;
use ledger::Ledger;
use metrics::ServiceMetrics;
use records::GameRecords;
use slots::{CallContext, SlotMachine};
use stats::StatsStore;
use storage::Storage;

#[derive(Debug, ThisError)]
pub enum OpenError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open storage: {0}")]
    Storage(#[from] StorageError),
}

pub struct Service {
    config: ServiceConfig,
    ledger: Arc<Ledger>,
    stats: Arc<StatsStore>,
    records: Arc<GameRecords>,
    slots: SlotMachine,
    metrics: Arc<ServiceMetrics>,
}

impl Service {
    /// Validates `config`, opens its storage, and seeds the grid RNG.
    pub fn open(config: ServiceConfig) -> Result<Self, OpenError> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config.storage)?);
        let grids: Arc<dyn GridSource> = match config.deterministic_seed {
            Some(seed) => {
                info!(seed, "using deterministic grid seed");
                Arc::new(RandomGrids::seeded(seed))
            }
            None => Arc::new(RandomGrids::from_entropy()),
        };
        Ok(Self::with_parts(config, storage, grids)?)
    }

    /// Assembles a service over existing storage and grid source.
    pub fn with_parts(
        config: ServiceConfig,
        storage: Arc<Storage>,
        grids: Arc<dyn GridSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let metrics = Arc::new(ServiceMetrics::default());
        let ledger = Arc::new(Ledger::new(Arc::clone(&storage), config.starting_balance));
        let stats = Arc::new(StatsStore::new(Arc::clone(&storage), config.initial_rtp));
        let records = Arc::new(GameRecords::new(storage));
        let rtp = RtpManager::new(
            config.rtp_band(),
            config.weight_cache_ttl(),
            config.weight_cache_capacity,
        );
        let slots = SlotMachine::new(
            Arc::clone(&ledger),
            Arc::clone(&stats),
            Arc::clone(&records),
            rtp,
            grids,
            Arc::clone(&metrics),
            config.bet,
        );
        Ok(Self {
            config,
            ledger,
            stats,
            records,
            slots,
            metrics,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn records(&self) -> &GameRecords {
        &self.records
    }

    pub fn slots(&self) -> &SlotMachine {
        &self.slots
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Fresh call context carrying the configured spin timeout.
    pub fn spin_context(&self) -> CallContext {
        match self.config.spin_timeout() {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Services over in-memory storage with scripted grids.

    use super::*;

    pub fn service_with_grids(config: ServiceConfig, grids: Arc<dyn GridSource>) -> Service {
        let storage = Arc::new(Storage::open_in_memory().expect("in-memory storage"));
        Service::with_parts(config, storage, grids).expect("valid config")
    }
}
