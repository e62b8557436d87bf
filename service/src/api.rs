//! JSON HTTP surface.
//!
//! Handlers run service calls through the shared [`WorkerPool`]; a full pool answers 503.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use spinledger_types::casino::PlayerStats;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::commands;
use crate::config::MAX_HISTORY_LIMIT;
use crate::error::{LedgerError, SpinError, INTERNAL_ERROR_MESSAGE};
use crate::metrics::ServiceMetricsSnapshot;
use crate::pool::{PoolError, WorkerPool};
use crate::slots::CallContext;
use crate::Service;

pub struct Api {
    service: Arc<Service>,
    pool: WorkerPool,
}

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
    pool: WorkerPool,
}

impl Api {
    pub fn new(service: Arc<Service>) -> Self {
        let config = service.config();
        let pool = WorkerPool::new(config.worker_capacity(), config.backlog);
        Self { service, pool }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
            pool: self.pool.clone(),
        };
        Router::new()
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics))
            .route("/users/:user", post(register))
            .route("/users/:user/balance", get(balance))
            .route("/users/:user/transactions", get(transactions))
            .route("/users/:user/spin", post(spin))
            .route("/users/:user/stats", get(stats))
            .route("/users/:user/games", get(games))
            .route("/transfers", post(transfer))
            .route("/commands", post(command))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidAmount(_) | LedgerError::SelfTransfer => StatusCode::BAD_REQUEST,
            LedgerError::InsufficientFunds { .. } => StatusCode::CONFLICT,
            LedgerError::UserNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Storage(inner) => {
                error!(?inner, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.user_message(),
        }
    }
}

impl From<SpinError> for ApiError {
    fn from(err: SpinError) -> Self {
        match err {
            SpinError::Ledger(inner) => inner.into(),
            SpinError::Cancelled | SpinError::DeadlineExceeded => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: err.user_message(),
            },
            SpinError::GenerationFailed(ref inner) => {
                error!(?inner, "spin failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: err.user_message(),
                }
            }
        }
    }
}

impl From<crate::error::StorageError> for ApiError {
    fn from(err: crate::error::StorageError) -> Self {
        LedgerError::Storage(err).into()
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Saturated { .. } => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "server is busy, try again later".to_string(),
            },
            other => {
                error!(?other, "worker pool failure");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                }
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

impl AppState {
    /// Runs `job` on the worker pool, flattening pool and job errors.
    async fn blocking<T, F>(&self, job: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Service) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        match self.pool.run(move || job(service.as_ref())).await {
            Ok(result) => result,
            Err(err) => {
                if matches!(err, PoolError::Saturated { .. }) {
                    warn!(%err, "rejecting request");
                    self.service.metrics().inc_pool_rejection();
                }
                Err(err.into())
            }
        }
    }
}

/// Cancels the call when the request future is dropped, e.g. on client disconnect.
struct CancelOnDrop(CallContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, service: &Service) -> usize {
        self.limit
            .unwrap_or_else(|| service.config().history_capacity())
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    counters: ServiceMetricsSnapshot,
    weight_cache_players: usize,
    pool_admitted: usize,
    pool_limit: usize,
}

#[derive(Serialize, Deserialize)]
struct RegisterResponse {
    user_id: String,
    created: bool,
    balance: u64,
}

#[derive(Serialize, Deserialize)]
struct BalanceResponse {
    user_id: String,
    balance: u64,
}

#[derive(Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: i64,
}

#[derive(Serialize, Deserialize)]
struct TransferResponse {
    from_balance: u64,
    to_balance: u64,
}

#[derive(Deserialize)]
struct CommandRequest {
    user: String,
    text: String,
}

#[derive(Serialize, Deserialize)]
struct CommandResponse {
    reply: String,
}

async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse { ok: true })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(MetricsResponse {
        counters: state.service.metrics().snapshot(),
        weight_cache_players: state.service.slots().rtp().cached_players(),
        pool_admitted: state.pool.admitted(),
        pool_limit: state.pool.limit(),
    })
}

async fn register(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let result = state
        .blocking(move |service| {
            let created = service.ledger().register(&user)?;
            let balance = service.ledger().balance(&user)?;
            Ok(RegisterResponse {
                user_id: user,
                created,
                balance,
            })
        })
        .await;
    match result {
        Ok(body) if body.created => (StatusCode::CREATED, Json(body)).into_response(),
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn balance(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<BalanceResponse> {
    state
        .blocking(move |service| {
            let balance = service.ledger().balance(&user)?;
            Ok(BalanceResponse {
                user_id: user,
                balance,
            })
        })
        .await
        .map(Json)
}

async fn transactions(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<spinledger_types::Transaction>> {
    state
        .blocking(move |service| {
            service.ledger().account(&user)?;
            Ok(service.ledger().history(&user, query.resolve(service))?)
        })
        .await
        .map(Json)
}

async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<TransferResponse> {
    state
        .blocking(move |service| {
            let balances = service
                .ledger()
                .transfer(&request.from, &request.to, request.amount)?;
            service.metrics().inc_transfer();
            Ok(TransferResponse {
                from_balance: balances.from_balance,
                to_balance: balances.to_balance,
            })
        })
        .await
        .map(Json)
}

async fn spin(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let guard = CancelOnDrop(state.service.spin_context());
    let ctx = guard.0.clone();
    let result = state
        .blocking(move |service| Ok(service.slots().play_slot(&user, &ctx)?))
        .await;
    drop(guard);
    match result {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn stats(State(state): State<AppState>, Path(user): Path<String>) -> ApiResult<PlayerStats> {
    state
        .blocking(move |service| {
            service.ledger().account(&user)?;
            let initial = service.config().initial_rtp;
            Ok(service
                .stats()
                .get(&user)?
                .unwrap_or_else(|| PlayerStats::empty(user.as_str(), initial)))
        })
        .await
        .map(Json)
}

async fn games(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<spinledger_types::casino::GameRecord>> {
    state
        .blocking(move |service| {
            service.ledger().account(&user)?;
            Ok(service.records().recent(&user, query.resolve(service))?)
        })
        .await
        .map(Json)
}

async fn command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<CommandResponse> {
    let guard = CancelOnDrop(state.service.spin_context());
    let ctx = guard.0.clone();
    let result = state
        .blocking(move |service| {
            let reply = commands::handle(service, &request.user, &request.text, &ctx);
            Ok(CommandResponse { reply })
        })
        .await;
    drop(guard);
    result.map(Json)
}
