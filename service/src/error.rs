use spinledger_execution::GenerationError;
use thiserror::Error as ThisError;

/// Failure talking to the backing store.
#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("value out of range for {label}: {value}")]
    Conversion { label: &'static str, value: String },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, ThisError)]
pub enum LedgerError {
    #[error("amount must be > 0 (got {0})")]
    InvalidAmount(i64),
    #[error("cannot transfer to self")]
    SelfTransfer,
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Storage(err.into())
    }
}

impl From<postgres::Error> for LedgerError {
    fn from(err: postgres::Error) -> Self {
        LedgerError::Storage(err.into())
    }
}

impl LedgerError {
    /// Text safe to show to the player; storage details are never included.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::InvalidAmount(_) => "amount must be a positive number".to_string(),
            LedgerError::SelfTransfer => "you cannot transfer to yourself".to_string(),
            LedgerError::InsufficientFunds { needed, available } => format!(
                "not enough balance: need {}, have {}",
                format_amount(*needed),
                format_amount(*available)
            ),
            LedgerError::UserNotFound(_) => "user is not registered".to_string(),
            LedgerError::Storage(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum SpinError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("grid generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    #[error("spin cancelled")]
    Cancelled,
    #[error("spin deadline exceeded")]
    DeadlineExceeded,
}

impl SpinError {
    pub fn user_message(&self) -> String {
        match self {
            SpinError::Ledger(err) => err.user_message(),
            SpinError::Cancelled | SpinError::DeadlineExceeded => {
                "the spin was cancelled, nothing was charged".to_string()
            }
            SpinError::GenerationFailed(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

pub const INTERNAL_ERROR_MESSAGE: &str = "an internal error occurred";

/// Formats an amount with space-separated thousands, e.g. `2 350`.
pub fn format_amount<T: Into<i128>>(value: T) -> String {
    let value: i128 = value.into();
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    grouped
}
