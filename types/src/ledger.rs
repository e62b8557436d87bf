//! Balance and transaction records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Kind of money movement recorded by a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    Wager,
    Win,
    Refund,
    BonusCredit,
    BonusDebit,
    AdminAdjust,
}

impl TransactionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Wager => "wager",
            TransactionType::Win => "win",
            TransactionType::Refund => "refund",
            TransactionType::BonusCredit => "bonus_credit",
            TransactionType::BonusDebit => "bonus_debit",
            TransactionType::AdminAdjust => "admin_adjust",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "transfer" => Ok(Self::Transfer),
            "wager" => Ok(Self::Wager),
            "win" => Ok(Self::Win),
            "refund" => Ok(Self::Refund),
            "bonus_credit" => Ok(Self::BonusCredit),
            "bonus_debit" => Ok(Self::BonusDebit),
            "admin_adjust" => Ok(Self::AdminAdjust),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Append-only record of one balance mutation.
///
/// Credits carry only `to_user`, debits only `from_user`, transfers both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub amount: u64,
    pub kind: TransactionType,
    pub description: String,
    pub created_at_ms: u64,
}

impl Transaction {
    /// Signed effect of this transaction on `user`'s balance.
    pub fn delta_for(&self, user: &str) -> i64 {
        let amount = i64::try_from(self.amount).unwrap_or(i64::MAX);
        match (self.from_user.as_deref(), self.to_user.as_deref()) {
            (Some(from), _) if from == user => -amount,
            (_, Some(to)) if to == user => amount,
            _ => 0,
        }
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AccountInvariantError {
    #[error("balance does not match earned minus spent (balance={balance}, earned={earned}, spent={spent})")]
    BalanceMismatch { balance: u64, earned: u64, spent: u64 },
}

/// A user's balance row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub balance: u64,
    pub total_earned: u64,
    pub total_spent: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Account {
    pub fn validate_invariants(&self) -> Result<(), AccountInvariantError> {
        if self.total_earned.checked_sub(self.total_spent) != Some(self.balance) {
            return Err(AccountInvariantError::BalanceMismatch {
                balance: self.balance,
                earned: self.total_earned,
                spent: self.total_spent,
            });
        }
        Ok(())
    }
}
