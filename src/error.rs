// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Domain errors for every finance operation.
//!
//! Each variant maps to a stable `kind` string so callers can render a
//! structured `{ kind, message }` report without matching on messages.

use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FinanceError>;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(
        "allocation of {requested} exceeds the unallocated payment balance of {available}"
    )]
    InsufficientPaymentBalance { requested: i64, available: i64 },

    #[error("fee {fee_id} is already fully paid")]
    FeeAlreadySettled { fee_id: i64 },

    #[error("allocation of {requested} exceeds the remaining fee balance of {remaining}")]
    OverAllocation { requested: i64, remaining: i64 },

    #[error("fees with recorded allocations cannot be deleted: {fee_ids:?}")]
    FeeHasAllocations { fee_ids: Vec<i64> },

    #[error("payment {payment_id} has allocations and cannot be refunded")]
    PaymentHasAllocations { payment_id: i64 },

    #[error("donation {donation_id} is already posted as journal entry {journal_entry_id}")]
    AlreadyPosted {
        donation_id: i64,
        journal_entry_id: i64,
    },

    #[error("journal entry is unbalanced: debits {debits} != credits {credits}")]
    UnbalancedEntry { debits: i64, credits: i64 },

    #[error("journal line {index}: {reason}")]
    InvalidJournalLine { index: usize, reason: String },

    #[error("duplicate {entity} code '{code}'")]
    DuplicateCode { entity: &'static str, code: String },

    #[error("{account_type} accounts carry a {expected} normal balance, not {requested}")]
    InconsistentNormalBalance {
        account_type: String,
        expected: String,
        requested: String,
    },

    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    #[error("operator '{operator}' is not allowed to {action}")]
    PermissionDenied { operator: String, action: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Broad grouping used by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Invariant,
    Recoverable,
    Permission,
    Storage,
}

/// Wire shape of an error handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl FinanceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FinanceError::Validation(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FinanceError::Validation(_) => "validation",
            FinanceError::NotFound { .. } => "not_found",
            FinanceError::InsufficientPaymentBalance { .. } => "insufficient_payment_balance",
            FinanceError::FeeAlreadySettled { .. } => "fee_already_settled",
            FinanceError::OverAllocation { .. } => "over_allocation",
            FinanceError::FeeHasAllocations { .. } => "fee_has_allocations",
            FinanceError::PaymentHasAllocations { .. } => "payment_has_allocations",
            FinanceError::AlreadyPosted { .. } => "already_posted",
            FinanceError::UnbalancedEntry { .. } => "unbalanced_entry",
            FinanceError::InvalidJournalLine { .. } => "invalid_journal_line",
            FinanceError::DuplicateCode { .. } => "duplicate_code",
            FinanceError::InconsistentNormalBalance { .. } => "inconsistent_normal_balance",
            FinanceError::InvalidTransition { .. } => "invalid_transition",
            FinanceError::PermissionDenied { .. } => "permission_denied",
            FinanceError::Storage(_) => "storage",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FinanceError::Validation(_)
            | FinanceError::NotFound { .. }
            | FinanceError::DuplicateCode { .. }
            | FinanceError::InvalidJournalLine { .. } => ErrorCategory::Validation,
            FinanceError::InsufficientPaymentBalance { .. }
            | FinanceError::OverAllocation { .. }
            | FinanceError::FeeHasAllocations { .. }
            | FinanceError::PaymentHasAllocations { .. }
            | FinanceError::UnbalancedEntry { .. }
            | FinanceError::InconsistentNormalBalance { .. }
            | FinanceError::InvalidTransition { .. } => ErrorCategory::Invariant,
            FinanceError::FeeAlreadySettled { .. } | FinanceError::AlreadyPosted { .. } => {
                ErrorCategory::Recoverable
            }
            FinanceError::PermissionDenied { .. } => ErrorCategory::Permission,
            FinanceError::Storage(_) => ErrorCategory::Storage,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            category: self.category(),
            message: self.to_string(),
        }
    }

    /// True when SQLite could not take the write lock in time.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            FinanceError::Storage(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_kind_and_message() {
        let err = FinanceError::OverAllocation {
            requested: 500,
            remaining: 200,
        };
        let report = err.report();
        assert_eq!(report.kind, "over_allocation");
        assert_eq!(report.category, ErrorCategory::Invariant);
        assert!(report.message.contains("200"));
    }
}
