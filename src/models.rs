// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::FinanceError;
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of lowercase strings stored as TEXT and exchanged as JSON.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = FinanceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let norm = s.trim().to_ascii_lowercase().replace('-', "_");
                match norm.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(FinanceError::Validation(format!(
                        "Unknown {} '{}' (expected one of: {})",
                        stringify!($name),
                        s.trim(),
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: FinanceError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(FeeType {
    Tuition => "tuition",
    Registration => "registration",
    Library => "library",
    Laboratory => "laboratory",
    Examination => "examination",
    Hostel => "hostel",
    Transport => "transport",
    Activity => "activity",
    Late => "late",
    Other => "other",
});

text_enum!(FeeStatus {
    Pending => "pending",
    Partial => "partial",
    Paid => "paid",
    Overdue => "overdue",
});

text_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    BankTransfer => "bank_transfer",
    Cheque => "cheque",
    Online => "online",
});

text_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

text_enum!(PlanFrequency {
    Monthly => "monthly",
    Quarterly => "quarterly",
});

text_enum!(PlanStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(InstallmentStatus {
    Pending => "pending",
    Paid => "paid",
});

text_enum!(AmountType {
    Fixed => "fixed",
    Percentage => "percentage",
});

text_enum!(AwardStatus {
    Active => "active",
    Suspended => "suspended",
    Revoked => "revoked",
});

text_enum!(DisbursementType {
    FeeCredit => "fee_credit",
    DirectPayment => "direct_payment",
    Stipend => "stipend",
});

text_enum!(DonorType {
    Individual => "individual",
    Alumni => "alumni",
    Corporate => "corporate",
    Foundation => "foundation",
    Government => "government",
    Other => "other",
});

text_enum!(AccountType {
    Asset => "asset",
    Liability => "liability",
    Equity => "equity",
    Revenue => "revenue",
    Expense => "expense",
});

text_enum!(NormalBalance {
    Debit => "debit",
    Credit => "credit",
});

text_enum!(AuditAction {
    AdministrativeClear => "administrative_clear",
    Delete => "delete",
});

impl FeeStatus {
    /// Status of an invoice on `today`. Partial payments are never reported
    /// overdue; paid is terminal.
    pub fn derive(amount: i64, paid_amount: i64, due_date: NaiveDate, today: NaiveDate) -> Self {
        if paid_amount >= amount {
            FeeStatus::Paid
        } else if paid_amount > 0 {
            FeeStatus::Partial
        } else if due_date < today {
            FeeStatus::Overdue
        } else {
            FeeStatus::Pending
        }
    }
}

impl PlanFrequency {
    pub fn months(self) -> u32 {
        match self {
            PlanFrequency::Monthly => 1,
            PlanFrequency::Quarterly => 3,
        }
    }
}

impl AccountType {
    pub fn normal_balance(self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    pub id: i64,
    pub class_id: Option<i64>,
    pub program_id: Option<i64>,
    pub fee_type: FeeType,
    pub amount: i64,
    pub is_per_credit: bool,
    pub academic_period_id: Option<i64>,
    pub due_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentFee {
    pub id: i64,
    pub student_id: i64,
    pub fee_structure_id: Option<i64>,
    pub fee_type: FeeType,
    pub amount: i64,
    pub paid_amount: i64,
    pub status: FeeStatus,
    pub due_date: NaiveDate,
    pub description: String,
    pub notes: Option<String>,
    pub penalty_of: Option<i64>,
}

impl StudentFee {
    pub fn balance(&self) -> i64 {
        self.amount - self.paid_amount
    }

    pub fn status_on(&self, today: NaiveDate) -> FeeStatus {
        FeeStatus::derive(self.amount, self.paid_amount, self.due_date, today)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeAuditEntry {
    pub id: i64,
    pub student_fee_id: i64,
    pub action: AuditAction,
    pub previous_status: FeeStatus,
    pub previous_paid_amount: i64,
    pub operator: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub student_id: i64,
    pub amount: i64,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: i64,
    pub payment_id: i64,
    pub student_fee_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: i64,
    pub student_id: i64,
    pub total_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: PlanFrequency,
    pub status: PlanStatus,
    pub installments: Vec<Installment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: i64,
    pub status: InstallmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScholarshipType {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub amount_type: AmountType,
    pub amount: Option<i64>,
    pub percentage: Option<i64>, // basis points
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentScholarship {
    pub id: i64,
    pub student_id: i64,
    pub scholarship_type_id: i64,
    pub awarded_amount: i64,
    pub status: AwardStatus,
    pub disbursement_type: DisbursementType,
    pub awarded_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
    pub id: i64,
    pub donor_code: String,
    pub name: String,
    pub donor_type: DonorType,
    pub total_donations: i64,
    pub last_donation_date: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: i64,
    pub donor_id: i64,
    pub amount: i64,
    pub donation_date: NaiveDate,
    pub purpose: String,
    pub payment_method: PaymentMethod,
    pub gl_journal_entry_id: Option<i64>,
}

impl Donation {
    pub fn is_posted(&self) -> bool {
        self.gl_journal_entry_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndowmentFund {
    pub id: i64,
    pub fund_code: String,
    pub fund_name: String,
    pub principal: i64,
    pub spending_rate: i64, // basis points
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: i64,
    pub endowment_fund_id: i64,
    pub name: String,
    pub quantity: Decimal,
    pub cost_basis: i64,
    pub current_price: i64,
    pub current_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOfAccount {
    pub id: i64,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub entry_date: NaiveDate,
    pub memo: String,
    pub source_ref: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> i64 {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> i64 {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: i64,
    pub debit: i64,
    pub credit: i64,
}

/// Who is performing a mutation; elevated operators may use override paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub elevated: bool,
}

impl Operator {
    pub fn clerk(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elevated: false,
        }
    }

    pub fn bursar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elevated: true,
        }
    }

    pub fn require_elevated(&self, action: &str) -> Result<(), FinanceError> {
        if self.elevated {
            Ok(())
        } else {
            Err(FinanceError::PermissionDenied {
                operator: self.name.clone(),
                action: action.to_string(),
            })
        }
    }
}
