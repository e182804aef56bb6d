// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! JSON request surface used by the web front end.
//!
//! One request per call, tagged by `op`. Payloads are closed: an unknown
//! field is a rejected request, not a silently ignored one.

use super::Session;
use super::allocations::{AllocationOutcome, NewAllocation, allocate};
use super::donors::{NewDonation, NewDonor, PostedDonation, create_donor, post_to_gl, record_donation};
use super::endowments::{NewFund, NewInvestment, add_investment, create_fund};
use super::fees::{BulkAction, BulkOutcome, NewFee, bulk_action, create_fee, set_fee_status};
use super::gl::{NewAccount, NewJournalEntry, create_account, post_journal_entry};
use super::payments::{NewPayment, record_payment};
use super::penalties::{PenaltyRun, calculate_penalties};
use super::plans::{NewPlan, create_plan};
use super::scholarships::{NewAward, NewScholarshipType, award_scholarship, create_type};
use super::structures::{AssignStructure, NewFeeStructure, assign_structure, create_structure};
use crate::error::{ErrorReport, Result};
use crate::models::{
    ChartOfAccount, Donation, Donor, EndowmentFund, FeeStatus, FeeStructure, Investment,
    JournalEntry, Payment, PaymentPlan, ScholarshipType, StudentFee, StudentScholarship,
};
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetFeeStatus {
    pub fee_id: i64,
    pub status: FeeStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BulkFees {
    pub action: BulkAction,
    #[serde(alias = "ids")]
    pub fee_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalculatePenalties {}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PostDonation {
    pub donation_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    CreateFeeStructure(NewFeeStructure),
    AssignFeeStructure(AssignStructure),
    CreateFee(NewFee),
    SetFeeStatus(SetFeeStatus),
    BulkFees(BulkFees),
    CalculatePenalties(CalculatePenalties),
    CreatePayment(NewPayment),
    CreateAllocation(NewAllocation),
    CreatePaymentPlan(NewPlan),
    CreateScholarshipType(NewScholarshipType),
    CreateStudentScholarship(NewAward),
    CreateDonor(NewDonor),
    CreateDonation(NewDonation),
    PostDonation(PostDonation),
    CreateEndowmentFund(NewFund),
    CreateInvestment(NewInvestment),
    CreateAccount(NewAccount),
    CreateJournalEntry(NewJournalEntry),
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::CreateFeeStructure(_) => "create-fee-structure",
            Request::AssignFeeStructure(_) => "assign-fee-structure",
            Request::CreateFee(_) => "create-fee",
            Request::SetFeeStatus(_) => "set-fee-status",
            Request::BulkFees(_) => "bulk-fees",
            Request::CalculatePenalties(_) => "calculate-penalties",
            Request::CreatePayment(_) => "create-payment",
            Request::CreateAllocation(_) => "create-allocation",
            Request::CreatePaymentPlan(_) => "create-payment-plan",
            Request::CreateScholarshipType(_) => "create-scholarship-type",
            Request::CreateStudentScholarship(_) => "create-student-scholarship",
            Request::CreateDonor(_) => "create-donor",
            Request::CreateDonation(_) => "create-donation",
            Request::PostDonation(_) => "post-donation",
            Request::CreateEndowmentFund(_) => "create-endowment-fund",
            Request::CreateInvestment(_) => "create-investment",
            Request::CreateAccount(_) => "create-account",
            Request::CreateJournalEntry(_) => "create-journal-entry",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    FeeStructure(FeeStructure),
    Fee(StudentFee),
    Bulk(BulkOutcome),
    Penalties(PenaltyRun),
    Payment(Payment),
    Allocation(AllocationOutcome),
    Plan(PaymentPlan),
    ScholarshipType(ScholarshipType),
    Award(StudentScholarship),
    Donor(Donor),
    Donation(Donation),
    Posted(PostedDonation),
    Fund(EndowmentFund),
    Investment(Investment),
    Account(ChartOfAccount),
    JournalEntry(JournalEntry),
}

pub fn execute(conn: &mut Connection, req: &Request, session: &Session) -> Result<Response> {
    let op = &session.operator;
    let today = session.today;
    tracing::debug!(op = req.op(), operator = %op.name, "exec request");
    Ok(match req {
        Request::CreateFeeStructure(r) => Response::FeeStructure(create_structure(conn, r)?),
        Request::AssignFeeStructure(r) => Response::Fee(assign_structure(conn, r, today)?),
        Request::CreateFee(r) => Response::Fee(create_fee(conn, r, today)?),
        Request::SetFeeStatus(r) => Response::Fee(set_fee_status(conn, r.fee_id, r.status, op, today)?),
        Request::BulkFees(r) => Response::Bulk(bulk_action(conn, r.action, &r.fee_ids, op, today)?),
        Request::CalculatePenalties(_) => Response::Penalties(calculate_penalties(conn, today)?),
        Request::CreatePayment(r) => Response::Payment(record_payment(conn, r)?),
        Request::CreateAllocation(r) => Response::Allocation(allocate(conn, r, op, today)?),
        Request::CreatePaymentPlan(r) => Response::Plan(create_plan(conn, r)?),
        Request::CreateScholarshipType(r) => Response::ScholarshipType(create_type(conn, r)?),
        Request::CreateStudentScholarship(r) => Response::Award(award_scholarship(conn, r, today)?),
        Request::CreateDonor(r) => Response::Donor(create_donor(conn, r)?),
        Request::CreateDonation(r) => Response::Donation(record_donation(conn, r)?),
        Request::PostDonation(r) => Response::Posted(post_to_gl(conn, r.donation_id)?),
        Request::CreateEndowmentFund(r) => Response::Fund(create_fund(conn, r)?),
        Request::CreateInvestment(r) => Response::Investment(add_investment(conn, r)?),
        Request::CreateAccount(r) => Response::Account(create_account(conn, r)?),
        Request::CreateJournalEntry(r) => Response::JournalEntry(post_journal_entry(conn, r)?),
    })
}

/// Parse one request document. Malformed input becomes a validation report.
pub fn parse_request(input: &str) -> std::result::Result<Request, ErrorReport> {
    serde_json::from_str(input).map_err(|e| {
        crate::error::FinanceError::validation(format!("Invalid request: {}", e)).report()
    })
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, session: &Session) -> anyhow::Result<()> {
    let path = m.get_one::<String>("file").unwrap();
    let input = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Read request {}", path))?
    };
    let req = match parse_request(&input) {
        Ok(r) => r,
        Err(report) => {
            eprintln!("{}", serde_json::to_string(&report)?);
            anyhow::bail!("{}", report.message);
        }
    };
    match execute(conn, &req, session) {
        Ok(resp) => {
            println!("{}", serde_json::to_string_pretty(&resp)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string(&err.report())?);
            Err(anyhow::Error::new(err).context(format!("{} failed", req.op())))
        }
    }
}
