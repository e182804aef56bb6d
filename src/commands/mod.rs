// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod structures;
pub mod fees;
pub mod payments;
pub mod allocations;
pub mod penalties;
pub mod plans;
pub mod scholarships;
pub mod donors;
pub mod endowments;
pub mod gl;
pub mod api;
pub mod exporter;
pub mod doctor;
pub mod settings;

use crate::models::Operator;
use chrono::NaiveDate;

/// Per-invocation context handed to every mutating handler.
#[derive(Debug, Clone)]
pub struct Session {
    pub operator: Operator,
    pub today: NaiveDate,
    pub currency: String,
}

impl Session {
    pub fn new(operator: Operator, today: NaiveDate) -> Self {
        Self {
            operator,
            today,
            currency: "USD".into(),
        }
    }
}
