//! Typed tool inputs for the EMI backend.
//!
//! Field names on the wire mirror the tool argument names exactly, so a
//! request body is the caller's arguments minus anything unrecognised.
//! Only structural shape is enforced here; ranges and enum membership are
//! left to the backend.

use std::fmt;

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

/// Principal, annual rate and tenure shared by `calculate_emi` and
/// `calculate_schedule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Loan amount.
    pub principal: f64,
    /// Annual interest rate in percent (e.g. 8.5).
    #[serde(rename = "interestRate")]
    pub interest_rate: f64,
    /// Tenure in months.
    #[serde(deserialize_with = "whole_number")]
    pub tenure: i64,
    /// Backend calculation strategy, e.g. `reducing`. Omitted from the body
    /// when absent so the backend default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<String>,
}

/// One named scenario of a `compare_loans` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanScenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub principal: f64,
    #[serde(rename = "interestRate")]
    pub interest_rate: f64,
    #[serde(deserialize_with = "whole_number")]
    pub tenure: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareLoansRequest {
    pub scenarios: Vec<LoanScenario>,
    /// Default method for scenarios that do not name one. Never sent.
    #[serde(default, skip_serializing)]
    pub calculation_method: Option<String>,
}

impl CompareLoansRequest {
    /// Push the top-level default method down into each scenario that lacks
    /// one. Scenario order is preserved.
    pub fn resolve_methods(mut self) -> Self {
        if let Some(default) = self.calculation_method.take() {
            for scenario in &mut self.scenarios {
                if scenario.calculation_method.is_none() {
                    scenario.calculation_method = Some(default.clone());
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepaymentRequest {
    pub principal: f64,
    #[serde(rename = "interestRate")]
    pub interest_rate: f64,
    #[serde(deserialize_with = "whole_number")]
    pub tenure: i64,
    /// Amount paid on each prepayment event.
    pub prepayment_amount: f64,
    /// `monthly`, `quarterly`, `yearly`, or whatever else the backend accepts.
    pub prepayment_frequency: String,
    /// 1-indexed month of the first prepayment.
    #[serde(deserialize_with = "whole_number")]
    pub prepayment_start_month: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<String>,
}

/// Accept a month count the way JSON Schema's `integer` does: `12`, `12.0`,
/// or a numeric string such as `"12"`. Fractional values are rejected.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserializer.deserialize_any(WholeNumber)
}

struct WholeNumber;

impl<'de> Visitor<'de> for WholeNumber {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a whole number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        // 2^63 is exactly representable; anything at or above it overflows.
        if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Ok(v as i64)
        } else {
            Err(E::invalid_value(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        let trimmed = v.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(n);
        }
        match trimmed.parse::<f64>() {
            Ok(f) => self.visit_f64(f),
            Err(_) => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}
