//! `calculate_schedule`: amortization schedule for a loan.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use emi_core::LoanTerms;

use super::{forward, loan_terms_properties, parse_input};
use crate::backend::{endpoints, BackendClient};
use crate::tool::{Tool, ToolDefinition, ToolError, ToolResult};

pub struct CalculateScheduleTool {
    backend: Arc<BackendClient>,
}

impl CalculateScheduleTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CalculateScheduleTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculate_schedule".to_string(),
            description:
                "Retrieve the month-by-month amortization schedule (principal, interest, balance) for a loan."
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": loan_terms_properties(),
                "required": ["principal", "interestRate", "tenure"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        let terms: LoanTerms = parse_input(input)?;
        debug!(tenure = terms.tenure, "calculate_schedule");
        forward(&self.backend, endpoints::SCHEDULE, &terms).await
    }
}
