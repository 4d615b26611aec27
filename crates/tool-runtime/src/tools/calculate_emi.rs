//! `calculate_emi`: monthly instalment for a single loan.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use emi_core::LoanTerms;

use super::{forward, loan_terms_properties, parse_input};
use crate::backend::{endpoints, BackendClient};
use crate::tool::{Tool, ToolDefinition, ToolError, ToolResult};

pub struct CalculateEmiTool {
    backend: Arc<BackendClient>,
}

impl CalculateEmiTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CalculateEmiTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculate_emi".to_string(),
            description: "Calculate the equated monthly instalment (EMI) for a single loan."
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
        debug!(
            principal = terms.principal,
            interest_rate = terms.interest_rate,
            tenure = terms.tenure,
            "calculate_emi"
        );
        forward(&self.backend, endpoints::CALCULATE_EMI, &terms).await
    }
}
