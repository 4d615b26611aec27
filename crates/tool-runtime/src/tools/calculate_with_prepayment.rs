//! `calculate_with_prepayment`: EMI outcome when regular prepayments reduce principal.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use emi_core::PrepaymentRequest;

use super::{forward, loan_terms_properties, parse_input};
use crate::backend::{endpoints, BackendClient};
use crate::tool::{Tool, ToolDefinition, ToolError, ToolResult};

pub struct CalculateWithPrepaymentTool {
    backend: Arc<BackendClient>,
}

impl CalculateWithPrepaymentTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CalculateWithPrepaymentTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = loan_terms_properties();
        properties.insert(
            "prepayment_amount".to_string(),
            json!({
                "type": "number",
                "exclusiveMinimum": 0,
                "description": "Amount paid on each prepayment event"
            }),
        );
        properties.insert(
            "prepayment_frequency".to_string(),
            json!({
                "type": "string",
                "description": "How often the prepayment recurs, e.g. \"monthly\", \"quarterly\" or \"yearly\""
            }),
        );
        properties.insert(
            "prepayment_start_month".to_string(),
            json!({
                "type": "integer",
                "minimum": 1,
                "description": "Month of the first prepayment (1-indexed)"
            }),
        );

        ToolDefinition {
            name: "calculate_with_prepayment".to_string(),
            description:
                "Calculate EMI adjustments, reduced duration and interest savings from regular prepayments."
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": [
                    "principal",
                    "interestRate",
                    "tenure",
                    "prepayment_amount",
                    "prepayment_frequency",
                    "prepayment_start_month"
                ]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        let request: PrepaymentRequest = parse_input(input)?;
        debug!(
            frequency = %request.prepayment_frequency,
            start_month = request.prepayment_start_month,
            "calculate_with_prepayment"
        );
        forward(&self.backend, endpoints::PREPAYMENT, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::testing::{MockBackend, Mode};

    fn args() -> Value {
        json!({
            "principal": 3000000,
            "interestRate": 8.6,
            "tenure": 240,
            "prepayment_amount": 100000,
            "prepayment_frequency": "yearly",
            "prepayment_start_month": 12,
            "calculation_method": "reducing"
        })
    }

    #[tokio::test]
    async fn test_posts_prepayment_fields() {
        let backend = MockBackend::start().await;
        let tool = CalculateWithPrepaymentTool::new(backend.client());

        let result = tool.execute(args()).await.unwrap();
        assert_eq!(
            result.structured_content.unwrap()["total_payment"],
            104669.64
        );

        let requests = backend.requests();
        assert_eq!(requests[0].path, "/api/emi/prepayment");
        let body = &requests[0].body;
        assert_eq!(body["prepayment_frequency"], "yearly");
        assert_eq!(body["prepayment_start_month"], 12);
        assert_eq!(body["calculation_method"], "reducing");
    }

    #[tokio::test]
    async fn test_unknown_frequency_is_forwarded() {
        let backend = MockBackend::start().await;
        let tool = CalculateWithPrepaymentTool::new(backend.client());

        let mut input = args();
        input["prepayment_frequency"] = json!("fortnightly");
        tool.execute(input).await.unwrap();

        assert_eq!(backend.requests()[0].body["prepayment_frequency"], "fortnightly");
    }

    #[tokio::test]
    async fn test_html_body_is_malformed() {
        let backend = MockBackend::with_mode(Mode::Html).await;
        let tool = CalculateWithPrepaymentTool::new(backend.client());

        let err = tool.execute(args()).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Backend { source: BackendError::MalformedResponse(_), .. }
        ));
    }
}
