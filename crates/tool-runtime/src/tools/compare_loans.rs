//! `compare_loans`: EMI outputs for several loan scenarios in one backend call.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use emi_core::CompareLoansRequest;

use super::{forward, loan_terms_properties, parse_input};
use crate::backend::{endpoints, BackendClient};
use crate::tool::{Tool, ToolDefinition, ToolError, ToolResult};

pub struct CompareLoansTool {
    backend: Arc<BackendClient>,
}

impl CompareLoansTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CompareLoansTool {
    fn definition(&self) -> ToolDefinition {
        let mut scenario_properties = loan_terms_properties();
        scenario_properties.insert(
            "name".to_string(),
            json!({"type": "string", "description": "Label for this scenario"}),
        );

        ToolDefinition {
            name: "compare_loans".to_string(),
            description: "Compare EMI outcomes for multiple loan scenarios in a single call."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "scenarios": {
                        "type": "array",
                        "minItems": 1,
                        "description": "Loan scenarios to compare, in display order",
                        "items": {
                            "type": "object",
                            "properties": scenario_properties,
                            "required": ["name", "principal", "interestRate", "tenure"]
                        }
                    },
                    "calculation_method": {
                        "type": "string",
                        "description": "Default strategy for scenarios that do not set one"
                    }
                },
                "required": ["scenarios"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        let request: CompareLoansRequest = parse_input(input)?;
        let request = request.resolve_methods();
        debug!(scenarios = request.scenarios.len(), "compare_loans");
        forward(&self.backend, endpoints::COMPARE, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[tokio::test]
    async fn test_scenarios_forwarded_in_order_with_default_method() {
        let backend = MockBackend::start().await;
        let tool = CompareLoansTool::new(backend.client());

        tool.execute(json!({
            "scenarios": [
                {"name": "Bank A", "principal": 1000000, "interestRate": 8.4, "tenure": 240},
                {"name": "Bank B", "principal": 1000000, "interestRate": 8.1, "tenure": 240,
                 "calculation_method": "flat"},
                {"name": "Bank C", "principal": 1000000, "interestRate": 8.9, "tenure": 180}
            ],
            "calculation_method": "reducing"
        }))
        .await
        .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/emi/compare");

        let scenarios = requests[0].body["scenarios"].as_array().unwrap();
        let names: Vec<&str> = scenarios.iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Bank A", "Bank B", "Bank C"]);
        assert_eq!(scenarios[0]["calculation_method"], "reducing");
        assert_eq!(scenarios[1]["calculation_method"], "flat");
        assert!(requests[0].body.get("calculation_method").is_none());
    }

    #[tokio::test]
    async fn test_empty_scenarios_left_to_backend() {
        let backend = MockBackend::start().await;
        let tool = CompareLoansTool::new(backend.client());

        tool.execute(json!({"scenarios": []})).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, json!({"scenarios": []}));
    }

    #[tokio::test]
    async fn test_scenarios_not_an_array() {
        let backend = MockBackend::start().await;
        let tool = CompareLoansTool::new(backend.client());

        let err = tool
            .execute(json!({"scenarios": {"name": "solo"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
