//! EMI tool implementations.
//!
//! Each tool deserializes its arguments into a typed request from
//! `emi_core` and forwards it to exactly one backend endpoint. The backend
//! owns validation and all EMI math; nothing here computes.

pub mod calculate_emi;
pub mod calculate_schedule;
pub mod compare_loans;
pub mod calculate_with_prepayment;

pub use calculate_emi::CalculateEmiTool;
pub use calculate_schedule::CalculateScheduleTool;
pub use compare_loans::CompareLoansTool;
pub use calculate_with_prepayment::CalculateWithPrepaymentTool;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::registry::{RegistryError, ToolRegistry};
use crate::tool::{ToolError, ToolResult};

/// Register all four EMI tools against one shared backend client.
pub fn register_emi_tools(
    registry: &mut ToolRegistry,
    backend: Arc<BackendClient>,
) -> Result<(), RegistryError> {
    registry.register(CalculateEmiTool::new(backend.clone()))?;
    registry.register(CalculateScheduleTool::new(backend.clone()))?;
    registry.register(CompareLoansTool::new(backend.clone()))?;
    registry.register(CalculateWithPrepaymentTool::new(backend))?;
    Ok(())
}

fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

async fn forward<B: Serialize>(
    backend: &BackendClient,
    endpoint: &str,
    body: &B,
) -> Result<ToolResult, ToolError> {
    let payload =
        serde_json::to_value(body).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
    let outcome = backend.post_json(endpoint, &payload).await;
    outcome
        .map(ToolResult::from)
        .map_err(|source| ToolError::Backend { source, payload })
}

/// Schema properties for principal, interestRate, tenure and calculation_method.
fn loan_terms_properties() -> Map<String, Value> {
    let properties = json!({
        "principal": {
            "type": "number",
            "exclusiveMinimum": 0,
            "description": "Loan amount"
        },
        "interestRate": {
            "type": "number",
            "minimum": 0,
            "description": "Annual interest rate in percent (e.g. 9.5)"
        },
        "tenure": {
            "type": "integer",
            "minimum": 1,
            "description": "Loan tenure in months"
        },
        "calculation_method": {
            "type": "string",
            "description": "Backend calculation strategy (for example \"reducing\")"
        }
    });
    match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
