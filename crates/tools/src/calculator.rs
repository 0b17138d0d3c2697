//! Calculator tool: one binary arithmetic operation per call.

use async_trait::async_trait;
use orchestrator_core::error::ToolError;
use orchestrator_core::tool::Tool;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn display_name(&self) -> &str {
        "Calculator"
    }

    fn description(&self) -> &str {
        "Performs basic arithmetic operations: add, multiply, subtract, divide, power"
    }

    fn icon(&self) -> &str {
        "IconCalculator"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "multiply", "subtract", "divide", "power"],
                    "description": "The arithmetic operation to perform"
                },
                "x": { "type": "number", "description": "First number" },
                "y": { "type": "number", "description": "Second number" }
            },
            "required": ["operation", "x", "y"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;
        let x = number_arg(&arguments, "x")?;
        let y = number_arg(&arguments, "y")?;

        Ok(calculate(operation, x, y))
    }
}

fn number_arg(arguments: &serde_json::Value, key: &str) -> Result<f64, ToolError> {
    arguments[key]
        .as_f64()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number")))
}

/// Apply `operation` and render `"x <op> y = result"`, or an `Error: ...` line.
pub fn calculate(operation: &str, x: f64, y: f64) -> String {
    let (symbol, result) = match operation {
        "add" => ("+", x + y),
        "subtract" => ("-", x - y),
        "multiply" => ("*", x * y),
        "divide" => {
            if y == 0.0 {
                return "Error: Division by zero".into();
            }
            ("/", x / y)
        }
        "power" => {
            return format!("{}^{} = {}", fmt_number(x), fmt_number(y), fmt_number(x.powf(y)));
        }
        other => return format!("Error: Unknown operation '{other}'"),
    };
    format!(
        "{} {symbol} {} = {}",
        fmt_number(x),
        fmt_number(y),
        fmt_number(result)
    )
}

/// Integral values print without a fractional part.
fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
