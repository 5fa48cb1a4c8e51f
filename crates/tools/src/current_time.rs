//! Current time tool.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Value, json};
use turnstream_core::{Tool, ToolError};

/// Reports the current time, optionally shifted to a fixed UTC offset.
pub struct CurrentTimeTool;

impl CurrentTimeTool {
    fn render(now: DateTime<Utc>, offset_minutes: i64) -> Result<Value, ToolError> {
        let offset = i32::try_from(offset_minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "utc_offset_minutes out of range: {offset_minutes}"
                ))
            })?;
        let local = now.with_timezone(&offset);
        Ok(json!({
            "iso8601": local.to_rfc3339(),
            "unix_seconds": now.timestamp(),
            "weekday": local.format("%A").to_string(),
        }))
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally pass utc_offset_minutes for a fixed time zone."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_minutes": {
                    "type": "integer",
                    "description": "Offset from UTC in minutes, e.g. 120 for UTC+2"
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let offset = match &input["utc_offset_minutes"] {
            Value::Null => 0,
            v => v.as_i64().ok_or_else(|| {
                ToolError::InvalidArguments("utc_offset_minutes must be an integer".into())
            })?,
        };
        Self::render(Utc::now(), offset)
    }
}
