//! File read tool, confined to a sandbox root.

use async_trait::async_trait;
use ferroact_core::error::ToolError;
use ferroact_core::tool::{ParameterDefinition, ParameterType, Tool, ToolArgs};
use std::collections::BTreeMap;

use crate::sandbox::Sandbox;

/// Files larger than this are truncated.
const DEFAULT_MAX_BYTES: u64 = 64 * 1024;

pub struct FileReadTool {
    sandbox: Sandbox,
}

impl FileReadTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file inside the workspace directory."
    }

    fn parameters(&self) -> BTreeMap<String, ParameterDefinition> {
        BTreeMap::from([
            (
                "path".to_string(),
                ParameterDefinition::new(ParameterType::String, "File path relative to the workspace root")
                    .required()
                    .with_range(Some(1.0), None),
            ),
            (
                "max_bytes".to_string(),
                ParameterDefinition::new(ParameterType::Long, "Maximum number of bytes to return")
                    .with_default(serde_json::json!(DEFAULT_MAX_BYTES))
                    .with_range(Some(1.0), None),
            ),
        ])
    }

    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value, ToolError> {
        let requested = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let max_bytes = args
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_BYTES) as usize;

        let path = self.sandbox.resolve(requested).map_err(|e| ToolError::PermissionDenied {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot read '{requested}': {e}")))?;

        let truncated = bytes.len() > max_bytes;
        let mut content = String::from_utf8_lossy(&bytes[..bytes.len().min(max_bytes)]).into_owned();
        if truncated {
            content.push_str("\n[truncated]");
        }
        tracing::debug!(path = %path.display(), bytes = bytes.len(), truncated, "File read");
        Ok(serde_json::Value::String(content))
    }
}
