//! Directory listing tool, confined to a sandbox root.

use async_trait::async_trait;
use ferroact_core::error::ToolError;
use ferroact_core::tool::{ParameterDefinition, ParameterType, Tool, ToolArgs};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::sandbox::Sandbox;

pub struct FileListTool {
    sandbox: Sandbox,
}

impl FileListTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the entries of a directory inside the workspace directory."
    }

    fn parameters(&self) -> BTreeMap<String, ParameterDefinition> {
        BTreeMap::from([(
            "path".to_string(),
            ParameterDefinition::new(ParameterType::String, "Directory relative to the workspace root")
                .with_default(serde_json::json!(".")),
        )])
    }

    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value, ToolError> {
        let requested = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let dir = self.sandbox.resolve(requested).map_err(|e| ToolError::PermissionDenied {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let read_err = |e: std::io::Error| ToolError::failed("file_list", format!("cannot list '{requested}': {e}"));
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(read_err)?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(read_err)? {
            let metadata = entry.metadata().await.map_err(read_err)?;
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        serde_json::to_value(entries).map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "12345").unwrap();
        std::fs::write(dir.path().join("a.txt"), "1").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tool = FileListTool::new(Sandbox::new(dir.path()).unwrap());

        let value = tool.execute(args(json!({"path": "."}))).await.unwrap();
        let names: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(value[1]["size"], json!(5));
        assert_eq!(value[2]["is_dir"], json!(true));
    }

    #[tokio::test]
    async fn escape_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileListTool::new(Sandbox::new(dir.path()).unwrap());

        let err = tool.execute(args(json!({"path": ".."}))).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
