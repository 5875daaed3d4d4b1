//! Tool framework for FerroAct.
//!
//! The [`ToolExecutor`] keeps the registry of named tools, validates call
//! arguments against each tool's declared parameters, and runs tool bodies
//! under the tool-execution bulkhead and time limiter. Built-in tools:
//! calculator, file_read, file_list and web_search.

pub mod calculator;
pub mod executor;
pub mod file_list;
pub mod file_read;
pub mod sandbox;
pub mod validator;
pub mod web_search;

pub use executor::ToolExecutor;
pub use sandbox::{Sandbox, SandboxError};
pub use validator::validate_arguments;

use ferroact_config::ToolsConfig;
use ferroact_resilience::ResilienceRegistry;
use std::path::Path;
use std::sync::Arc;

/// Create an executor with every built-in tool registered.
///
/// The filesystem tools are confined to `config.file_root`, or to the
/// current directory when none is configured.
pub fn default_executor(
    registry: Arc<ResilienceRegistry>,
    config: &ToolsConfig,
) -> Result<ToolExecutor, SandboxError> {
    let root = config.file_root.as_deref().unwrap_or(Path::new("."));
    let sandbox = Sandbox::new(root)?;

    let executor = ToolExecutor::new(registry).with_config(config);
    executor.register_tool(Arc::new(calculator::CalculatorTool), None);
    executor.register_tool(Arc::new(file_read::FileReadTool::new(sandbox.clone())), None);
    executor.register_tool(Arc::new(file_list::FileListTool::new(sandbox)), None);
    executor.register_tool(Arc::new(web_search::WebSearchTool::new()), None);
    Ok(executor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_executor_has_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            file_root: Some(dir.path().to_path_buf()),
            ..ToolsConfig::default()
        };
        let executor = default_executor(Arc::new(ResilienceRegistry::default()), &config).unwrap();

        let names: Vec<String> = executor
            .get_available_tools()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["calculator", "file_list", "file_read", "web_search"]);
        assert!(executor.is_async("web_search"));
    }

    #[tokio::test]
    async fn calculator_through_executor() {
        let executor = Arc::new(
            default_executor(Arc::new(ResilienceRegistry::default()), &ToolsConfig::default())
                .unwrap(),
        );
        let call = ferroact_core::tool::ToolCall::new(
            "calculator",
            serde_json::json!({"expression": "(2 + 3) * 4"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let result = executor.run(&call).await;
        assert!(result.success);
        assert_eq!(result.value, Some(serde_json::json!(20.0)));
    }
}
