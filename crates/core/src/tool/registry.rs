use std::collections::HashMap;

use chatloop_protocol::ToolSpec;
use serde_json::{Value, json};

use crate::tool::{AnyTool, Error, Tool, ToolObject};

/// An object that manages the toolset and handles function-call requests
/// from the model.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Box<dyn ToolObject>>,
}

impl Registry {
    /// Registers a tool.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Box::new(AnyTool(tool)));
    }

    /// Returns the manifest entries for all registered tools.
    pub fn manifest(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| {
                ToolSpec::function(
                    tool.name(),
                    tool.description(),
                    tool.parameter_schema().clone(),
                )
            })
            .collect()
    }

    /// Invokes the named tool and returns the serialized function output.
    ///
    /// Unknown tool names and failed executions both produce a structured
    /// error payload instead of propagating; the caller feeds the result
    /// back to the model as the function output either way, so the model
    /// can recover conversationally.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> String {
        let span = debug_span!("tool dispatch", name);
        let _enter = span.enter();

        let Some(tool) = self.tools.get(name) else {
            warn!("tool not found: {name}");
            return error_payload(&Error::unknown_tool().with_reason(
                format!("no tool named `{name}` is registered"),
            ));
        };
        trace!("invoking with args: {arguments:?}");
        match tool.execute(arguments).await {
            Ok(output) => output,
            Err(err) => {
                warn!("tool `{name}` failed: {}", err.reason());
                error_payload(&err)
            }
        }
    }
}

fn error_payload(err: &Error) -> String {
    json!({
        "error": {
            "kind": err.kind().code(),
            "reason": err.reason(),
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use super::*;
    use crate::tool::ToolResult;

    static EMPTY_SCHEMA: &Value = &Value::Null;

    struct TestTool;

    impl Tool for TestTool {
        type Input = serde_json::Value;

        fn name(&self) -> &str {
            "test_tool"
        }

        fn description(&self) -> &str {
            "A test tool"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok("success".to_owned()))
        }
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = Registry::default();
        registry.add_tool(TestTool);

        let output = registry.dispatch("test_tool", json!({})).await;
        assert_eq!(output, "success");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = Registry::default();
        let output = registry.dispatch("missing_tool", json!({})).await;
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error"]["kind"], "unknown_tool");
    }

    #[test]
    fn test_manifest() {
        let mut registry = Registry::default();
        registry.add_tool(TestTool);
        let manifest = registry.manifest();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].name, "test_tool");
    }
}
