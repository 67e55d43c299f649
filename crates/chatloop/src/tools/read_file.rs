use std::path::Path;

use chatloop_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

const MAX_LINES: usize = 100;

#[derive(Deserialize, JsonSchema)]
pub struct ReadFileParameters {
    #[schemars(description = "Absolute path to the file.")]
    path: String,
    #[schemars(description = "1-based start line to read from, default to 1.")]
    start_line: Option<usize>,
}

/// A tool for reading file content with line numbers.
pub struct ReadFileTool {
    parameter_schema: Value,
}

impl ReadFileTool {
    /// Creates a new read file tool.
    #[inline]
    pub fn new() -> Self {
        ReadFileTool {
            parameter_schema: schema_for!(ReadFileParameters).to_value(),
        }
    }
}

impl Default for ReadFileTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ReadFileTool {
    type Input = ReadFileParameters;

    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        r#"
Reads a file from an absolute path and returns its content prefixed with line numbers.
Accepts a 1-based start line and returns up to 100 lines."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: ReadFileParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            if !Path::new(&input.path).is_absolute() {
                return Err(ToolError::execution_error()
                    .with_reason("`path` must be absolute"));
            }
            let start_line = input.start_line.unwrap_or(1);
            if start_line == 0 {
                return Err(ToolError::execution_error()
                    .with_reason("`start_line` must be 1-based"));
            }

            let content =
                tokio::fs::read_to_string(&input.path).await.map_err(
                    |err| {
                        ToolError::execution_error()
                            .with_reason(err.to_string())
                    },
                )?;
            Ok(format_section(&input.path, &content, start_line))
        }
    }
}

fn format_section(path: &str, content: &str, start_line: usize) -> String {
    let lines: Vec<&str> = content
        .lines()
        .skip(start_line - 1)
        .take(MAX_LINES)
        .collect();

    let mut result = format!("==> {path} <==\n");
    if !lines.is_empty() {
        let last_line_no = start_line + lines.len() - 1;
        let width = last_line_no.to_string().len();
        for (offset, line) in lines.into_iter().enumerate() {
            let line_no = start_line + offset;
            result.push_str(&format!("{line_no:>width$}: {line}\n"));
        }
    }
    result
}
