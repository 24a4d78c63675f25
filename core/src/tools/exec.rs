//! Shell command execution tool, run under the task's project directory.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_EXECUTE_COMMAND: &str = "execute_command";

pub struct ExecuteCommandTool;

#[derive(Deserialize)]
struct Args {
    command: String,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        TOOL_EXECUTE_COMMAND
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_EXECUTE_COMMAND.into(),
            description: "Executes a shell command in the project directory with an optional \
                          workdir and timeout. Use for git, npm, cargo, etc; prefer read_file/grep/ \
                          edit_file for file access. Returns combined stdout and stderr.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "workdir": {"type": "string", "description": "relative to the project root"},
                    "timeout_ms": {"type": "integer", "default": 120000}
                },
                "required": ["command"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;

        // Parsed only to reject obviously malformed input early; the command itself
        // still runs through the shell so operators like `&&` and `|` work.
        shell_words::split(&args.command)
            .map_err(|e| ToolError::new(format!("unparsable command: {e}")))?;

        let cwd = match &args.workdir {
            Some(dir) => super::file::path::resolve_path_under(&session.fs_root, dir)?,
            None => session.fs_root.clone(),
        };

        let timeout_ms = args.timeout_ms.unwrap_or(120_000);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&args.command).current_dir(&cwd);

        let output = if timeout_ms == 0 {
            cmd.output()
                .await
                .map_err(|e| ToolError::new(format!("failed to run command: {e}")))?
        } else {
            tokio::time::timeout(Duration::from_millis(timeout_ms), cmd.output())
                .await
                .map_err(|_| ToolError::new("command timed out"))?
                .map_err(|e| ToolError::new(format!("failed to run command: {e}")))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let text = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("stderr:\n{stderr}")
        } else {
            format!("stdout:\n{stdout}\nstderr:\n{stderr}")
        };

        Ok(ToolCallContent::text(text))
    }
}
