//! Searches file contents for a regex pattern, walking the project tree while
//! honoring `.gitignore` (via the `ignore` crate) and matching lines with
//! `grep-regex`/`grep-searcher`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use grep_regex::RegexMatcher;
use grep_searcher::sinks::UTF8;
use grep_searcher::Searcher;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

use super::path::resolve_path_under;

pub const TOOL_GREP: &str = "grep";

pub struct GrepTool;

#[derive(Deserialize)]
struct Args {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_matches: Option<usize>,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        TOOL_GREP
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GREP.into(),
            description: "Searches file contents under a path in the project for a regex pattern.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string", "description": "defaults to the project root"},
                    "max_matches": {"type": "integer"}
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        let rel = args.path.unwrap_or_default();
        let root = resolve_path_under(&session.fs_root, &rel)?;
        let fs_root = session.fs_root.clone();
        let pattern = args.pattern.clone();
        let max_matches = args.max_matches.unwrap_or(200);

        let lines = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ToolError> {
            let matcher = RegexMatcher::new(&pattern)
                .map_err(|e| ToolError::new(format!("invalid pattern: {e}")))?;
            let mut results = Vec::new();

            for entry in ignore::WalkBuilder::new(&root).build().filter_map(Result::ok) {
                if results.len() >= max_matches {
                    break;
                }
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let path = entry.path();
                let rel_display = path.strip_prefix(&fs_root).unwrap_or(path).display().to_string();
                let mut searcher = Searcher::new();
                let _ = searcher.search_path(
                    &matcher,
                    path,
                    UTF8(|line_num, line| {
                        results.push(format!("{rel_display}:{line_num}:{}", line.trim_end()));
                        Ok(results.len() < max_matches)
                    }),
                );
            }
            Ok(results)
        })
        .await
        .map_err(|e| ToolError::new(format!("search failed: {e}")))??;

        Ok(ToolCallContent::text(lines.join("\n")))
    }
}
