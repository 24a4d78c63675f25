//! Renders an agent's instructions template into the system prompt passed to
//! the provider (§4.6). Discovery of the OS/shell/project tree is best-effort:
//! failures are logged and degrade to an empty placeholder rather than failing
//! the whole render.

use std::path::Path;

use tracing::warn;

use crate::tools::ToolSpec;

const MAX_TREE_DEPTH: usize = 4;
const MAX_TREE_ENTRIES: usize = 200;

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

fn operating_system() -> &'static str {
    std::env::consts::OS
}

/// Walks `project_dir` (bounded depth, `.gitignore`-aware) into a compact,
/// indented tree string.
fn project_structure(project_dir: &Path) -> String {
    let mut builder = ignore::WalkBuilder::new(project_dir);
    builder.max_depth(Some(MAX_TREE_DEPTH));

    let mut lines = Vec::new();
    for entry in builder.build().filter_map(Result::ok) {
        if entry.path() == project_dir {
            continue;
        }
        let depth = entry.depth();
        let name = entry.file_name().to_string_lossy();
        let suffix = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            "/"
        } else {
            ""
        };
        lines.push(format!("{}{}{}", "  ".repeat(depth), name, suffix));
        if lines.len() >= MAX_TREE_ENTRIES {
            lines.push("...".to_string());
            break;
        }
    }
    lines.join("\n")
}

fn tool_instructions(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_names(tools: &[ToolSpec]) -> String {
    tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
}

/// Renders `template` substituting `{working_directory}`, `{operating_system}`,
/// `{default_shell}`, `{project_structure}`, `{tool_instructions}`, `{tools}`
/// and `{dev_tools}`. Unknown placeholders are left as-is.
pub fn assemble(template: &str, project_dir: &Path, tools: &[ToolSpec]) -> String {
    let working_directory = project_dir.display().to_string();

    let structure = if project_dir.is_dir() {
        project_structure(project_dir)
    } else {
        warn!(?project_dir, "project directory missing, skipping tree discovery");
        String::new()
    };

    template
        .replace("{working_directory}", &working_directory)
        .replace("{operating_system}", operating_system())
        .replace("{default_shell}", &default_shell())
        .replace("{project_structure}", &structure)
        .replace("{tool_instructions}", &tool_instructions(tools))
        .replace("{tools}", &tool_names(tools))
        .replace("{dev_tools}", &tool_names(tools))
}
