//! Path validation for file tools: resolve a path under the task's project root
//! and reject any attempt to escape it.

use std::path::{Component, Path, PathBuf};

use crate::tools::ToolError;

fn normalize_path(path: &Path) -> PathBuf {
    let mut buf = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => buf = PathBuf::from(p.as_os_str()),
            Component::RootDir => buf.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                buf.pop();
            }
            Component::Normal(s) => buf.push(s),
        }
    }
    buf
}

/// Resolves `path_param` relative to `fs_root`, ensuring the result stays under it.
pub fn resolve_path_under(fs_root: &Path, path_param: &str) -> Result<PathBuf, ToolError> {
    let base = fs_root.canonicalize().map_err(|e| {
        ToolError::new(format!("project directory not found: {e}"))
    })?;

    let path_param = path_param.trim();
    let path_param = if path_param.is_empty() { "." } else { path_param };
    let joined = base.join(path_param);
    let normalized = normalize_path(&joined);

    if !normalized.starts_with(&base) {
        return Err(ToolError::new("path is outside the project directory")
            .with_suggestion("use a path relative to the project root"));
    }

    if normalized.exists() {
        normalized
            .canonicalize()
            .map_err(|e| ToolError::new(format!("failed to resolve path: {e}")))
    } else {
        Ok(normalized)
    }
}
