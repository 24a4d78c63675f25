//! File-system tools (§4.4): all paths are validated against the task's
//! project directory via [`path::resolve_path_under`] before use.

mod create_file;
mod edit_file;
mod find_file;
mod grep;
mod list_files;
pub mod path;
mod read_file;

pub use create_file::{CreateFileTool, TOOL_CREATE_FILE};
pub use edit_file::{EditFileTool, TOOL_EDIT_FILE};
pub use find_file::{FindFileTool, TOOL_FIND_FILE};
pub use grep::{GrepTool, TOOL_GREP};
pub use list_files::{ListFilesTool, TOOL_LIST_FILES};
pub use read_file::{ReadFileTool, TOOL_READ_FILE};
