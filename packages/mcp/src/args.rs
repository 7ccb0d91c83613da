//! Tool input argument shapes (spec §4.10). `JsonSchema`-derived exactly as
//! the teacher's filesystem tool argument structs (e.g. `ListDirectoryArgs`
//! in `tools-filesystem/src/list_directory.rs`) so `schemars::schema_for!`
//! can build each tool's `input_schema` straight from the type.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadTextFileArgs {
    /// Path to the file to read, relative to the backend's root.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Path to the file to write, relative to the backend's root.
    pub path: String,
    /// Full text content to write. Parent directories are created as needed.
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListDirectoryArgs {
    /// Path to the directory to list.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DirectoryTreeArgs {
    /// Path to the directory to walk.
    pub path: String,
    /// Extra names/glob-suffixes to exclude, on top of the built-in list.
    #[serde(default)]
    pub exclude_patterns: Option<Vec<String>>,
    /// Whether to apply the built-in exclude list in addition to
    /// `exclude_patterns`. Defaults to `true`.
    #[serde(default)]
    pub include_default_excludes: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateDirectoryArgs {
    /// Path of the directory to create.
    pub path: String,
    /// Create missing parent directories. Defaults to `true`.
    #[serde(default)]
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MoveFileArgs {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilesArgs {
    /// Directory to search under.
    pub path: String,
    /// Case-insensitive substring matched against each entry's name.
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetFileInfoArgs {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecArgs {
    pub command: String,
}
