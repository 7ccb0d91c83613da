//! `WorkspacedMcpServer` (spec component C10): one `rmcp::ServerHandler`
//! generic over any `Backend`, hand-written in the style of the pack's
//! `ahma_mcp` `AhmaMcpService` — a manual `list_tools`/`call_tool` pair
//! rather than the `kodegen_mcp_tool::Tool` trait abstraction, since that
//! crate's own implementation isn't part of the retrieved reference set.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData as McpError, Implementation,
    ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    ToolsCapability,
};
use rmcp::service::{RequestContext, RoleServer};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use workspaced_backend::{Backend, BackendError, ExecCapable, ExecOptions};

use crate::args::{
    CreateDirectoryArgs, DirectoryTreeArgs, ExecArgs, GetFileInfoArgs, ListDirectoryArgs,
    MoveFileArgs, ReadTextFileArgs, SearchFilesArgs, WriteFileArgs,
};
use crate::tree;

fn schema_for<T: schemars::JsonSchema>() -> Arc<Map<String, Value>> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema).unwrap_or(Value::Null) {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}

fn tool_def(name: &'static str, description: &'static str, schema: Arc<Map<String, Value>>) -> Tool {
    Tool {
        name: name.into(),
        title: Some(name.to_string()),
        icons: None,
        description: Some(description.into()),
        input_schema: schema,
        output_schema: None,
        annotations: None,
        meta: None,
    }
}

fn parse_args<T: DeserializeOwned>(
    arguments: Option<Map<String, Value>>,
    tool_name: &str,
) -> Result<T, McpError> {
    let value = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(value).map_err(|e| {
        McpError::invalid_params(
            format!("invalid arguments for '{tool_name}': {e}"),
            None,
        )
    })
}

/// Maps a backend's stable error tag (spec §7) onto the MCP error code
/// closest to its meaning — mirrors the daemon's own HTTP status mapping
/// in `http.rs` (401/400/500/504), the JSON-RPC-side equivalent of the
/// same table.
fn backend_err(tool_name: &str, e: BackendError) -> McpError {
    let message = format!("{tool_name} failed ({}): {e}", e.tag());
    match e {
        BackendError::PathEscape(_)
        | BackendError::EmptyCommand
        | BackendError::EmptyPath
        | BackendError::DangerousOperation { .. }
        | BackendError::UnsafeCommand { .. } => McpError::invalid_params(message, None),
        BackendError::AuthFailed => McpError::invalid_request(message, None),
        _ => McpError::internal_error(message, None),
    }
}

/// Generic MCP adapter over any `Backend`. `supports_exec` is fixed at
/// construction time via which constructor the caller used, not probed at
/// runtime — see [`WorkspacedMcpServer::new`] and
/// [`WorkspacedMcpServer::new_with_exec`].
pub struct WorkspacedMcpServer<B: Backend> {
    backend: Arc<B>,
    server_name: String,
    supports_exec: bool,
}

impl<B: Backend + 'static> WorkspacedMcpServer<B> {
    /// Builds an adapter that never advertises the `exec` tool, regardless
    /// of what `B::exec` actually does.
    pub fn new(backend: Arc<B>, server_name: impl Into<String>) -> Self {
        Self {
            backend,
            server_name: server_name.into(),
            supports_exec: false,
        }
    }
}

impl<B: ExecCapable + 'static> WorkspacedMcpServer<B> {
    /// Builds an adapter that also advertises `exec` — only callable when
    /// `B: ExecCapable` (spec §9: a compile-time bound, not a runtime probe).
    pub fn new_with_exec(backend: Arc<B>, server_name: impl Into<String>) -> Self {
        Self {
            backend,
            server_name: server_name.into(),
            supports_exec: true,
        }
    }
}

impl<B: Backend + 'static> WorkspacedMcpServer<B> {
    fn tool_table(&self) -> Vec<Tool> {
        let mut tools = vec![
            tool_def(
                "read_text_file",
                "Read the full text contents of a file.",
                schema_for::<ReadTextFileArgs>(),
            ),
            tool_def(
                "write_file",
                "Write text content to a file, creating parent directories as needed.",
                schema_for::<WriteFileArgs>(),
            ),
            tool_def(
                "list_directory",
                "List the entries directly inside a directory.",
                schema_for::<ListDirectoryArgs>(),
            ),
            tool_def(
                "directory_tree",
                "Recursively walk a directory into a nested tree, with a built-in exclude list.",
                schema_for::<DirectoryTreeArgs>(),
            ),
            tool_def(
                "create_directory",
                "Create a directory, optionally along with missing parents.",
                schema_for::<CreateDirectoryArgs>(),
            ),
            tool_def(
                "move_file",
                "Move or rename a file or directory.",
                schema_for::<MoveFileArgs>(),
            ),
            tool_def(
                "search_files",
                "Recursively search for entries whose name contains a pattern.",
                schema_for::<SearchFilesArgs>(),
            ),
            tool_def(
                "get_file_info",
                "Get size, mode, and timestamps for a path.",
                schema_for::<GetFileInfoArgs>(),
            ),
        ];
        if self.supports_exec {
            tools.push(tool_def(
                "exec",
                "Run a shell command against the backend.",
                schema_for::<ExecArgs>(),
            ));
        }
        tools
    }

    async fn dispatch(&self, params: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        let name = params.name.as_ref().to_string();
        let arguments = params.arguments;

        match name.as_str() {
            "read_text_file" => {
                let args: ReadTextFileArgs = parse_args(arguments, &name)?;
                let bytes = self
                    .backend
                    .read(&args.path)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "write_file" => {
                let args: WriteFileArgs = parse_args(arguments, &name)?;
                if let Some(parent) = parent_dir(&args.path) {
                    if !parent.is_empty() {
                        let _ = self.backend.mkdir(&parent, true).await;
                    }
                }
                self.backend
                    .write(&args.path, args.content.as_bytes())
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                Ok(CallToolResult::success(vec![Content::text("ok")]))
            }
            "list_directory" => {
                let args: ListDirectoryArgs = parse_args(arguments, &name)?;
                let names = self
                    .backend
                    .readdir(&args.path)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let json = serde_json::to_string(&names).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            "directory_tree" => {
                let args: DirectoryTreeArgs = parse_args(arguments, &name)?;
                let patterns =
                    tree::effective_excludes(&args.exclude_patterns, args.include_default_excludes);
                let nodes = tree::build_tree(self.backend.as_ref(), &args.path, &patterns)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let json = serde_json::to_string(&nodes).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            "create_directory" => {
                let args: CreateDirectoryArgs = parse_args(arguments, &name)?;
                self.backend
                    .mkdir(&args.path, args.recursive.unwrap_or(true))
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                Ok(CallToolResult::success(vec![Content::text("ok")]))
            }
            "move_file" => {
                let args: MoveFileArgs = parse_args(arguments, &name)?;
                self.backend
                    .rename(&args.src, &args.dst)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                Ok(CallToolResult::success(vec![Content::text("ok")]))
            }
            "search_files" => {
                let args: SearchFilesArgs = parse_args(arguments, &name)?;
                let matches = tree::search_files(self.backend.as_ref(), &args.path, &args.pattern)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let json = serde_json::to_string(&matches).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            "get_file_info" => {
                let args: GetFileInfoArgs = parse_args(arguments, &name)?;
                let stat = self
                    .backend
                    .stat(&args.path)
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let json = serde_json::to_string(&stat).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            "exec" if self.supports_exec => {
                let args: ExecArgs = parse_args(arguments, &name)?;
                let result = self
                    .backend
                    .exec(&args.command, ExecOptions::default())
                    .await
                    .map_err(|e| backend_err(&name, e))?;
                let stdout = match result.stdout {
                    workspaced_backend::ExecOutput::Text(s) => s,
                    workspaced_backend::ExecOutput::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
                };
                Ok(CallToolResult::success(vec![Content::text(stdout)]))
            }
            other => Err(McpError::invalid_params(
                format!("unknown tool '{other}'"),
                None,
            )),
        }
    }
}

fn parent_dir(path: &str) -> Option<String> {
    match path.rsplit_once('/') {
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspaced_backend_memory::MemoryBackend;

    fn args(json: serde_json::Value) -> Option<Map<String, Value>> {
        match json {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        match result.content.first() {
            Some(content) => content.as_text().map(|t| t.text.clone()).unwrap_or_default(),
            None => String::new(),
        }
    }

    #[tokio::test]
    async fn memory_backend_server_never_lists_exec() {
        let backend = Arc::new(MemoryBackend::new());
        let server = WorkspacedMcpServer::new(backend, "memory".to_string());
        let names: Vec<String> = server.tool_table().into_iter().map(|t| t.name.into_owned()).collect();
        assert!(!names.contains(&"exec".to_string()));
        assert!(names.contains(&"read_text_file".to_string()));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_dispatch() {
        let backend = Arc::new(MemoryBackend::new());
        let server = WorkspacedMcpServer::new(backend, "memory".to_string());

        let write = server
            .dispatch(CallToolRequestParam {
                name: "write_file".into(),
                arguments: args(serde_json::json!({"path": "a.txt", "content": "hello"})),
            })
            .await
            .unwrap();
        assert_eq!(text_of(&write), "ok");

        let read = server
            .dispatch(CallToolRequestParam {
                name: "read_text_file".into(),
                arguments: args(serde_json::json!({"path": "a.txt"})),
            })
            .await
            .unwrap();
        assert_eq!(text_of(&read), "hello");
    }

    #[tokio::test]
    async fn path_escape_maps_to_invalid_params() {
        let backend = Arc::new(MemoryBackend::new());
        let server = WorkspacedMcpServer::new(backend, "memory".to_string());
        let err = server
            .dispatch(CallToolRequestParam {
                name: "read_text_file".into(),
                arguments: args(serde_json::json!({"path": "../escape"})),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let server = WorkspacedMcpServer::new(backend, "memory".to_string());
        let err = server
            .dispatch(CallToolRequestParam {
                name: "does_not_exist".into(),
                arguments: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }
}

impl<B: Backend + 'static> ServerHandler for WorkspacedMcpServer<B> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: self.server_name.clone(),
                title: Some(self.server_name.clone()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: None,
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: self.tool_table(),
                next_cursor: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move { self.dispatch(params).await }
    }
}
