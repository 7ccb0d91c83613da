//! MCP adapter (spec component C10): turns any `Backend` into an MCP tool
//! server. `server.rs` holds the `ServerHandler` implementation, `args.rs`
//! the per-tool argument shapes, `tree.rs` the `directory_tree`/
//! `search_files` helpers.

pub mod args;
pub mod server;
pub mod tree;

pub use server::WorkspacedMcpServer;
