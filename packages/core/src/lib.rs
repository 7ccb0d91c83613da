//! Shared, backend-agnostic primitives: path containment (C1), command
//! safety classification (C2), status tracking (C3), and the configuration
//! shapes every backend builds from.

pub mod config;
pub mod path;
pub mod safety;
pub mod status;

pub use path::{join_scope, resolve_within, PathError};
pub use safety::{classify, Classification};
pub use status::{ListenerId, StatusChange, StatusManager};
