//! HTTP gateway that runs prompts through an external assistant CLI.
//!
//! One `POST /api/claude` request maps to one subprocess invocation, bounded
//! by a per-request deadline, with every outcome reported as JSON.

#[cfg(not(unix))]
compile_error!("claude-gateway only works on Unix platforms.");

pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod http_server;
pub mod request;
pub mod result;
pub mod state;

pub use config::ServerConfig;
pub use environment::LaunchEnv;
pub use error::GatewayError;
pub use executor::Executor;
pub use request::ExecutionRequest;
pub use result::{ErrorKind, ExecutionResult};
pub use state::AppState;
