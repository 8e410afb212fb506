//! Shared application state, captured once at startup.

use crate::config::ServerConfig;
use crate::executor::Executor;
use crate::result::round_secs;
use std::sync::Arc;
use std::time::Instant;

/// Read-only context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub executor: Arc<Executor>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, executor: Executor) -> Self {
        Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
            started_at: Instant::now(),
        }
    }

    /// Seconds since startup, rounded to two decimals.
    pub fn uptime_secs(&self) -> f64 {
        round_secs(self.started_at.elapsed().as_secs_f64())
    }
}
