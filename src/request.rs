//! Request validation: raw body bytes to a validated [`ExecutionRequest`].

use crate::result::ExecutionResult;
use serde_json::{Map, Value};
use std::time::Duration;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 50_000;

/// Upper bound applied to every timeout, requested or configured.
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Lower bound applied to every timeout.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// A prompt ready to hand to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>, model: Option<String>, timeout_secs: i64) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.filter(|m| !m.is_empty()),
            timeout_secs: clamp_timeout(timeout_secs),
        }
    }

    /// Validate already-typed inputs, as the `run` subcommand supplies them.
    ///
    /// `timeout_secs` falls back to `default_timeout_secs` when absent.
    pub fn validate(
        prompt: String,
        model: Option<String>,
        timeout_secs: Option<i64>,
        default_timeout_secs: i64,
    ) -> Result<Self, ExecutionResult> {
        check_prompt(&prompt)?;
        Ok(Self::new(prompt, model, timeout_secs.unwrap_or(default_timeout_secs)))
    }

    /// Decode and validate a request body.
    ///
    /// `default_timeout_secs` applies when the body carries no
    /// `options.timeout`. Every rejection is a `validation` failure.
    pub fn from_body(body: &[u8], default_timeout_secs: i64) -> Result<Self, ExecutionResult> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| ExecutionResult::validation("Invalid request"))?;
        let Value::Object(fields) = value else {
            return Err(ExecutionResult::validation("Invalid request"));
        };

        let prompt = match fields.get("prompt") {
            Some(Value::String(p)) => p,
            _ => return Err(ExecutionResult::validation("Invalid prompt")),
        };
        check_prompt(prompt)?;

        let empty = Map::new();
        let options = match fields.get("options") {
            None => &empty,
            Some(Value::Object(options)) => options,
            Some(_) => return Err(ExecutionResult::validation("Invalid request")),
        };

        let timeout = match options.get("timeout") {
            None => None,
            Some(raw) => match coerce_timeout(raw) {
                Some(secs) => Some(secs),
                None => return Err(ExecutionResult::validation("Invalid timeout")),
            },
        };

        let model = match options.get("model") {
            None | Some(Value::Null) => None,
            Some(Value::String(m)) => Some(m.clone()),
            Some(_) => return Err(ExecutionResult::validation("Invalid model")),
        };

        Self::validate(prompt.clone(), model, timeout, default_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// First 50 characters of the prompt, for logs.
    pub fn prompt_preview(&self) -> String {
        self.prompt.chars().take(50).collect()
    }
}

/// Prompts must be non-blank and at most [`MAX_PROMPT_CHARS`] characters.
fn check_prompt(prompt: &str) -> Result<(), ExecutionResult> {
    if prompt.trim().is_empty() {
        return Err(ExecutionResult::validation("Invalid prompt"));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ExecutionResult::validation("Prompt too long"));
    }
    Ok(())
}

/// Accept integers, finite floats (truncated) and integer strings.
pub(crate) fn coerce_timeout(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            f.is_finite().then(|| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn clamp_timeout(secs: i64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u64
}
