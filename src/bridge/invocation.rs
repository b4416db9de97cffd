//! Invocations, correlation ids, and results.

use super::schema::Arguments;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Opaque token pairing a request with its eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single tool call headed for the worker.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub correlation_id: CorrelationId,
    pub tool_name: String,
    pub arguments: Arguments,
    /// Local wait limit. Expiry abandons the wait; it does not cancel the
    /// remote operation.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(tool_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            tool_name: tool_name.into(),
            arguments,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a tool call as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The payload or failure reason.
    pub fn text(&self) -> &str {
        match self {
            Outcome::Success(text) | Outcome::Failure(text) => text,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success(payload) => write!(f, "{}", payload),
            Outcome::Failure(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// The response matching one [`Invocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| CorrelationId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_correlation_id_serializes_as_string() {
        let id = CorrelationId::new();
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value, serde_json::Value::String(id.to_string()));
        let back: CorrelationId = serde_json::from_value(value).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Success("/out/a.mp4".into()).to_string(), "/out/a.mp4");
        assert_eq!(Outcome::Failure("channel closed".into()).to_string(), "Error: channel closed");
    }
}
