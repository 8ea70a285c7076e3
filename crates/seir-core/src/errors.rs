//! Structured error types shared by the fitting crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SeirError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (component names, dimensions, indices).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for model construction and fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SeirError {
    /// Pre-flight configuration and dimension errors.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Worker pool failures during a dispatch.
    #[error("dispatch error: {0}")]
    Dispatch(ErrorInfo),
    /// Errors raised by, or contract violations of, the simulation kernel.
    #[error("kernel error: {0}")]
    Kernel(ErrorInfo),
    /// Fatal conditions of the sampling loop (stalls, exhausted proposals).
    #[error("sampling error: {0}")]
    Sampling(ErrorInfo),
    /// Serialization, parsing and filesystem errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SeirError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SeirError::Config(info)
            | SeirError::Dispatch(info)
            | SeirError::Kernel(info)
            | SeirError::Sampling(info)
            | SeirError::Serde(info) => info,
        }
    }

    /// Shorthand for a [`SeirError::Config`] with the given code and message.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        SeirError::Config(ErrorInfo::new(code, message))
    }
}
