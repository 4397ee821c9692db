use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a browser driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element not interactable: {selector}: {reason}")]
    NotInteractable { selector: String, reason: String },

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("browser transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Recoverable errors mean "this strategy failed, try the next one".
    /// Everything else indicates the browser itself is gone.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DriverError::NotFound(_)
                | DriverError::NotInteractable { .. }
                | DriverError::Timeout { .. }
                | DriverError::Evaluation(_)
                | DriverError::InvalidSelector(_)
        )
    }
}

/// Page state captured when an operation fails structurally.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Diagnostics {
    pub url: String,
    pub text_sample: String,
    pub screenshot: Option<PathBuf>,
}

/// Failures surfaced to callers of the fill, navigation and recording flows.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("required login field missing: {field} (at {})", .diagnostics.url)]
    MissingLoginField {
        field: &'static str,
        diagnostics: Box<Diagnostics>,
    },

    /// The field was found but no selector for it accepted input.
    #[error("login field {field} rejected every selector: tried {tried:?} (at {})", .diagnostics.url)]
    UnusableLoginField {
        field: &'static str,
        tried: Vec<String>,
        diagnostics: Box<Diagnostics>,
    },

    #[error("all strategies exhausted for {step}: tried {tried:?}")]
    Exhausted { step: String, tried: Vec<String> },

    #[error("action log error: {0}")]
    ActionLog(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::ActionLog(err.to_string())
    }
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::ActionLog(err.to_string())
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;
pub type Result<T> = std::result::Result<T, FlowError>;
