use std::time::Duration;
use thiserror::Error;

use crate::transport::HttpResponse;

/// Core error types for the rule runner
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Evaluation error: {0}")]
    Engine(#[from] EngineError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while parsing or materializing a test definition
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Malformed test definition: {0}")]
    MalformedInput(String),

    #[error("Missing required field \"{field}\"")]
    MissingField { field: String },

    #[error("Invalid field \"{field}\": {message}")]
    InvalidField { field: String, message: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl DefinitionError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DefinitionError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True when the failure comes from a reference to a global that is not registered
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(
            self,
            DefinitionError::Expression(ExpressionError::UnknownGlobal { .. })
        )
    }
}

/// Errors raised while parsing expressions or resolving them against the registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Invalid expression \"{0}\"")]
    InvalidExpression(String),

    #[error("Key \"{key}\" not found in globals")]
    UnknownGlobal { key: String },

    #[error("Invalid global key \"{0}\"")]
    InvalidKey(String),

    #[error("Index {index} is out of range for global \"{key}\" of length {length}")]
    IndexOutOfRange { key: String, index: usize, length: usize },

    #[error("Global \"{0}\" is not an array")]
    NotIndexable(String),

    #[error("Global \"{0}\" is not a function")]
    NotCallable(String),

    #[error("Global \"{0}\" is a function, call it as \"{0}()\"")]
    NotAValue(String),

    #[error("Function \"{key}\" failed: {message}")]
    GeneratorFailed { key: String, message: String },
}

/// Rule construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Invalid pointer \"{pointer}\", must start with one of {roots}")]
    InvalidPointer { pointer: String, roots: String },

    #[error("Invalid schema for \"{pointer}\": {message}")]
    InvalidSchema { pointer: String, message: String },

    #[error("Pointer \"{pointer}\" not found in response")]
    PointerNotFound { pointer: String },
}

/// HTTP transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The transport rejected the status code but still carries the response
    #[error("Unexpected status {}", response.status_code)]
    Status { response: Box<HttpResponse> },
}

impl TransportError {
    /// Extract the response embedded in a status error, if any
    pub fn into_response(self) -> std::result::Result<HttpResponse, TransportError> {
        match self {
            TransportError::Status { response } => Ok(*response),
            other => Err(other),
        }
    }
}

/// Errors that abort rule evaluation for a single case
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Expected valid JSON response body: {0}")]
    BodyDecode(String),
}

/// Scheduling errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Unknown dependency \"{dependency}\" declared by {file}")]
    UnknownDependency { file: String, dependency: String },

    #[error("Circular dependency detected between: {0}")]
    CircularDependency(String),

    #[error("Task join error: {0}")]
    Join(String),

    #[error("Execution cancelled by user")]
    Cancelled,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RunnerError>;
