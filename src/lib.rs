//! Rule Runner - declarative HTTP API testing
//!
//! Test cases are JSON files describing a request and the expected response. Globals
//! are substituted into the files through `{{{key}}}` and `{{key}}` expressions, the
//! request is executed, and pointer addressed rules validate the response.

pub mod error;
pub mod expression;
pub mod globals;
pub mod template;
pub mod schema;
pub mod rule;
pub mod definition;
pub mod transport;
pub mod engine;
pub mod runner;
pub mod execution;
pub mod reporting;
pub mod loader;
pub mod configuration;
pub mod console;
pub mod cli;
pub mod app;

// Re-export commonly used types
pub use error::{
    DefinitionError, EngineError, ExecutionError, ExpressionError, Result, RuleError, RunnerError,
    TransportError,
};
pub use expression::{Argument, Expression, ExpressionForm, ExpressionMode};
pub use globals::{Generator, GlobalStore, GlobalValue};
pub use template::TemplateResolver;
pub use schema::{JsonSchema, ValidationOutcome, Validator};
pub use rule::Rule;
pub use definition::{ExecutableCase, TestDefinition};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use engine::{Evaluation, ExecutedExchange, RuleEngine};
pub use runner::Runner;
pub use execution::{ExecutionStrategy, ParallelExecutor, SerialExecutor};
pub use reporting::{RuleReport, SuiteStats, TestReport, TestStatus};
pub use loader::{TestFile, TestLoader};
pub use configuration::{Bootstrap, RunnerConfig};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
