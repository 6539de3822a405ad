//! Plan stage error types

use thiserror::Error;

use crate::expr::BinaryOp;
use crate::value::Value;

/// Errors produced while evaluating or running plan stages.
///
/// Errors travel through the pipeline as values (see [`crate::Batch::Error`]),
/// so the type is `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error(
        "invalid operation {}({}) {} {}({})",
        .left.type_name(),
        .left,
        .op,
        .right.type_name(),
        .right
    )]
    InvalidOperation {
        left: Value,
        op: BinaryOp,
        right: Value,
    },

    #[error("invalid condition: {}({}) is not a bool", .0.type_name(), .0)]
    NotBoolean(Value),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid argument for {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("unsupported batch type {0}")]
    UnsupportedBatch(String),

    #[error("run Having error: {0}")]
    Having(Box<PlanError>),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Stream processing error: {0}")]
    StreamProcessingError(String),

    /// Opaque failure reported by an upstream stage.
    #[error("{0}")]
    Upstream(String),
}

impl PlanError {
    pub(crate) fn invalid_argument(function: &str, reason: impl Into<String>) -> Self {
        PlanError::InvalidArgument {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}
