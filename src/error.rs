use crate::{lexer::LexicalError, repository::RepositoryError, schedule::ScheduleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("failed to lex the expression with {0}")]
    Lexical(LexicalError),
    #[error("undefined operand {0} in expression")]
    UndefinedOperand(char),
    #[error("at least one operand should be in expression")]
    Empty,
    #[error("failed to parse expression")]
    Malformed,
    #[error("failed to encode the operator parameters: {0}")]
    Encoding(serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("invalid constraint name '{0}'")]
    InvalidName(String),
    #[error("invalid parameters for '{name}' constraint: {source}")]
    InvalidParameters {
        name: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),
    #[error("'{name}' constraint is invalid: {reason}")]
    Validation { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("flags have not been loaded yet")]
    NotReady,
    #[error("failed to load the flags with {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("invalid {field} '{value}'")]
    InvalidName { field: &'static str, value: String },
    #[error("invalid constraint '{operand}': {source}")]
    Operand {
        operand: String,
        source: ConstraintError,
    },
    #[error("invalid expression: {0}")]
    Expression(#[from] ExpressionError),
    #[error("invalid segment constraint: {0}")]
    Constraint(#[from] ConstraintError),
    #[error("segment {index} is invalid: {source}")]
    Segment {
        index: usize,
        source: Box<DefinitionError>,
    },
    #[error("failed to encode the flag with {0}")]
    Encoding(#[from] serde_json::Error),
}
