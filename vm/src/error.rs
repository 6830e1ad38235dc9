use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("invalid contract program: {0}")]
    InvalidProgram(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("contract call without input")]
    MissingInput,

    #[error("missing parameter: {0}")]
    MissingParam(String),

    #[error("unknown operand reference: {0}")]
    UnknownReference(String),

    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },

    #[error("arithmetic overflow at {key}")]
    Overflow { key: String },

    #[error("arithmetic underflow at {key}")]
    Underflow { key: String },

    #[error("requirement {index} failed")]
    RequireFailed { index: usize },

    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
}
