use thiserror::Error;

/// Errors surfaced while constructing nodes or resolving their shapes.
///
/// Contract violations such as addressing a missing output slot are not represented here; they
/// panic because they indicate a bug in the calling operator code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IrError {
    #[error("shape inference for {op} failed: {message}")]
    ShapeInference { op: String, message: String },
    #[error("node {op} has no shape and no deferred shape function")]
    ShapeUnavailable { op: String },
    #[error("shape of node {op} has already been assigned")]
    ShapeAlreadySet { op: String },
    #[error("node {op} declares {num_outputs} outputs but its shape has {tuple_len}")]
    OutputArity {
        op: String,
        num_outputs: usize,
        tuple_len: usize,
    },
    #[error("expected a graph node but {op} is not part of the lazy IR node family")]
    NotGraphNode { op: String },
    #[error("node {op} is not of the requested operator type {expected}")]
    UnexpectedOperator { op: String, expected: &'static str },
    #[error("invalid configuration value {value:?} for {key}")]
    InvalidConfig { key: String, value: String },
}

pub type IrResult<T> = std::result::Result<T, IrError>;
