use thiserror::Error;

use sn_tensor::TensorError;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("missing variable: {0}")]
    MissingVariable(String),
    #[error("failed to load variables from {source_location}: {reason}")]
    LoadFailure {
        source_location: String,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("{0}")]
    Other(String),
}

impl ModelError {
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, ModelError::Tensor(err) if err.is_shape_mismatch())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
