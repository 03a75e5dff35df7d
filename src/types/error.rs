use std::io;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum S3mirrorError {
    #[error("I/O failure on {path}: {message}")]
    IoFailure { path: String, message: String },
    #[error("object store failure on {key}: {message}")]
    StoreFailure { key: String, message: String },
    #[error("interrupted")]
    Interrupted,
    #[error("both sides changed at the same time: {key}")]
    ComparisonConflict { key: String },
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),
    #[error("a object references a parent directory: {0}")]
    DirectoryTraversal(String),
}

pub fn is_interrupted_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        if let Some(err) = cause.downcast_ref::<S3mirrorError>() {
            return *err == S3mirrorError::Interrupted;
        }
        if let Some(err) = cause.downcast_ref::<io::Error>() {
            return err.kind() == io::ErrorKind::Interrupted;
        }
        false
    })
}

pub fn is_comparison_conflict_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<S3mirrorError>(),
            Some(S3mirrorError::ComparisonConflict { .. })
        )
    })
}

pub fn is_configuration_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<S3mirrorError>(),
            Some(S3mirrorError::ConfigurationError(_))
        )
    })
}
