use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors. Record-local and file-local problems are logged
/// and skipped instead; only cross-stage contract violations end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no records survived merging, output file not written")]
    EmptyMerge,

    #[error("partition file not found: {0}")]
    MissingPartition(PathBuf),

    #[error("{stage}: expected shape {expected}, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
