//! Error types for the subtraction pipeline and the scan service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which of the two uploaded images an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    Mask,
    Contrast,
}

impl std::fmt::Display for InputRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputRole::Mask => f.write_str("mask"),
            InputRole::Contrast => f.write_str("contrast"),
        }
    }
}

/// Failures of a single pipeline invocation. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode {input} image: {source}")]
    Decode {
        input: InputRole,
        #[source]
        source: image::ImageError,
    },

    #[error("{input} image has zero width or height")]
    EmptyImage { input: InputRole },

    #[error("{input} image exceeds input limits: {reason}")]
    InputTooLarge { input: InputRole, reason: String },

    #[error("cannot resample to a {width}x{height} target")]
    Alignment { width: u32, height: u32 },

    #[error("step '{step}' requires {missing}, which no earlier step produced")]
    MissingFrame {
        step: String,
        missing: &'static str,
    },

    #[error("failed to encode output image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write debug output: {0}")]
    Debug(String),

    #[error("invalid pipeline parameters: {0}")]
    InvalidParams(String),
}

/// Failures of the upload/reprocess/clear workflow around the pipeline.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("pipeline run exceeded {0:?}")]
    Timeout(std::time::Duration),

    #[error("pipeline worker failed: {0}")]
    WorkerFailed(String),

    #[error("no retained mask and contrast images for owner {owner}")]
    NothingToReprocess { owner: i64 },
}
