use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::openai::{ApiError, JobStatus};

#[derive(Debug, Error)]
pub enum SoraError {
    #[error("Invalid JSON on line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    #[error("Invalid job at line {index}: {reason}")]
    InvalidJobRecord { index: usize, reason: String },

    #[error("No jobs found in input file.")]
    EmptyBatch,

    #[error("Too many jobs ({count}). Max is {max}.")]
    BatchTooLarge { count: usize, max: usize },

    #[error("{field} must be one of: {allowed} (got {value:?})")]
    InvalidPayload {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("{0}")]
    InvalidOption(String),

    #[error("Input reference not found: {}", .0.display())]
    InputReferenceNotFound(PathBuf),

    #[error("Timed out after {:.1}s waiting for {id}", .timeout.as_secs_f64())]
    PollTimeout { id: String, timeout: Duration },

    #[error("Video {id} status is {status}; download is available only after completion.")]
    DownloadState { id: String, status: JobStatus },

    #[error("Could not determine video id from create response.")]
    MissingJobId,

    #[error("Output exists: {} (use --force to overwrite)", .0.display())]
    OutputExists(PathBuf),

    #[error("OPENAI_API_KEY is not set. Export it before running.")]
    MissingApiKey,

    #[error("Job canceled before it was submitted.")]
    Canceled,

    #[error("Video API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SoraError {
    pub(crate) fn invalid_payload(field: &'static str, value: &str, allowed: &[&str]) -> Self {
        SoraError::InvalidPayload {
            field,
            value: value.to_string(),
            allowed: allowed.join(", "),
        }
    }
}
