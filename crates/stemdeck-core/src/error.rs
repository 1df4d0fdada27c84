use thiserror::Error;

use crate::session::{Action, Stage};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("unsupported audio format: {extension:?}")]
    UnsupportedFormat { extension: Option<String> },
    #[error("upload payload is empty")]
    EmptyPayload,
    #[error("upload payload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("upload transport failed: {0}")]
    Transport(String),
    #[error("upload rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SeparationError {
    #[error("separation transport failed: {0}")]
    Transport(String),
    #[error("separation rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("separation response is missing stems")]
    MissingStems,
    #[error("malformed separation response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Repository(#[from] StemRepositoryError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation transport failed: {0}")]
    Transport(String),
    #[error("generation rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("generation reported failure: {0}")]
    Unsuccessful(String),
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Repository(#[from] StemRepositoryError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to fetch audio from {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("unsupported audio stream: {0}")]
    Unsupported(String),
    #[error("corrupt audio stream: {0}")]
    Corrupt(String),
    #[error("decoded zero samples")]
    Empty,
    #[error("decode task did not finish: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback resource unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed to start for {path}: {message}")]
    StartFailed { path: String, message: String },
}

#[derive(Debug, Error)]
#[error("malformed drag payload: {0}")]
pub struct PayloadParseError(#[from] pub serde_json::Error);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StemRepositoryError {
    #[error("stem path already present in collection: {0}")]
    DuplicatePath(String),
}

/// Errors surfaced by the workflow orchestrator. Only the stage errors carry
/// a user-visible signal; the others reject the call without touching state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{action} is not valid while the session is {stage}")]
    InvalidTransition { action: Action, stage: Stage },
    #[error("{0} is already in progress")]
    Busy(Action),
    #[error("generate requires an assigned stem and at least one style")]
    GenerateDisabled,
    #[error("{0} completion discarded because the session was replaced")]
    Superseded(Action),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Separation(#[from] SeparationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
