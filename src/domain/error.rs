use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The backend asked the client to resubmit the task.
    #[error("There was an issue. Please try again.")]
    Backend,

    #[error("The video is still being processed. Please try again later.")]
    TimedOut,

    #[error("Download channel closed: {0}")]
    Interrupted(String),
}

/// Failure to interpret a payload coming from the progress channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("not a percentage: {0:?}")]
    NotANumber(String),

    #[error("percentage out of range: {0}")]
    OutOfRange(f64),

    #[error("invalid channel message: {0}")]
    InvalidMessage(String),
}
