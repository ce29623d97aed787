use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ExposureError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for metering sample")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("session aborted: {0}")]
    Abort(AbortReason),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing metering source")]
    MissingMeteringSource,
    #[error("missing register sink")]
    MissingRegisterSink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
