//! Error type definitions.

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// GeoIP data directory is missing a required database.
    #[error("GeoIP initialization error: {0}")]
    GeoIpError(String),
}

/// Errors surfaced by the scan pipeline.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Empty target list, unparseable CIDR, or non-IPv4 input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The discovery engine failed; fatal to the scan.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The scan was cancelled via its cancellation token.
    #[error("scan cancelled")]
    Cancelled,
}

/// Errors from the typed message bus adapter.
#[derive(Error, Debug)]
pub enum BusError {
    /// Value could not be encoded or decoded as JSON.
    #[error("message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Underlying transport failed.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended; treated as clean shutdown by consumers.
    #[error("bus closed")]
    Closed,
}

/// Errors from the host repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A service was upserted for a host that does not exist yet.
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// The operation exceeded the configured database timeout.
    #[error("database operation timed out")]
    Timeout,

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored payload could not be decoded.
    #[error("corrupt stored payload: {0}")]
    Corrupt(String),
}

/// Errors from GeoIP enrichment. Fatal to the message being processed.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    #[error("only IPv4 addresses are supported: {0}")]
    NotIpv4(String),
}

/// Errors from notification delivery. Logged and swallowed by callers.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification API returned status {0}")]
    Status(u16),
}

/// Countable error categories reported at the end of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    /// A target argument failed to parse and was skipped.
    InvalidTarget,
    /// A discovered result failed the IPv4/address sanity checks.
    MalformedResult,
    /// Publishing an identified service to the bus failed.
    PublishError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::InvalidTarget => "Invalid target",
            ErrorType::MalformedResult => "Malformed discovery result",
            ErrorType::PublishError => "Publish error",
        }
    }
}
