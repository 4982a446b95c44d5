//! Error types for the camera streaming engine.

use std::fmt;

/// Errors that can occur in the streaming engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse): malformed RTSP messages. These
///   are answered with `400 Bad Request` and never close the connection.
/// - **Transport**: [`Io`](Self::Io): socket/network failures. Fatal for the
///   affected connection only, or for [`Server::start`](crate::Server::start)
///   when the listener cannot be bound.
/// - **Resource**: [`Resource`](Self::Resource): a new session, socket pair
///   or thread could not be allocated.
/// - **Pipeline**: [`Pipeline`](Self::Pipeline): the capture/encode pipeline
///   failed to open during start-up.
/// - **Control surface**: [`InvalidConfig`](Self::InvalidConfig),
///   [`AlreadyRunning`](Self::AlreadyRunning),
///   [`StreamDisabled`](Self::StreamDisabled).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A session-scoped resource (UDP sockets, thread) could not be allocated.
    #[error("resource allocation failed: {0}")]
    Resource(String),

    /// The capture/encode pipeline could not be brought up.
    #[error("{stage} pipeline failed: {reason}")]
    Pipeline { stage: PipelineStage, reason: String },

    /// The stream configuration is unusable (e.g. zero fps).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// [`Server::start`](crate::Server::start) was called on a stream whose
    /// configuration has `enabled = false`.
    #[error("stream {0} is disabled")]
    StreamDisabled(String),
}

impl RtspError {
    pub fn video_pipeline(reason: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: PipelineStage::Video,
            reason: reason.into(),
        }
    }

    pub fn audio_pipeline(reason: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: PipelineStage::Audio,
            reason: reason.into(),
        }
    }
}

/// Which pipeline an [`RtspError::Pipeline`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Video,
    Audio,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The request head was not valid UTF-8.
    InvalidEncoding,
    /// The receive buffer filled up before a complete request arrived.
    RequestTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidEncoding => write!(f, "request is not valid UTF-8"),
            Self::RequestTooLarge => write!(f, "request exceeds receive buffer"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
