use thiserror::Error;

/// The four error kinds of the protocol's error handling design.
///
/// Session-level operations collapse any of these to a single failure that
/// the connection service turns into a NACK, except `Disconnected` seen
/// while reading from a connection's own socket, which ends that
/// connection's service task.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("disconnected")]
    Disconnected,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtoError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ProtoError::InvalidRequest(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ProtoError::ProtocolViolation(msg.into())
    }
}

impl From<std::io::Error> for ProtoError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted => ProtoError::Disconnected,
            _ => ProtoError::Internal(e.to_string()),
        }
    }
}

pub type ProtoResult<T> = Result<T, ProtoError>;
