//! Error types for the display server core
//!
//! Errors stay local to the connection that caused them. Every error a
//! client can observe maps onto a wire [`Status`] so reply-expecting
//! requests always get an explicit answer.

use thiserror::Error;

use crate::protocol::Opcode;

/// Status code sent as the first attachment of every reply.
///
/// Zero means success; every failure is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Error = -1,
    BadValue = -2,
    NoMemory = -3,
    NotAllowed = -4,
    NotConnected = -5,
    BadToken = -6,
    TimedOut = -7,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Status {
        match code {
            0 => Status::Ok,
            -2 => Status::BadValue,
            -3 => Status::NoMemory,
            -4 => Status::NotAllowed,
            -5 => Status::NotConnected,
            -6 => Status::BadToken,
            -7 => Status::TimedOut,
            _ => Status::Error,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Failures while decoding a message's attachment stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u32),

    #[error("opcode {0:?} is not a client request")]
    NotARequest(Opcode),

    #[error("attachment stream truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unexpected attachment tag: expected {expected}, found {found}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("attachment length {0} exceeds the protocol limit")]
    TooLarge(usize),

    #[error("string attachment is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },

    #[error("message has {0} trailing bytes")]
    TrailingData(usize),
}

/// Failures of a request against the server's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no root view has been created yet")]
    NoRootView,

    #[error("root view already exists")]
    RootViewExists,

    #[error("unknown view token {0}")]
    BadViewToken(u32),

    #[error("unknown token {0}")]
    BadToken(u32),

    #[error("window {0} no longer exists")]
    WindowGone(u32),

    #[error("resource limit reached: {0}")]
    ResourceExhausted(&'static str),

    #[error("operation not allowed: {0}")]
    NotAllowed(&'static str),

    #[error("direct window session is not connected")]
    NotConnected,

    #[error("invalid argument: {0}")]
    BadValue(&'static str),

    #[error("message port closed")]
    PortClosed,
}

impl ServerError {
    /// The status reported to the client for this failure.
    pub fn status(&self) -> Status {
        match self {
            ServerError::Protocol(_) | ServerError::BadValue(_) => Status::BadValue,
            ServerError::NoRootView | ServerError::RootViewExists | ServerError::NotAllowed(_) => {
                Status::NotAllowed
            }
            ServerError::BadViewToken(_) | ServerError::BadToken(_) => Status::BadToken,
            ServerError::ResourceExhausted(_) => Status::NoMemory,
            ServerError::NotConnected => Status::NotConnected,
            ServerError::WindowGone(_) | ServerError::PortClosed => Status::Error,
        }
    }
}

/// Failures of the direct frame-buffer hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DirectError {
    #[error("direct session is not connected")]
    NotConnected,

    #[error("client did not acknowledge the buffer hand-off in time")]
    TimedOut,

    #[error("could not allocate the shared buffer-info area")]
    AreaAllocation,
}

impl From<DirectError> for ServerError {
    fn from(err: DirectError) -> Self {
        match err {
            DirectError::NotConnected | DirectError::TimedOut => ServerError::NotConnected,
            DirectError::AreaAllocation => ServerError::ResourceExhausted("direct buffer area"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_negative_on_failure() {
        for status in [
            Status::Error,
            Status::BadValue,
            Status::NoMemory,
            Status::NotAllowed,
            Status::NotConnected,
            Status::BadToken,
            Status::TimedOut,
        ] {
            assert!(status.code() < 0);
            assert_eq!(Status::from_code(status.code()), status);
        }
        assert_eq!(Status::from_code(0), Status::Ok);
        assert_eq!(Status::from_code(-99), Status::Error);
    }

    #[test]
    fn test_server_error_status_mapping() {
        assert_eq!(ServerError::NoRootView.status(), Status::NotAllowed);
        assert_eq!(ServerError::BadViewToken(3).status(), Status::BadToken);
        assert_eq!(
            ServerError::ResourceExhausted("views").status(),
            Status::NoMemory
        );
        assert_eq!(ServerError::from(DirectError::TimedOut).status(), Status::NotConnected);
    }
}
