use super::frame::{S7DataType, S7ReturnCode};
use std::{fmt, result::Result as StdResult};
use thiserror::Error as ThisError;

/// Unified S7 result type
pub type Result<T> = StdResult<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timeout")]
    ErrConnectTimeout,

    #[error("request timeout")]
    ErrRequestTimeout,

    #[error("invalid frame")]
    ErrInvalidFrame,

    #[error("unexpected PDU or function")]
    ErrUnexpectedPdu,

    #[error("invalid address: {0}")]
    ErrInvalidAddress(String),

    #[error("invalid parameter: {0}")]
    ErrInvalidParam(String),

    #[error("can not use closed connection")]
    ErrUseClosedConnection,

    #[error("session is not active")]
    ErrNotActive,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed bytes that do not break the protocol contract itself
    #[error("decode error: {context}")]
    Decode { context: &'static str },

    /// Reserved or fixed field carries an unexpected value
    #[error("protocol violation: {context}")]
    ProtocolViolation { context: &'static str },

    #[error("insufficient data: needed {needed} bytes, available {available} bytes")]
    InsufficientData { needed: usize, available: usize },

    /// Value variant does not match the type the address was parsed with
    #[error("type mismatch: address expects {expected}, value is {actual}")]
    TypeMismatch {
        expected: S7DataType,
        actual: S7DataType,
    },

    /// Header-level error reported by the PLC in an Ack/AckData.
    #[allow(clippy::enum_variant_names)]
    #[error("S7 error: {code}")]
    S7Error { code: ErrorCode },

    /// Item-level return code other than success.
    #[error("item rejected by PLC: {code:?}")]
    ItemRejected { code: S7ReturnCode },

    #[error("{failed} of {total} items failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Rack value {0} is out of range (0..=15)")]
    InvalidRack(u8),

    #[error("Slot value {0} is out of range (0..=15)")]
    InvalidSlot(u8),
}

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAddress,
    ProtocolError,
    RemoteRejected,
    Timeout,
    ConnectionLost,
    PartialBatchFailure,
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ErrInvalidAddress(_) | Error::InvalidRack(_) | Error::InvalidSlot(_) => {
                ErrorKind::InvalidAddress
            }
            Error::ErrConnectTimeout | Error::ErrRequestTimeout => ErrorKind::Timeout,
            Error::Io(_) | Error::ErrUseClosedConnection | Error::ErrNotActive => {
                ErrorKind::ConnectionLost
            }
            Error::S7Error { .. } | Error::ItemRejected { .. } => ErrorKind::RemoteRejected,
            Error::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            Error::InvalidConfiguration(_) | Error::ErrInvalidParam(_) => ErrorKind::Configuration,
            Error::ErrInvalidFrame
            | Error::ErrUnexpectedPdu
            | Error::Decode { .. }
            | Error::ProtocolViolation { .. }
            | Error::InsufficientData { .. }
            | Error::TypeMismatch { .. } => ErrorKind::ProtocolError,
        }
    }

    /// Errors after which the socket cannot be trusted anymore.
    #[inline]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ErrUseClosedConnection
                | Error::ErrNotActive
                | Error::ErrConnectTimeout
                | Error::ErrInvalidFrame
        )
    }

    /// Item-level "address not found" style rejection.
    #[inline]
    pub fn is_address_rejected(&self) -> bool {
        matches!(
            self,
            Error::ItemRejected {
                code: S7ReturnCode::AddressOutOfRange | S7ReturnCode::ObjectDoesNotExist
            }
        )
    }
}

/// Header error code carried by Ack/AckData (`class << 8 | code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    ServiceNotAllowedInCurrentState,
    UnknownServiceOnRemoteModule,
    ServiceNotImplementedOrFrameError,
    MemoryOrStorageUnavailable,
    ResourcesInsufficientOrCpuBusy,
    FunctionCannotBeExecuted,
    FrameError,
    ServiceAbortedEarly,
    ObjectAddressingError,
    ServiceNotSupportedByModule,
    ObjectAccessDenied,
    ObjectCorrupted,
    InvalidBlockNumber,
    InvalidRequestLength,
    InvalidParams,
    BlockNotFound,
    Other(u16),
}

const KNOWN_CODES: &[(u16, ErrorCode, &str)] = &[
    (0x0000, ErrorCode::Success, "success"),
    (
        0x8001,
        ErrorCode::ServiceNotAllowedInCurrentState,
        "service not allowed in current block state",
    ),
    (
        0x8100,
        ErrorCode::UnknownServiceOnRemoteModule,
        "service unknown to remote module",
    ),
    (
        0x8104,
        ErrorCode::ServiceNotImplementedOrFrameError,
        "service not implemented or frame error",
    ),
    (
        0x8301,
        ErrorCode::MemoryOrStorageUnavailable,
        "memory or storage unavailable",
    ),
    (
        0x8302,
        ErrorCode::ResourcesInsufficientOrCpuBusy,
        "insufficient resources or CPU busy",
    ),
    (
        0x8404,
        ErrorCode::FunctionCannotBeExecuted,
        "function cannot be executed",
    ),
    (0x8500, ErrorCode::FrameError, "PDU size exceeded or frame error"),
    (0x8503, ErrorCode::ServiceAbortedEarly, "service aborted early"),
    (
        0x8701,
        ErrorCode::ObjectAddressingError,
        "object addressing error",
    ),
    (
        0x8702,
        ErrorCode::ServiceNotSupportedByModule,
        "service not supported by module",
    ),
    (0x8703, ErrorCode::ObjectAccessDenied, "object access denied"),
    (0x8704, ErrorCode::ObjectCorrupted, "object corrupted"),
    (0x0110, ErrorCode::InvalidBlockNumber, "invalid block number"),
    (0x0111, ErrorCode::InvalidRequestLength, "invalid request length"),
    (0x0112, ErrorCode::InvalidParams, "invalid parameters"),
    (0x0114, ErrorCode::BlockNotFound, "block not found"),
];

impl ErrorCode {
    /// Raw 16-bit value as seen on the wire.
    pub fn raw(self) -> u16 {
        match self {
            ErrorCode::Other(v) => v,
            known => KNOWN_CODES
                .iter()
                .find(|(_, c, _)| *c == known)
                .map(|(v, _, _)| *v)
                .unwrap_or_default(),
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    fn description(self) -> Option<&'static str> {
        KNOWN_CODES
            .iter()
            .find(|(_, c, _)| *c == self)
            .map(|(_, _, d)| *d)
    }
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        KNOWN_CODES
            .iter()
            .find(|(v, _, _)| *v == value)
            .map(|(_, c, _)| *c)
            .unwrap_or(ErrorCode::Other(value))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(d) => write!(f, "0x{:04X} ({d})", self.raw()),
            None => write!(f, "0x{:04X}", self.raw()),
        }
    }
}
