//! Unified error types for the VeloNav link firmware.
//!
//! Every subsystem has a small `Copy` error enum so failures can be passed
//! through the protocol state machines, logged, and counted without
//! allocation. The umbrella [`Error`] is what the device entry point sees.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// SD card access failed.
    Storage(StorageError),
    /// An inbound header or command failed validation.
    Frame(FrameError),
    /// An outbound transfer could not start or was aborted.
    Transfer(TransferError),
    /// A GATT notification could not be queued.
    Notify(NotifyError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Notify(e) => write!(f, "notify: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The file or directory does not exist.
    NotFound,
    /// Open failed even after retries and directory creation.
    OpenFailed,
    /// A write returned short or failed.
    WriteFailed,
    /// A read failed mid-file.
    ReadFailed,
    /// Parent directories could not be created.
    DirCreateFailed,
    /// Asset name is not usable as a file name.
    InvalidName,
    /// Generic I/O error from the filesystem backend.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::OpenFailed => write!(f, "open failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::DirCreateFailed => write!(f, "mkdir failed"),
            Self::InvalidName => write!(f, "invalid asset name"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Frame / command validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Flag byte has bits set that the protocol does not define.
    BadFlags,
    /// Tile zoom level above the supported maximum.
    ZoomOutOfRange,
    /// Declared payload length is zero or above the protocol limit.
    SizeOutOfRange,
    /// Declared name length is zero or too long.
    NameLength,
    /// Name bytes are not a usable asset name.
    InvalidName,
    /// Action byte is not one the characteristic understands.
    UnknownAction(u8),
    /// Write ended before the fixed fields of a command.
    Truncated,
    /// Bytes left over after a complete command.
    TrailingBytes,
    /// Zero-length write.
    Empty,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadFlags => write!(f, "unknown flag bits"),
            Self::ZoomOutOfRange => write!(f, "zoom out of range"),
            Self::SizeOutOfRange => write!(f, "declared size out of range"),
            Self::NameLength => write!(f, "name length out of range"),
            Self::InvalidName => write!(f, "invalid name"),
            Self::UnknownAction(a) => write!(f, "unknown action 0x{a:02x}"),
            Self::Truncated => write!(f, "truncated command"),
            Self::TrailingBytes => write!(f, "trailing bytes after command"),
            Self::Empty => write!(f, "empty write"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Outbound transfer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// A transfer of the same kind is already streaming.
    AlreadyActive,
    /// The source file(s) could not be opened.
    SourceUnavailable,
    /// Reading the source failed mid-transfer.
    ReadFailed,
    /// The source ended before its declared size.
    Truncated,
    /// The Start frame could not be delivered.
    StartRejected,
}

impl TransferError {
    /// One-byte code carried by the inventory ERROR frame.
    pub const fn code(self) -> u8 {
        match self {
            Self::AlreadyActive => 1,
            Self::SourceUnavailable => 2,
            Self::ReadFailed => 3,
            Self::Truncated => 4,
            Self::StartRejected => 5,
        }
    }

    /// Short message carried by the recording ERROR frame.
    pub const fn message(self) -> &'static str {
        match self {
            Self::AlreadyActive => "busy",
            Self::SourceUnavailable => "not found",
            Self::ReadFailed => "read error",
            Self::Truncated => "truncated",
            Self::StartRejected => "start failed",
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// No central is connected.
    NotConnected,
    /// The BLE stack has no room for another notification right now.
    Congested,
    /// Payload is larger than the negotiated MTU allows.
    TooLarge,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Congested => write!(f, "notify queue congested"),
            Self::TooLarge => write!(f, "payload exceeds MTU"),
        }
    }
}

impl From<NotifyError> for Error {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config could not be deserialised.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage failed.
    Io,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
