use thiserror::Error;

/// Structural problems with a received ASCII line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame too short: {0} chars, need at least 9")]
    TooShort(usize),

    #[error("Frame length {0} must be odd")]
    OddLength(usize),

    #[error("Frame must begin with ':'")]
    BadStart,

    #[error("LRC mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("Invalid hex digit at position {0}")]
    InvalidHex(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid indexer in item name: {0}")]
    InvalidIndexer(String),

    #[error("Block is not registered: {0}")]
    UnknownBlock(String),

    #[error("Invalid item name (expected <block>@<indexer>): {0}")]
    InvalidItemName(String),

    #[error("Item is not registered: {0}")]
    UnregisteredItem(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Register range out of bounds: start {start} + count {count} > size {size}")]
    OutOfBounds { start: u16, count: u16, size: u16 },

    #[error("Register count must not be zero")]
    NoRegisters,

    #[error("Too many registers: {0} > 125")]
    TooManyRegisters(u16),

    #[error("Byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Data received with no outstanding exchange")]
    UnexpectedData,

    #[error("Reply address {received} does not match slave address {expected}")]
    AddressMismatch { expected: u8, received: u8 },

    #[error("Function code mismatch: expected {expected:#04x}, got {received:#04x}")]
    FunctionCodeMismatch { expected: u8, received: u8 },

    #[error("Reply size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Write acknowledgement does not echo the request")]
    EchoMismatch,

    #[error("Modbus exception: function code {function:#04x}, exception code {code:#04x}")]
    Exception { function: u8, code: u8 },

    #[error("Unsupported function code {0:#04x}")]
    IllegalFunction(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Exchange timed out after {0} ms")]
pub struct TimeoutError(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("An exchange is already in flight on this port")]
    ExchangeInFlight,
    #[error("No operation is queued")]
    NothingQueued,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config object is not defined")]
    MissingConfig,

    #[error("Illegal block type '{kind}' for block {block}")]
    InvalidBlockType { block: String, kind: String },

    #[error("Invalid block {block}: {reason}")]
    InvalidBlock { block: String, reason: String },

    #[error("Unsupported modbus mode '{0}', only ascii is implemented")]
    UnsupportedMode(String),

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("A tokio runtime is required to run a driver")]
    NoRuntime,

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Builder is configured for {0}")]
    WrongRole(&'static str),
}

/// Umbrella error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Item {0} is not available")]
    NotAvailable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
