/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The buffer ended in the middle of a value.
    #[error("buffer truncated while reading {0}")]
    Truncated(&'static str),

    /// A varint ran past 10 bytes.
    #[error("malformed varint")]
    InvalidVarint,

    /// A key used field number 0.
    #[error("invalid field number 0")]
    InvalidFieldNumber,

    /// A key carried a wire type this codec does not speak (groups, reserved).
    #[error("unsupported wire type {0}")]
    InvalidWireType(u8),

    /// A known field arrived with the wrong wire type.
    #[error("field {field} has wire type {actual}, expected {expected}")]
    UnexpectedWireType { field: u32, expected: u8, actual: u8 },

    /// A string field did not hold valid UTF-8.
    #[error("invalid utf-8 in field {field}")]
    InvalidUtf8 { field: u32 },

    /// An enum field held a value outside the known set.
    #[error("unknown {name} value {value}")]
    UnknownEnumValue { name: &'static str, value: i32 },

    /// A request or response message selected no case.
    #[error("{0} message selects no case")]
    EmptyOneof(&'static str),

    /// The packet carried neither a request nor a response.
    #[error("packet carries neither a request nor a response")]
    MissingPayload,

    /// A length-delimited packet exceeded the configured maximum.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
