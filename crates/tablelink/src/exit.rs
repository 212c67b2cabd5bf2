use std::fmt;
use std::io;

use tablelink_channel::ChannelError;
use tablelink_wire::WireError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        io::ErrorKind::TimedOut => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match &err {
        ChannelError::HandshakeTimeout(_) | ChannelError::RequestTimeout(_) => TIMEOUT,
        ChannelError::Wire(_) => DATA_INVALID,
        ChannelError::Unsupported(_) | ChannelError::NoChannelSelected => USAGE,
        ChannelError::NotConnected
        | ChannelError::Substrate(_)
        | ChannelError::DeviceDisconnected
        | ChannelError::Cancelled => TRANSPORT_ERROR,
        ChannelError::Unimplemented(_) | ChannelError::Handler(_) => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}
