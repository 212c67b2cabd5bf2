use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use tablelink_channel::DisplayKind;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::{Encoding, OutputFormat};

pub mod decode;
pub mod encode;
pub mod info;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a packet and print it.
    Decode(DecodeArgs),
    /// Build a packet from JSON and print its encoding.
    Encode(EncodeArgs),
    /// Run a controller and a display in-process and exchange the standard requests.
    Loopback(LoopbackArgs),
    /// Print the fixed routes, Bluetooth identifiers and display order.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Encoded packet text. Read from stdin when neither this nor --file is given.
    #[arg(conflicts_with = "file")]
    pub input: Option<String>,
    /// Read the packet from a file.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// How the input is encoded.
    #[arg(long, value_enum, default_value = "hex")]
    pub encoding: Encoding,
    /// Input is a stream of varint length-prefixed packets.
    #[arg(long)]
    pub stream: bool,
    /// Largest packet accepted in a stream, in bytes.
    #[arg(long, default_value_t = tablelink_wire::DEFAULT_MAX_PACKET)]
    pub max_packet: usize,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Request as JSON, e.g. '{"get_asset":{"id":"map"}}'.
    #[arg(long, conflicts_with = "response", required_unless_present = "response")]
    pub request: Option<String>,
    /// Response as JSON, e.g. '{"ack":{}}'.
    #[arg(long)]
    pub response: Option<String>,
    /// Request id to carry. Default: a fresh UUID.
    #[arg(long)]
    pub request_id: Option<String>,
    /// Output encoding.
    #[arg(long, value_enum, default_value = "hex")]
    pub encoding: Encoding,
    /// Prefix the packet with its varint length.
    #[arg(long)]
    pub length_delimited: bool,
}

/// Display transport exercised by `loopback`.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DisplayArg {
    Window,
    Session,
}

impl From<DisplayArg> for DisplayKind {
    fn from(arg: DisplayArg) -> Self {
        match arg {
            DisplayArg::Window => DisplayKind::Window,
            DisplayArg::Session => DisplayKind::Session,
        }
    }
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Display transport to use.
    #[arg(long, value_enum, default_value = "window")]
    pub display: DisplayArg,
    /// Also connect a simulated tracker and exchange tracker requests.
    #[arg(long)]
    pub tracker: bool,
    /// Number of rounds of requests.
    #[arg(long, default_value = "1")]
    pub iterations: u32,
    /// Per-request and handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
