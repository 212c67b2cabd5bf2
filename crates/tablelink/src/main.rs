mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tablelink", version, about = "Tabletop display channel protocol CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from([
            "tablelink",
            "decode",
            "0a0161",
            "--encoding",
            "hex",
            "--stream",
        ])
        .expect("decode args should parse");

        assert!(matches!(cli.command, Command::Decode(ref args) if args.stream));
    }

    #[test]
    fn rejects_request_and_response_together() {
        let err = Cli::try_parse_from([
            "tablelink",
            "encode",
            "--request",
            "{\"hello\":{}}",
            "--response",
            "{\"ack\":{}}",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn encode_requires_a_message() {
        let err = Cli::try_parse_from(["tablelink", "encode"]).expect_err("missing message");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_loopback_with_global_flags() {
        let cli = Cli::try_parse_from([
            "tablelink",
            "loopback",
            "--display",
            "session",
            "--tracker",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("loopback args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Loopback(ref args) if args.tracker));
    }
}
