use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};
use serde::Serialize;
use tablelink_wire::{Packet, Payload};

use crate::exit::{CliError, CliResult, DATA_INVALID};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Text form of packet bytes on the command line.
#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    Hex,
    Base64,
    Raw,
}

impl Encoding {
    pub fn encode(self, data: &[u8]) -> String {
        match self {
            Encoding::Hex => HEXLOWER_PERMISSIVE.encode(data),
            Encoding::Base64 => BASE64.encode(data),
            Encoding::Raw => String::from_utf8_lossy(data).into_owned(),
        }
    }

    pub fn decode(self, text: &[u8]) -> CliResult<Vec<u8>> {
        let trimmed = text.trim_ascii();
        let decoded = match self {
            Encoding::Hex => {
                let compact: Vec<u8> = trimmed
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                HEXLOWER_PERMISSIVE.decode(&compact)
            }
            Encoding::Base64 => BASE64.decode(trimmed),
            Encoding::Raw => return Ok(text.to_vec()),
        };
        decoded.map_err(|err| {
            CliError::new(DATA_INVALID, format!("invalid {:?} input: {err}", self))
        })
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    request_id: &'a str,
    kind: &'static str,
    message: &'static str,
    payload: &'a Payload,
}

pub fn print_packets(packets: &[Packet], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for packet in packets {
                let out = PacketOutput {
                    request_id: &packet.request_id,
                    kind: packet.kind(),
                    message: packet.message_name(),
                    payload: &packet.payload,
                };
                print_json(&out);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REQUEST ID", "KIND", "MESSAGE", "BODY"]);
            for packet in packets {
                table.add_row(vec![
                    packet.request_id.clone(),
                    packet.kind().to_string(),
                    packet.message_name().to_string(),
                    body_preview(&packet.payload),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for packet in packets {
                println!(
                    "{} {} request_id={} body={}",
                    packet.kind(),
                    packet.message_name(),
                    packet.request_id,
                    body_preview(&packet.payload)
                );
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// The selected message's fields as compact JSON.
fn body_preview(payload: &Payload) -> String {
    let body = match payload {
        Payload::Request(request) => serde_json::to_value(request),
        Payload::Response(response) => serde_json::to_value(response),
    };
    match body {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .next()
            .map(|(_, fields)| fields.to_string())
            .unwrap_or_default(),
        Ok(other) => other.to_string(),
        Err(_) => "<unprintable>".to_string(),
    }
}
