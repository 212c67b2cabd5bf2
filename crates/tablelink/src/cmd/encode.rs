use bytes::BytesMut;
use serde::Serialize;
use tablelink_wire::{encode_length_delimited, encode_packet, Packet, Request, Response};

use crate::cmd::EncodeArgs;
use crate::exit::{json_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_raw, Encoding, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    request_id: &'a str,
    kind: &'static str,
    message: &'static str,
    size: usize,
    encoding: String,
    data: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = build_packet(&args)?;
    let data = if args.length_delimited {
        let mut buf = BytesMut::new();
        encode_length_delimited(&packet, &mut buf);
        buf.freeze()
    } else {
        encode_packet(&packet)
    };

    if args.encoding == Encoding::Raw {
        print_raw(&data);
        return Ok(SUCCESS);
    }

    let text = args.encoding.encode(&data);
    match format {
        OutputFormat::Json => print_json(&EncodeOutput {
            request_id: &packet.request_id,
            kind: packet.kind(),
            message: packet.message_name(),
            size: data.len(),
            encoding: format!("{:?}", args.encoding).to_lowercase(),
            data: text,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{text}"),
    }
    Ok(SUCCESS)
}

fn build_packet(args: &EncodeArgs) -> CliResult<Packet> {
    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    match (&args.request, &args.response) {
        (Some(json), _) => {
            let request: Request =
                serde_json::from_str(json).map_err(|err| json_error("invalid request", err))?;
            Ok(Packet::request(request_id, request))
        }
        (None, Some(json)) => {
            let response: Response =
                serde_json::from_str(json).map_err(|err| json_error("invalid response", err))?;
            Ok(Packet::response(request_id, response))
        }
        (None, None) => Err(CliError::new(
            USAGE,
            "one of --request or --response is required",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    fn args(request: Option<&str>, response: Option<&str>) -> EncodeArgs {
        EncodeArgs {
            request: request.map(str::to_string),
            response: response.map(str::to_string),
            request_id: Some("abc".into()),
            encoding: Encoding::Hex,
            length_delimited: false,
        }
    }

    #[test]
    fn builds_request_from_json() {
        let packet = build_packet(&args(Some(r#"{"get_asset":{"id":"map"}}"#), None)).unwrap();
        assert_eq!(packet.request_id, "abc");
        assert_eq!(packet.message_name(), "get_asset");
    }

    #[test]
    fn builds_response_from_json() {
        let packet = build_packet(&args(None, Some(r#"{"ack":{}}"#))).unwrap();
        assert!(!packet.is_request());
    }

    #[test]
    fn unknown_case_is_invalid_data() {
        let err = build_packet(&args(Some(r#"{"launch":{}}"#), None)).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
