use std::io::Read;

use bytes::BytesMut;
use tablelink_wire::{decode_length_delimited, decode_packet, Packet};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, wire_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packets, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let text = read_input(&args)?;
    let data = args.encoding.decode(&text)?;
    let packets = if args.stream {
        decode_stream(data, args.max_packet)?
    } else {
        vec![decode_packet(data).map_err(|err| wire_error("decode failed", err))?]
    };
    print_packets(&packets, format);
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(input) = &args.input {
        return Ok(input.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err));
    }
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .map_err(|err| io_error("failed to read stdin", err))?;
    Ok(buf)
}

/// Decode every length-prefixed packet; a trailing partial packet is an error.
fn decode_stream(data: Vec<u8>, max_packet: usize) -> CliResult<Vec<Packet>> {
    let mut buf = BytesMut::from(&data[..]);
    let mut packets = Vec::new();
    while let Some(packet) = decode_length_delimited(&mut buf, max_packet)
        .map_err(|err| wire_error(&format!("decode failed at packet {}", packets.len()), err))?
    {
        packets.push(packet);
    }
    if !buf.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("stream ends with {} bytes of an incomplete packet", buf.len()),
        ));
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use tablelink_wire::{encode_length_delimited, Request, Response};

    use super::*;

    #[test]
    fn stream_yields_every_packet() {
        let mut buf = BytesMut::new();
        encode_length_delimited(&Packet::request("1", Request::hello()), &mut buf);
        encode_length_delimited(&Packet::response("1", Response::ack()), &mut buf);

        let packets = decode_stream(buf.to_vec(), 1024).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].message_name(), "ack");
    }

    #[test]
    fn stream_rejects_partial_tail() {
        let mut buf = BytesMut::new();
        encode_length_delimited(&Packet::request("1", Request::hello()), &mut buf);
        let mut data = buf.to_vec();
        data.truncate(data.len() - 1);

        let err = decode_stream(data, 1024).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
