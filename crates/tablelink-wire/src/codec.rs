use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::message::Packet;

/// Default maximum packet size accepted by the length-delimited decoder: 16 MiB.
pub const DEFAULT_MAX_PACKET: usize = 16 * 1024 * 1024;

/// Longest legal varint encoding.
const MAX_VARINT_LEN: usize = 10;

/// Largest field number the key encoding allows.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

/// Protobuf wire types understood by this codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(WireError::InvalidWireType(other)),
        }
    }
}

/// A message with a protobuf-compatible encoding.
pub trait WireMessage: Sized {
    /// Append this message's fields (without any outer length prefix).
    fn encode_fields(&self, dst: &mut BytesMut);

    /// Decode a message from exactly the bytes of its fields.
    fn decode(src: Bytes) -> Result<Self>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode_fields(&mut dst);
        dst.freeze()
    }
}

/// Encode a packet into its binary wire form.
pub fn encode_packet(packet: &Packet) -> Bytes {
    packet.to_bytes()
}

/// Decode a packet from its binary wire form.
///
/// Unknown fields are skipped. A packet that carries neither a request nor a
/// response is rejected.
pub fn decode_packet(src: impl Into<Bytes>) -> Result<Packet> {
    Packet::decode(src.into())
}

/// Encode a packet with a varint length prefix, for byte-stream links.
pub fn encode_length_delimited(packet: &Packet, dst: &mut BytesMut) {
    let body = encode_packet(packet);
    dst.reserve(MAX_VARINT_LEN + body.len());
    put_varint(dst, body.len() as u64);
    dst.put_slice(&body);
}

/// Decode one length-prefixed packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn decode_length_delimited(src: &mut BytesMut, max_packet: usize) -> Result<Option<Packet>> {
    let Some((len, prefix)) = peek_varint(&src[..])? else {
        return Ok(None);
    };
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    if len > max_packet {
        return Err(WireError::PacketTooLarge {
            size: len,
            max: max_packet,
        });
    }
    if src.len() < prefix + len {
        return Ok(None);
    }

    src.advance(prefix);
    let body = src.split_to(len).freeze();
    decode_packet(body).map(Some)
}

/// Read a varint from the front of `src` without consuming it.
///
/// Returns the value and its encoded length, or `None` if more bytes are needed.
fn peek_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if src.len() >= MAX_VARINT_LEN {
        return Err(WireError::InvalidVarint);
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Primitive writers
// ---------------------------------------------------------------------------

pub(crate) fn put_varint(dst: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

pub(crate) fn put_key(dst: &mut BytesMut, field: u32, wire_type: WireType) {
    put_varint(dst, (u64::from(field) << 3) | wire_type as u64);
}

fn put_length_delimited(dst: &mut BytesMut, field: u32, data: &[u8]) {
    put_key(dst, field, WireType::LengthDelimited);
    put_varint(dst, data.len() as u64);
    dst.put_slice(data);
}

pub(crate) fn put_string(dst: &mut BytesMut, field: u32, value: &str) {
    if !value.is_empty() {
        put_length_delimited(dst, field, value.as_bytes());
    }
}

pub(crate) fn put_bytes(dst: &mut BytesMut, field: u32, value: &[u8]) {
    if !value.is_empty() {
        put_length_delimited(dst, field, value);
    }
}

/// Write a bytes field with explicit presence (written even when empty).
pub(crate) fn put_optional_bytes(dst: &mut BytesMut, field: u32, value: Option<&Bytes>) {
    if let Some(value) = value {
        put_length_delimited(dst, field, value);
    }
}

pub(crate) fn put_double(dst: &mut BytesMut, field: u32, value: f64) {
    if value.to_bits() != 0 {
        put_key(dst, field, WireType::Fixed64);
        dst.put_f64_le(value);
    }
}

pub(crate) fn put_bool(dst: &mut BytesMut, field: u32, value: bool) {
    if value {
        put_key(dst, field, WireType::Varint);
        put_varint(dst, 1);
    }
}

pub(crate) fn put_uint32(dst: &mut BytesMut, field: u32, value: u32) {
    if value != 0 {
        put_key(dst, field, WireType::Varint);
        put_varint(dst, u64::from(value));
    }
}

/// Negative values are sign-extended to ten bytes, as protobuf `int32` does.
pub(crate) fn put_int32(dst: &mut BytesMut, field: u32, value: i32) {
    if value != 0 {
        put_key(dst, field, WireType::Varint);
        put_varint(dst, i64::from(value) as u64);
    }
}

/// Write a sub-message. Sub-messages always carry presence.
pub(crate) fn put_message<M: WireMessage>(dst: &mut BytesMut, field: u32, message: &M) {
    let mut body = BytesMut::new();
    message.encode_fields(&mut body);
    put_length_delimited(dst, field, &body);
}

// ---------------------------------------------------------------------------
// Primitive readers
// ---------------------------------------------------------------------------

pub(crate) fn get_varint(src: &mut Bytes) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        if !src.has_remaining() {
            return Err(WireError::Truncated("varint"));
        }
        let byte = src.get_u8();
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(WireError::InvalidVarint)
}

fn get_key(src: &mut Bytes) -> Result<(u32, WireType)> {
    let key = get_varint(src)?;
    let field = key >> 3;
    if field == 0 || field > MAX_FIELD_NUMBER {
        return Err(WireError::InvalidFieldNumber);
    }
    let wire_type = WireType::from_raw((key & 0x7) as u8)?;
    Ok((field as u32, wire_type))
}

fn skip_field(src: &mut Bytes, wire_type: WireType) -> Result<()> {
    match wire_type {
        WireType::Varint => {
            get_varint(src)?;
        }
        WireType::Fixed64 => advance(src, 8, "fixed64")?,
        WireType::Fixed32 => advance(src, 4, "fixed32")?,
        WireType::LengthDelimited => {
            get_length_delimited(src)?;
        }
    }
    Ok(())
}

fn advance(src: &mut Bytes, n: usize, what: &'static str) -> Result<()> {
    if src.remaining() < n {
        return Err(WireError::Truncated(what));
    }
    src.advance(n);
    Ok(())
}

fn get_length_delimited(src: &mut Bytes) -> Result<Bytes> {
    let len = get_varint(src)?;
    let len = usize::try_from(len).map_err(|_| WireError::Truncated("length-delimited"))?;
    if src.remaining() < len {
        return Err(WireError::Truncated("length-delimited"));
    }
    Ok(src.split_to(len))
}

/// Fail unless a known field arrived with the wire type its schema declares.
pub(crate) fn expect_wire_type(field: u32, actual: WireType, expected: WireType) -> Result<()> {
    if actual != expected {
        return Err(WireError::UnexpectedWireType {
            field,
            expected: expected as u8,
            actual: actual as u8,
        });
    }
    Ok(())
}

pub(crate) fn get_string(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<String> {
    let data = get_bytes(src, field, wire_type)?;
    String::from_utf8(data.to_vec()).map_err(|_| WireError::InvalidUtf8 { field })
}

pub(crate) fn get_bytes(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<Bytes> {
    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
    get_length_delimited(src)
}

pub(crate) fn get_double(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<f64> {
    expect_wire_type(field, wire_type, WireType::Fixed64)?;
    if src.remaining() < 8 {
        return Err(WireError::Truncated("double"));
    }
    Ok(src.get_f64_le())
}

pub(crate) fn get_bool(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<bool> {
    expect_wire_type(field, wire_type, WireType::Varint)?;
    Ok(get_varint(src)? != 0)
}

pub(crate) fn get_uint32(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<u32> {
    expect_wire_type(field, wire_type, WireType::Varint)?;
    Ok(get_varint(src)? as u32)
}

pub(crate) fn get_int32(src: &mut Bytes, field: u32, wire_type: WireType) -> Result<i32> {
    expect_wire_type(field, wire_type, WireType::Varint)?;
    Ok(get_varint(src)? as i32)
}

pub(crate) fn get_message<M: WireMessage>(
    src: &mut Bytes,
    field: u32,
    wire_type: WireType,
) -> Result<M> {
    let body = get_bytes(src, field, wire_type)?;
    M::decode(body)
}

/// Walk every field in `src`, handing each to `visit`.
///
/// `visit` returns `Ok(true)` when it consumed the field's value and
/// `Ok(false)` for fields it does not know; those are skipped.
pub(crate) fn for_each_field<F>(mut src: Bytes, mut visit: F) -> Result<()>
where
    F: FnMut(u32, WireType, &mut Bytes) -> Result<bool>,
{
    while src.has_remaining() {
        let (field, wire_type) = get_key(&mut src)?;
        if !visit(field, wire_type, &mut src)? {
            tracing::trace!(field, ?wire_type, "skipping unknown field");
            skip_field(&mut src, wire_type)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        GetAssetRequest, GetAssetResponse, GetTableConfigurationResponse, Request, Resolution,
        Response,
    };

    fn varint_bytes(value: u64) -> Vec<u8> {
        let mut dst = BytesMut::new();
        put_varint(&mut dst, value);
        dst.to_vec()
    }

    #[test]
    fn test_varint_encoding() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(1), vec![0x01]);
        assert_eq!(varint_bytes(300), vec![0xac, 0x02]);
        assert_eq!(varint_bytes(u64::MAX).len(), MAX_VARINT_LEN);

        let mut src = Bytes::from(vec![0xac, 0x02]);
        assert_eq!(get_varint(&mut src).unwrap(), 300);
        assert!(src.is_empty());
    }

    #[test]
    fn test_varint_truncated() {
        let mut src = Bytes::from(vec![0x80, 0x80]);
        assert_eq!(get_varint(&mut src), Err(WireError::Truncated("varint")));
    }

    #[test]
    fn test_varint_too_long() {
        let mut src = Bytes::from(vec![0xff; 11]);
        assert_eq!(get_varint(&mut src), Err(WireError::InvalidVarint));
    }

    #[test]
    fn test_negative_int32_is_sign_extended() {
        let mut dst = BytesMut::new();
        put_int32(&mut dst, 1, -1);
        // key (1) + ten-byte varint
        assert_eq!(dst.len(), 11);

        let mut src = dst.freeze();
        let (field, wire_type) = get_key(&mut src).unwrap();
        assert_eq!(get_int32(&mut src, field, wire_type).unwrap(), -1);
    }

    #[test]
    fn test_known_request_bytes() {
        // Packet { request_id: "a", request: { get_asset: { id: "b" } } }
        let packet = Packet::request("a", Request::GetAsset(GetAssetRequest { id: "b".into() }));
        let encoded = encode_packet(&packet);
        assert_eq!(
            encoded.as_ref(),
            &[0x0a, 0x01, b'a', 0x12, 0x05, 0x12, 0x03, 0x0a, 0x01, b'b']
        );
    }

    #[test]
    fn test_double_is_exact() {
        let packet = Packet::response(
            "cfg",
            Response::GetTableConfiguration(GetTableConfigurationResponse {
                resolution: Some(Resolution {
                    width: 3840,
                    height: 2160,
                }),
                size: 0.1 + 0.2,
                play_audio_on_table: true,
            }),
        );
        let decoded = decode_packet(encode_packet(&packet)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let packet = Packet::response(
            "id-1",
            Response::GetAsset(GetAssetResponse {
                id: "map".into(),
                payload: Bytes::from_static(b"\x89PNG"),
                media_type: "image/png".into(),
            }),
        );
        let mut dst = BytesMut::from(encode_packet(&packet).as_ref());
        // Field 99 varint, field 98 fixed32, field 97 length-delimited.
        put_key(&mut dst, 99, WireType::Varint);
        put_varint(&mut dst, 12345);
        put_key(&mut dst, 98, WireType::Fixed32);
        dst.put_u32_le(7);
        put_length_delimited(&mut dst, 97, b"future");

        let decoded = decode_packet(dst.freeze()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_missing_payload_rejected() {
        let mut dst = BytesMut::new();
        put_string(&mut dst, 1, "lonely");
        assert_eq!(decode_packet(dst.freeze()), Err(WireError::MissingPayload));
    }

    #[test]
    fn test_empty_request_rejected() {
        let mut dst = BytesMut::new();
        put_string(&mut dst, 1, "id");
        put_length_delimited(&mut dst, 2, &[]);
        assert_eq!(
            decode_packet(dst.freeze()),
            Err(WireError::EmptyOneof("Request"))
        );
    }

    #[test]
    fn test_wrong_wire_type_rejected() {
        let mut dst = BytesMut::new();
        put_key(&mut dst, 1, WireType::Varint);
        put_varint(&mut dst, 5);
        assert!(matches!(
            decode_packet(dst.freeze()),
            Err(WireError::UnexpectedWireType { field: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let packet = Packet::request("abcdef", Request::hello());
        let encoded = encode_packet(&packet);
        let truncated = encoded.slice(..encoded.len() - 1);
        assert!(matches!(
            decode_packet(truncated),
            Err(WireError::Truncated(_))
        ));
    }

    #[test]
    fn test_group_wire_type_rejected() {
        // field 1, wire type 3 (start group)
        let src = Bytes::from(vec![0x0b]);
        assert_eq!(decode_packet(src), Err(WireError::InvalidWireType(3)));
    }

    #[test]
    fn test_length_delimited_multiple_packets() {
        let first = Packet::request("1", Request::hello());
        let second = Packet::response("1", Response::ack());

        let mut buf = BytesMut::new();
        encode_length_delimited(&first, &mut buf);
        encode_length_delimited(&second, &mut buf);

        let got = decode_length_delimited(&mut buf, DEFAULT_MAX_PACKET)
            .unwrap()
            .unwrap();
        assert_eq!(got, first);
        let got = decode_length_delimited(&mut buf, DEFAULT_MAX_PACKET)
            .unwrap()
            .unwrap();
        assert_eq!(got, second);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_delimited_incomplete() {
        let mut buf = BytesMut::new();
        encode_length_delimited(&Packet::request("abc", Request::hello()), &mut buf);
        let full = buf.len();
        buf.truncate(full - 2);

        let result = decode_length_delimited(&mut buf, DEFAULT_MAX_PACKET).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), full - 2);

        let mut empty = BytesMut::new();
        assert!(decode_length_delimited(&mut empty, DEFAULT_MAX_PACKET)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_length_delimited_too_large() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 1024);
        let result = decode_length_delimited(&mut buf, 512);
        assert_eq!(
            result,
            Err(WireError::PacketTooLarge {
                size: 1024,
                max: 512
            })
        );
    }
}
