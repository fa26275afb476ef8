//! Unit tests for NDJSON framing of the server's stdout.
//!
//! Covers single lines, several lines in one read, partial delivery,
//! EOF flushing of an unterminated line, and the per-line size limit.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use mcp_stdio_bridge::stdio::codec::{NdjsonCodec, MAX_LINE_BYTES};
use mcp_stdio_bridge::AppError;

/// A complete line is returned without its trailing newline.
#[test]
fn single_line_decodes_without_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":\"pong\"}\n");

    let line = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        line.as_deref(),
        Some("{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":\"pong\"}")
    );
}

/// Two lines delivered in one read come out as two items.
#[test]
fn batched_lines_are_each_decoded() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"id\":0,\"result\":1}\n{\"id\":1,\"result\":2}\n");

    assert!(codec.decode(&mut buf).expect("first").is_some());
    assert!(codec.decode(&mut buf).expect("second").is_some());
    assert!(codec.decode(&mut buf).expect("drained").is_none());
}

/// A message split across reads is held back until its newline arrives.
#[test]
fn partial_delivery_is_buffered_until_newline() {
    let mut codec = NdjsonCodec::new();

    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":0,");
    assert!(
        codec.decode(&mut buf).expect("partial decode").is_none(),
        "incomplete line must not be emitted"
    );

    buf.extend_from_slice(b"\"result\":\"ok\"}\n");
    let line = codec.decode(&mut buf).expect("complete decode");
    assert_eq!(
        line.as_deref(),
        Some("{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":\"ok\"}")
    );
}

/// An unterminated trailing line is flushed at EOF.
#[test]
fn unterminated_line_is_flushed_at_eof() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"id\":4,\"result\":null}");

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    let line = codec.decode_eof(&mut buf).expect("decode_eof");
    assert_eq!(line.as_deref(), Some("{\"id\":4,\"result\":null}"));
}

/// A line longer than the limit yields a protocol error instead of
/// allocating.
#[test]
fn max_line_length_exceeded_returns_error() {
    let mut codec = NdjsonCodec::new();
    let big_line = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big_line.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Protocol(msg)) => assert!(
            msg.contains("line too long"),
            "error must mention 'line too long', got: {msg}"
        ),
        other => panic!("expected Err(AppError::Protocol(..)), got: {other:?}"),
    }
}

/// After an oversized line the codec recovers and decodes the next one.
#[test]
fn codec_recovers_after_oversized_line() {
    let mut codec = NdjsonCodec::new();
    let raw = "a".repeat(MAX_LINE_BYTES + 1) + "\n{\"id\":9,\"result\":true}\n";
    let mut buf = BytesMut::from(raw.as_str());

    assert!(codec.decode(&mut buf).is_err());

    let mut recovered = None;
    for _ in 0..4 {
        match codec.decode(&mut buf) {
            Ok(Some(line)) => {
                recovered = Some(line);
                break;
            }
            Ok(None) | Err(_) => {}
        }
    }
    assert_eq!(recovered.as_deref(), Some("{\"id\":9,\"result\":true}"));
}
