//! Inbound line framing for the server's stdout.
//!
//! A bounded [`LinesCodec`] splits the byte stream on `\n`. Bytes of an
//! unfinished line stay in the read buffer, so a response that reaches us in
//! several chunks is yielded once, whole. The stdin side needs no codec; the
//! writer task frames its own output.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Longest stdout line the bridge will buffer: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Decoder yielding one `String` per stdout line, newline stripped.
///
/// A line over [`MAX_LINE_BYTES`] fails with [`AppError::Protocol`]; the
/// inner codec then skips to the next newline so the stream stays usable.
#[derive(Debug)]
pub struct NdjsonCodec {
    lines: LinesCodec,
}

impl NdjsonCodec {
    /// Codec bounded by [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.lines.decode(src).map_err(into_app_error)
    }

    // A server that exits mid-line still gets its last line dispatched.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.lines.decode_eof(src).map_err(into_app_error)
    }
}

fn into_app_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
            "line too long: server stdout line exceeded {MAX_LINE_BYTES} bytes"
        )),
        LinesCodecError::Io(err) => err.into(),
    }
}
