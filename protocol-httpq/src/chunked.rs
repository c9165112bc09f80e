//! Chunked transfer framing.
//!
//! Encoding produces [`Bytes`] fragments so a body chunk is framed without
//! copying it; the response writer concatenates fragments into one buffer
//! when it hands them to the kernel.

use bytes::Bytes;

use crate::error::ParseError;

/// Terminator sent after the last chunk.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

const CRLF: &[u8] = b"\r\n";

/// Frame one chunk as `<hex len>\r\n<data>\r\n`. Empty data produces no
/// fragments (a zero-length chunk would terminate the body).
pub fn frame(data: Bytes, out: &mut Vec<Bytes>) {
    if data.is_empty() {
        return;
    }
    out.push(Bytes::from(format!("{:x}\r\n", data.len())));
    out.push(data);
    out.push(Bytes::from_static(CRLF));
}

/// Append the terminating zero-length chunk.
pub fn finish(out: &mut Vec<Bytes>) {
    out.push(Bytes::from_static(LAST_CHUNK));
}

/// Frame a whole write: every fragment, plus the terminator when
/// `is_last`.
pub fn frame_all<I>(fragments: I, is_last: bool) -> Vec<Bytes>
where
    I: IntoIterator<Item = Bytes>,
{
    let mut out = Vec::new();
    for data in fragments {
        frame(data, &mut out);
    }
    if is_last {
        finish(&mut out);
    }
    out
}

/// Result of decoding one chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// A data chunk and the bytes consumed, framing included.
    Data(&'a [u8], usize),
    /// The terminating chunk and the bytes consumed.
    Last(usize),
}

/// Decode one chunk from the start of `data`.
///
/// Chunk extensions (`;name=value`) are ignored. Trailers are not
/// supported: the terminator must be `0\r\n\r\n`.
pub fn decode(data: &[u8]) -> Result<Chunk<'_>, ParseError> {
    let crlf = find_crlf(data).ok_or(ParseError::Incomplete)?;
    let line = std::str::from_utf8(&data[..crlf]).map_err(|_| ParseError::InvalidEncoding)?;
    let size_hex = line.split(';').next().unwrap_or("").trim();
    let size = usize::from_str_radix(size_hex, 16)
        .map_err(|_| ParseError::ChunkSize(line.to_string()))?;

    let start = crlf + 2;
    if size == 0 {
        if data.len() < start + 2 {
            return Err(ParseError::Incomplete);
        }
        if &data[start..start + 2] != CRLF {
            return Err(ParseError::ChunkSize(line.to_string()));
        }
        return Ok(Chunk::Last(start + 2));
    }

    let (end, next) = start
        .checked_add(size)
        .and_then(|end| Some((end, end.checked_add(2)?)))
        .ok_or_else(|| ParseError::ChunkSize(line.to_string()))?;
    if data.len() < next {
        return Err(ParseError::Incomplete);
    }
    if &data[end..end + 2] != CRLF {
        return Err(ParseError::ChunkSize(line.to_string()));
    }
    Ok(Chunk::Data(&data[start..end], next))
}

/// Decode a complete chunked body into its payload.
///
/// Returns the payload and whether the terminator was seen.
pub fn decode_body(mut data: &[u8]) -> Result<(Vec<u8>, bool), ParseError> {
    let mut payload = Vec::new();
    while !data.is_empty() {
        match decode(data)? {
            Chunk::Data(chunk, consumed) => {
                payload.extend_from_slice(chunk);
                data = &data[consumed..];
            }
            Chunk::Last(_) => return Ok((payload, true)),
        }
    }
    Ok((payload, false))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == CRLF)
}
