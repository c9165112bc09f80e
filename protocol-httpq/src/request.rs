//! Request-head parsing.
//!
//! A receive-request completion hands over the request line and header
//! block in one buffer. [`RequestHead::parse`] splits it into the verb,
//! URL, version, known headers (by [`RequestHeader`] slot) and the list of
//! unknown headers.

use crate::error::ParseError;
use crate::header::{REQUEST_HEADER_COUNT, RequestHeader};
use crate::verb::Verb;

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };
}

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub verb: Verb,
    /// Raw request target as sent on the wire.
    pub url: String,
    pub version: Version,
    known: [Option<String>; REQUEST_HEADER_COUNT],
    unknown: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a head from the start of `data`.
    ///
    /// Returns the head and the number of bytes consumed, including the
    /// blank line that terminates the header block. The verb, version and
    /// header names must be ASCII text. The URL and header values may carry
    /// any octets; bytes that are not UTF-8 are replaced with U+FFFD.
    pub fn parse(data: &[u8]) -> Result<(RequestHead, usize), ParseError> {
        let end = find_header_end(data).ok_or(ParseError::Incomplete)?;
        let mut lines = lines(&data[..end]);

        // Request line: GET /path HTTP/1.1
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(|&b| b == b' ').filter(|p| !p.is_empty());
        let (Some(verb), Some(url), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::RequestLine(lossy(request_line)));
        };
        let verb = std::str::from_utf8(verb).map_err(|_| ParseError::InvalidEncoding)?;
        let version = parse_version(version)?;

        let mut head = RequestHead {
            verb: Verb::parse(verb),
            url: lossy(url),
            version,
            known: std::array::from_fn(|_| None),
            unknown: Vec::new(),
        };

        for line in lines {
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                return Err(ParseError::HeaderLine(lossy(line)));
            };
            let name = std::str::from_utf8(&line[..colon])
                .map_err(|_| ParseError::InvalidEncoding)?
                .trim();
            if name.is_empty() {
                return Err(ParseError::HeaderLine(lossy(line)));
            }
            let value = String::from_utf8_lossy(&line[colon + 1..]);
            head.append(name, value.trim());
        }

        Ok((head, end + 4))
    }

    /// Builder-style constructor used when a head is assembled rather than
    /// parsed.
    pub fn new(verb: Verb, url: impl Into<String>, version: Version) -> RequestHead {
        RequestHead {
            verb,
            url: url.into(),
            version,
            known: std::array::from_fn(|_| None),
            unknown: Vec::new(),
        }
    }

    /// Add a header. Repeated known headers are folded into one
    /// comma-separated value; unknown headers keep every occurrence.
    pub fn append(&mut self, name: &str, value: &str) {
        match RequestHeader::from_name(name) {
            Some(header) => {
                let slot = &mut self.known[header.index()];
                match slot {
                    Some(existing) => {
                        existing.push_str(", ");
                        existing.push_str(value);
                    }
                    None => *slot = Some(value.to_string()),
                }
            }
            None => self.unknown.push((name.to_string(), value.to_string())),
        }
    }

    /// Value of a known header.
    #[inline]
    pub fn known(&self, header: RequestHeader) -> Option<&str> {
        self.known[header.index()].as_deref()
    }

    /// Headers outside the known table, in arrival order with their
    /// original spelling.
    #[inline]
    pub fn unknown(&self) -> &[(String, String)] {
        &self.unknown
    }

    /// Case-insensitive lookup across both tables. For unknown headers the
    /// first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        match RequestHeader::from_name(name) {
            Some(header) => self.known(header),
            None => self
                .unknown
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
        }
    }

    /// All headers: known ones in table order, then unknown ones.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let known = RequestHeader::iter()
            .filter_map(|h| self.known(h).map(|v| (h.name(), v)));
        let unknown = self.unknown.iter().map(|(n, v)| (n.as_str(), v.as_str()));
        known.chain(unknown)
    }

    /// Declared body length, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.known(RequestHeader::ContentLength)?.parse().ok()
    }

    /// Whether the client announced a chunked body.
    pub fn is_chunked(&self) -> bool {
        self.known(RequestHeader::TransferEncoding)
            .is_some_and(|te| te.eq_ignore_ascii_case("chunked"))
    }
}

fn parse_version(raw: &[u8]) -> Result<Version, ParseError> {
    let invalid = || ParseError::InvalidVersion(lossy(raw));
    let text = std::str::from_utf8(raw).map_err(|_| invalid())?;
    let rest = text.strip_prefix("HTTP/").ok_or_else(invalid)?;
    let (major, minor) = rest.split_once('.').ok_or_else(invalid)?;
    Ok(Version {
        major: major.parse().map_err(|_| invalid())?,
        minor: minor.parse().map_err(|_| invalid())?,
    })
}

/// Split a header block into its CRLF-separated lines.
fn lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(block);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(2).position(|w| w == b"\r\n") {
            Some(at) => {
                rest = Some(&current[at + 2..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Offset of the `\r\n\r\n` that ends the header block.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let data = b"GET /index.html?q=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test\r\n\r\n";
        let (head, consumed) = RequestHead::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(head.verb, Verb::Get);
        assert_eq!(head.url, "/index.html?q=1");
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(head.known(RequestHeader::Host), Some("example.com"));
        assert_eq!(head.known(RequestHeader::UserAgent), Some("test"));
        assert!(head.unknown().is_empty());
    }

    #[test]
    fn parse_unknown_verb_and_headers() {
        let data = b"PATCH /x HTTP/1.0\r\nX-Trace: abc\r\nx-trace: def\r\n\r\n";
        let (head, _) = RequestHead::parse(data).unwrap();
        assert_eq!(head.verb, Verb::Unknown("PATCH".to_string()));
        assert_eq!(head.version, Version::HTTP_10);
        assert_eq!(head.unknown().len(), 2);
        assert_eq!(head.header("X-TRACE"), Some("abc"));
    }

    #[test]
    fn repeated_known_headers_fold() {
        let data = b"GET / HTTP/1.1\r\nAccept: text/html\r\naccept: */*\r\n\r\n";
        let (head, _) = RequestHead::parse(data).unwrap();
        assert_eq!(head.known(RequestHeader::Accept), Some("text/html, */*"));
    }

    #[test]
    fn body_bytes_are_not_consumed() {
        let data = b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (head, consumed) = RequestHead::parse(data).unwrap();
        assert_eq!(&data[consumed..], b"hello");
        assert_eq!(head.content_length(), Some(5));
    }

    #[test]
    fn incomplete_head() {
        let err = RequestHead::parse(b"GET / HTTP/1.1\r\nHost: a\r\n").unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn malformed_request_line() {
        assert!(matches!(
            RequestHead::parse(b"GET /\r\n\r\n"),
            Err(ParseError::RequestLine(_))
        ));
        assert!(matches!(
            RequestHead::parse(b"GET / HTTP/1.1 extra\r\n\r\n"),
            Err(ParseError::RequestLine(_))
        ));
    }

    #[test]
    fn malformed_version() {
        assert!(matches!(
            RequestHead::parse(b"GET / HTTQ/1.1\r\n\r\n"),
            Err(ParseError::InvalidVersion(_))
        ));
        assert!(matches!(
            RequestHead::parse(b"GET / HTTP/one\r\n\r\n"),
            Err(ParseError::InvalidVersion(_))
        ));
    }

    #[test]
    fn malformed_header_line() {
        assert!(matches!(
            RequestHead::parse(b"GET / HTTP/1.1\r\nno-colon\r\n\r\n"),
            Err(ParseError::HeaderLine(_))
        ));
        assert!(matches!(
            RequestHead::parse(b"GET / HTTP/1.1\r\n: v\r\n\r\n"),
            Err(ParseError::HeaderLine(_))
        ));
    }

    #[test]
    fn headers_iterates_known_then_unknown() {
        let data = b"GET / HTTP/1.1\r\nX-A: 1\r\nHost: h\r\nContent-Type: t\r\n\r\n";
        let (head, _) = RequestHead::parse(data).unwrap();
        let all: Vec<_> = head.headers().collect();
        assert_eq!(
            all,
            vec![("content-type", "t"), ("host", "h"), ("X-A", "1")]
        );
    }

    #[test]
    fn latin1_header_value_is_decoded_lossily() {
        let data = b"GET /app/ HTTP/1.1\r\nHost: example\r\nX-Name: caf\xe9\r\n\r\n";
        let (head, consumed) = RequestHead::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(head.known(RequestHeader::Host), Some("example"));
        assert_eq!(head.header("x-name"), Some("caf\u{fffd}"));
    }

    #[test]
    fn raw_url_octets_survive() {
        let data = b"GET /caf\xe9 HTTP/1.1\r\n\r\n";
        let (head, _) = RequestHead::parse(data).unwrap();
        assert_eq!(head.url, "/caf\u{fffd}");
    }

    #[test]
    fn non_text_header_name_is_rejected() {
        assert_eq!(
            RequestHead::parse(b"GET / HTTP/1.1\r\nX-\xff: v\r\n\r\n"),
            Err(ParseError::InvalidEncoding)
        );
    }

    #[test]
    fn chunked_detection() {
        let data = b"POST / HTTP/1.1\r\nTransfer-Encoding: Chunked\r\n\r\n";
        let (head, _) = RequestHead::parse(data).unwrap();
        assert!(head.is_chunked());
        assert_eq!(head.content_length(), None);
    }
}
