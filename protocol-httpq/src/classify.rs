//! Response header classification.
//!
//! Applications describe response headers by name. The request queue wants
//! well-known headers in their [`ResponseHeader`] slots and the rest as a
//! name/value list, so [`classify`] sorts them and decides the framing.

use crate::header::ResponseHeader;

/// Response headers split by table membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedHeaders {
    pub known: Vec<(ResponseHeader, String)>,
    pub unknown: Vec<(String, String)>,
    /// The body must be sent with chunked framing because neither
    /// `content-length` nor `transfer-encoding` was supplied. When set,
    /// `transfer-encoding: chunked` has already been added to `known`.
    pub chunked: bool,
}

/// Classify named response headers.
///
/// Names are matched case-insensitively. Unknown names are lower-cased.
pub fn classify<'a, I>(headers: I) -> ClassifiedHeaders
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = ClassifiedHeaders::default();
    let mut framed = false;

    for (name, value) in headers {
        match ResponseHeader::from_name(name) {
            Some(header) => {
                if matches!(
                    header,
                    ResponseHeader::ContentLength | ResponseHeader::TransferEncoding
                ) {
                    framed = true;
                }
                out.known.push((header, value.to_string()));
            }
            None => out
                .unknown
                .push((name.to_ascii_lowercase(), value.to_string())),
        }
    }

    if !framed {
        out.known
            .push((ResponseHeader::TransferEncoding, "chunked".to_string()));
        out.chunked = true;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_known_and_unknown() {
        let c = classify([
            ("Content-Type", "text/plain"),
            ("Content-Length", "5"),
            ("X-Powered-By", "httpq"),
        ]);
        assert_eq!(
            c.known,
            vec![
                (ResponseHeader::ContentType, "text/plain".to_string()),
                (ResponseHeader::ContentLength, "5".to_string()),
            ]
        );
        assert_eq!(
            c.unknown,
            vec![("x-powered-by".to_string(), "httpq".to_string())]
        );
        assert!(!c.chunked);
    }

    #[test]
    fn adds_chunked_when_unframed() {
        let c = classify([("etag", "\"v1\"")]);
        assert!(c.chunked);
        assert!(
            c.known
                .contains(&(ResponseHeader::TransferEncoding, "chunked".to_string()))
        );
    }

    #[test]
    fn explicit_transfer_encoding_is_respected() {
        let c = classify([("Transfer-Encoding", "identity")]);
        assert!(!c.chunked);
        assert_eq!(c.known.len(), 1);
    }
}
