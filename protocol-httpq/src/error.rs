//! Error types for request-head parsing.

/// Error type for request-head parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The header block is not terminated yet.
    /// Not fatal for a streaming reader; a request queue hands over the whole
    /// head at once, so there it means the receive buffer was too small.
    #[error("incomplete data")]
    Incomplete,

    /// A verb, version, header name or chunk-size line is not text.
    #[error("head is not valid text")]
    InvalidEncoding,

    /// The request line does not have the `VERB SP URL SP VERSION` shape.
    #[error("malformed request line: {0}")]
    RequestLine(String),

    /// The protocol version is not `HTTP/<major>.<minor>`.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A header line has no `:` separator or an empty name.
    #[error("malformed header line: {0}")]
    HeaderLine(String),

    /// A chunk size line is not a hexadecimal length.
    #[error("invalid chunk size: {0}")]
    ChunkSize(String),
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::InvalidEncoding.is_incomplete());
        assert!(!ParseError::RequestLine("GET".to_string()).is_incomplete());
        assert!(!ParseError::HeaderLine("x".to_string()).is_incomplete());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", ParseError::Incomplete), "incomplete data");
        assert_eq!(
            format!("{}", ParseError::InvalidVersion("HTTP/x".to_string())),
            "invalid version: HTTP/x"
        );
        assert_eq!(
            format!("{}", ParseError::ChunkSize("zz".to_string())),
            "invalid chunk size: zz"
        );
    }
}
