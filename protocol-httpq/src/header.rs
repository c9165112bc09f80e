//! Known-header tables.
//!
//! The request queue transports a fixed set of well-known headers as slots
//! in an indexed array and everything else as a name/value list. The two
//! tables below fix the slot order. Indices are part of the wire contract
//! with the kernel and must never be reordered.

macro_rules! header_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident, $count:ident, $names:ident {
            $($variant:ident = $idx:literal => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $idx,)+
        }

        /// Lower-case header names in table order.
        pub const $names: &[&str] = &[$($text,)+];

        /// Number of slots in the table.
        pub const $count: usize = $names.len();

        impl $name {
            const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Slot index of this header.
            #[inline]
            pub fn index(self) -> usize {
                self as usize
            }

            /// Header for a slot index, if the index is in range.
            #[inline]
            pub fn from_index(index: usize) -> Option<Self> {
                Self::ALL.get(index).copied()
            }

            /// Canonical lower-case header name.
            #[inline]
            pub fn name(self) -> &'static str {
                $names[self as usize]
            }

            /// Case-insensitive lookup by header name.
            pub fn from_name(name: &str) -> Option<Self> {
                $names
                    .iter()
                    .position(|known| known.eq_ignore_ascii_case(name))
                    .and_then(Self::from_index)
            }

            /// Iterate the table in slot order.
            pub fn iter() -> impl Iterator<Item = Self> {
                Self::ALL.iter().copied()
            }
        }
    };
}

header_table! {
    /// Well-known request headers, indexed as the kernel delivers them.
    pub enum RequestHeader, REQUEST_HEADER_COUNT, REQUEST_HEADER_NAMES {
        CacheControl = 0 => "cache-control",
        Connection = 1 => "connection",
        Date = 2 => "date",
        KeepAlive = 3 => "keep-alive",
        Pragma = 4 => "pragma",
        Trailer = 5 => "trailer",
        TransferEncoding = 6 => "transfer-encoding",
        Upgrade = 7 => "upgrade",
        Via = 8 => "via",
        Warning = 9 => "warning",
        Allow = 10 => "allow",
        ContentLength = 11 => "content-length",
        ContentType = 12 => "content-type",
        ContentEncoding = 13 => "content-encoding",
        ContentLanguage = 14 => "content-language",
        ContentLocation = 15 => "content-location",
        ContentMd5 = 16 => "content-md5",
        ContentRange = 17 => "content-range",
        Expires = 18 => "expires",
        LastModified = 19 => "last-modified",
        Accept = 20 => "accept",
        AcceptCharset = 21 => "accept-charset",
        AcceptEncoding = 22 => "accept-encoding",
        AcceptLanguage = 23 => "accept-language",
        Authorization = 24 => "authorization",
        Cookie = 25 => "cookie",
        Expect = 26 => "expect",
        From = 27 => "from",
        Host = 28 => "host",
        IfMatch = 29 => "if-match",
        IfModifiedSince = 30 => "if-modified-since",
        IfNoneMatch = 31 => "if-none-match",
        IfRange = 32 => "if-range",
        IfUnmodifiedSince = 33 => "if-unmodified-since",
        MaxForwards = 34 => "max-forwards",
        ProxyAuthorization = 35 => "proxy-authorization",
        Referer = 36 => "referer",
        Range = 37 => "range",
        Te = 38 => "te",
        Translate = 39 => "translate",
        UserAgent = 40 => "user-agent",
    }
}

header_table! {
    /// Well-known response headers, indexed as the kernel expects them.
    ///
    /// Slots 0..20 are shared with [`RequestHeader`]; the response-only
    /// headers follow.
    pub enum ResponseHeader, RESPONSE_HEADER_COUNT, RESPONSE_HEADER_NAMES {
        CacheControl = 0 => "cache-control",
        Connection = 1 => "connection",
        Date = 2 => "date",
        KeepAlive = 3 => "keep-alive",
        Pragma = 4 => "pragma",
        Trailer = 5 => "trailer",
        TransferEncoding = 6 => "transfer-encoding",
        Upgrade = 7 => "upgrade",
        Via = 8 => "via",
        Warning = 9 => "warning",
        Allow = 10 => "allow",
        ContentLength = 11 => "content-length",
        ContentType = 12 => "content-type",
        ContentEncoding = 13 => "content-encoding",
        ContentLanguage = 14 => "content-language",
        ContentLocation = 15 => "content-location",
        ContentMd5 = 16 => "content-md5",
        ContentRange = 17 => "content-range",
        Expires = 18 => "expires",
        LastModified = 19 => "last-modified",
        AcceptRanges = 20 => "accept-ranges",
        Age = 21 => "age",
        Etag = 22 => "etag",
        Location = 23 => "location",
        ProxyAuthenticate = 24 => "proxy-authenticate",
        RetryAfter = 25 => "retry-after",
        Server = 26 => "server",
        SetCookie = 27 => "set-cookie",
        Vary = 28 => "vary",
        WwwAuthenticate = 29 => "www-authenticate",
    }
}
