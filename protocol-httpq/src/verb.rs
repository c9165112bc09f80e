//! Request verbs.

use std::fmt;

/// Verb table in kernel order. Slots 0..=2 (unparsed, unknown, invalid)
/// have no text; a request carrying one of them is surfaced through
/// [`Verb::Unknown`] with the literal verb text instead.
pub const VERB_NAMES: [Option<&str>; VERB_COUNT] = [
    None,
    None,
    None,
    Some("OPTIONS"),
    Some("GET"),
    Some("HEAD"),
    Some("POST"),
    Some("PUT"),
    Some("DELETE"),
    Some("TRACE"),
    Some("CONNECT"),
    Some("TRACK"),
    Some("MOVE"),
    Some("COPY"),
    Some("PROPFIND"),
    Some("PROPPATCH"),
    Some("MKCOL"),
    Some("LOCK"),
    Some("UNLOCK"),
    Some("SEARCH"),
];

/// Number of slots in the verb table.
pub const VERB_COUNT: usize = 20;

/// Table slot the kernel uses for verbs it does not know.
pub const UNKNOWN_VERB_INDEX: usize = 1;

/// A request verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Track,
    Move,
    Copy,
    Propfind,
    Proppatch,
    Mkcol,
    Lock,
    Unlock,
    Search,
    /// Any verb outside the table, carried verbatim.
    Unknown(String),
}

impl Verb {
    /// Parse verb text. Known verbs are matched exactly (verbs are
    /// case-sensitive); anything else becomes [`Verb::Unknown`].
    pub fn parse(text: &str) -> Verb {
        match VERB_NAMES.iter().position(|v| *v == Some(text)) {
            Some(idx) => Verb::from_index(idx).unwrap_or_else(|| Verb::Unknown(text.to_string())),
            None => Verb::Unknown(text.to_string()),
        }
    }

    /// Known verb for a table slot. Slots without text and out-of-range
    /// slots yield `None`.
    pub fn from_index(index: usize) -> Option<Verb> {
        let verb = match index {
            3 => Verb::Options,
            4 => Verb::Get,
            5 => Verb::Head,
            6 => Verb::Post,
            7 => Verb::Put,
            8 => Verb::Delete,
            9 => Verb::Trace,
            10 => Verb::Connect,
            11 => Verb::Track,
            12 => Verb::Move,
            13 => Verb::Copy,
            14 => Verb::Propfind,
            15 => Verb::Proppatch,
            16 => Verb::Mkcol,
            17 => Verb::Lock,
            18 => Verb::Unlock,
            19 => Verb::Search,
            _ => return None,
        };
        Some(verb)
    }

    /// Table slot for this verb.
    pub fn index(&self) -> usize {
        match self {
            Verb::Options => 3,
            Verb::Get => 4,
            Verb::Head => 5,
            Verb::Post => 6,
            Verb::Put => 7,
            Verb::Delete => 8,
            Verb::Trace => 9,
            Verb::Connect => 10,
            Verb::Track => 11,
            Verb::Move => 12,
            Verb::Copy => 13,
            Verb::Propfind => 14,
            Verb::Proppatch => 15,
            Verb::Mkcol => 16,
            Verb::Lock => 17,
            Verb::Unlock => 18,
            Verb::Search => 19,
            Verb::Unknown(_) => UNKNOWN_VERB_INDEX,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verb::Unknown(text) => text,
            known => VERB_NAMES[known.index()].unwrap_or(""),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
