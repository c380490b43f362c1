//! Database error diagnostics
//!
//! Driver errors reach the logs through [`describe_error`], which turns them
//! into short actionable messages. Servers configured with a non-UTF-8
//! `lc_messages` send error text the client cannot decode, so raw payloads are
//! re-decoded with a fixed list of encodings before classification.
//!
//! Everything here is pure and total: no logging, no panics.

use std::error::Error as StdError;
use std::fmt::Write;
use std::string::FromUtf8Error;

/// Encodings tried, in order, when an error payload is not valid text
pub const DECODE_ORDER: [TextEncoding; 3] = [
    TextEncoding::Utf8,
    TextEncoding::Windows1252,
    TextEncoding::Latin1,
];

const MESSAGE_UNAVAILABLE: &str = "database error (message unavailable)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    Latin1,
}

impl TextEncoding {
    /// Decode `bytes`, or `None` if they are not valid in this encoding
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Windows1252 => bytes.iter().map(|b| windows_1252_char(*b)).collect(),
            TextEncoding::Latin1 => Some(bytes.iter().map(|b| char::from(*b)).collect()),
        }
    }
}

/// Windows-1252 differs from Latin-1 only in 0x80..=0x9F, where five bytes
/// are unassigned
fn windows_1252_char(byte: u8) -> Option<char> {
    let c = match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        other => char::from(other),
    };
    Some(c)
}

/// Decode a raw payload with the first encoding in [`DECODE_ORDER`] that accepts it
pub fn decode_payload(bytes: &[u8]) -> Option<String> {
    DECODE_ORDER
        .iter()
        .find_map(|encoding| encoding.decode(bytes))
}

/// Known failure categories with a fixed, actionable message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Authentication,
    ConnectionRefused,
    MissingDatabase,
    HostRuleRejected,
}

impl FailureCategory {
    /// Classify error text, matching on its lower-cased form
    pub fn classify(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        let text = text.to_lowercase();

        if text.contains("password authentication failed")
            || text.contains("authentication failed")
            || text.contains("autenticação do tipo senha falhou")
        {
            return Some(Self::Authentication);
        }
        if text.contains("connection refused") || text.contains("não foi possível conectar") {
            return Some(Self::ConnectionRefused);
        }
        if (text.contains("database") && text.contains("does not exist"))
            || (text.contains("banco de dados") && text.contains("não existe"))
        {
            return Some(Self::MissingDatabase);
        }
        if text.contains("no pg_hba.conf entry") {
            return Some(Self::HostRuleRejected);
        }
        None
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Authentication => {
                "authentication to PostgreSQL failed (check POSTGRES_USER and POSTGRES_PASSWORD in .env)."
            }
            Self::ConnectionRefused => {
                "could not connect to PostgreSQL (check host/port and that the service is running)."
            }
            Self::MissingDatabase => "the configured database does not exist (check POSTGRES_DB).",
            Self::HostRuleRejected => {
                "access to PostgreSQL denied by a pg_hba.conf rule for this host/user."
            }
        }
    }
}

/// Fixed message for a known category, if `text` falls into one
pub fn friendly_message(text: &str) -> Option<&'static str> {
    FailureCategory::classify(text).map(|category| category.message())
}

/// Turn an error into a short diagnostic string
///
/// 1. If the error (or anything in its source chain) is a UTF-8 decode
///    failure, its raw bytes are re-decoded and classified.
/// 2. Otherwise the displayed text is classified.
/// 3. Unclassified text is returned as-is.
pub fn describe_error(err: &(dyn StdError + 'static)) -> String {
    if let Some(decoded) = find_undecodable_payload(err) {
        if let Some(friendly) = friendly_message(&decoded) {
            return friendly.to_string();
        }
        let decoded = decoded.trim();
        if !decoded.is_empty() {
            return decoded.to_string();
        }
    }

    describe_message(&render(err))
}

/// Classify an already-rendered error message
pub fn describe_message(text: &str) -> String {
    if let Some(friendly) = friendly_message(text) {
        return friendly.to_string();
    }
    let lowered = text.to_lowercase();
    if lowered.contains("invalid utf-8") && lowered.contains("decod") {
        return "failed to decode the response from PostgreSQL.".to_string();
    }
    if text.trim().is_empty() {
        return MESSAGE_UNAVAILABLE.to_string();
    }
    text.to_string()
}

fn find_undecodable_payload(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(utf8) = e.downcast_ref::<FromUtf8Error>() {
            return decode_payload(utf8.as_bytes());
        }
        current = e.source();
    }
    None
}

/// Display the error, falling back to Debug, without panicking on a
/// misbehaving `Display` impl
fn render(err: &(dyn StdError + 'static)) -> String {
    let mut out = String::new();
    if write!(out, "{}", err).is_ok() {
        return out;
    }
    out.clear();
    if write!(out, "{:?}", err).is_ok() {
        return out;
    }
    MESSAGE_UNAVAILABLE.to_string()
}
