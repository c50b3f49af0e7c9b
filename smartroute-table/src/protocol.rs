//! Postfix `tcp_table(5)` request and reply lines
//!
//! Requests are `get <key>` with the key percent-encoded by Postfix. Replies are
//! `<code> <payload>` where the payload is percent-encoded in turn:
//!
//! | code  | meaning                         |
//! |-------|---------------------------------|
//! | `200` | found, payload is the value     |
//! | `500` | not found, payload `NO RESULT`  |
//! | `400` | error, payload describes it     |

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use smartroute_routing::NO_RESULT;
use thiserror::Error;

/// Longest request line accepted, excluding the line terminator
pub const MAX_LINE: usize = 4096;

/// Everything except ASCII alphanumerics and `_ . - ~ /` is escaped
const PAYLOAD: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Request line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Request is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid percent escape in {0:?}")]
    InvalidEscape(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `get <key>`, with the key decoded
    Get(String),
    /// `get *`, a wildcard probe that is never routed
    Wildcard,
    /// Any other command, e.g. `put`
    Unsupported(String),
}

impl Request {
    /// Parse one request line, with or without its terminator.
    ///
    /// # Errors
    ///
    /// If the line or the decoded key is not UTF-8, or the key contains a `%`
    /// that does not start a two digit hex escape.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let line = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .trim();

        let (command, key) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(command, key)| (command, key.trim()));

        if !command.eq_ignore_ascii_case("get") {
            return Ok(Self::Unsupported(command.to_string()));
        }

        validate_escapes(key)?;
        let key = percent_decode_str(key)
            .decode_utf8()
            .map_err(|_| ProtocolError::InvalidUtf8)?;

        if key == "*" {
            Ok(Self::Wildcard)
        } else {
            Ok(Self::Get(key.into_owned()))
        }
    }
}

fn validate_escapes(key: &str) -> Result<(), ProtocolError> {
    let bytes = key.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(ProtocolError::InvalidEscape(key.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Found(String),
    NotFound,
    Error(String),
}

impl Response {
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Found(_) => 200,
            Self::Error(_) => 400,
            Self::NotFound => 500,
        }
    }

    fn payload(&self) -> &str {
        match self {
            Self::Found(payload) | Self::Error(payload) => payload,
            Self::NotFound => NO_RESULT,
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Self::Error(err.to_string())
    }
}

/// The reply line without its terminating newline
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.code(),
            utf8_percent_encode(self.payload(), PAYLOAD)
        )
    }
}
