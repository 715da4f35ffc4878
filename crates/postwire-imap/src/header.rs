//! Header blocks returned by `BODY[HEADER]` style fetches.

use std::fmt;

use thiserror::Error;

use crate::parser::lexer::decode_text;

/// Errors from [`HeaderList::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// A line is neither a field nor a continuation.
    #[error("line {line} is not a header field")]
    Malformed {
        /// 1-based line number.
        line: usize,
    },
    /// A field with nothing before the colon.
    #[error("line {line} has an empty field name")]
    EmptyName {
        /// 1-based line number.
        line: usize,
    },
}

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Field name as sent.
    pub name: String,
    /// Unfolded value with surrounding whitespace trimmed.
    pub value: String,
}

/// Header fields in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Parses a raw header block.
    ///
    /// Continuation lines (starting with space or tab) are unfolded into the
    /// preceding field. Parsing stops at the first empty line; anything after
    /// it is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is neither a field nor a continuation.
    pub fn parse(raw: &[u8]) -> Result<Self, HeaderError> {
        let mut headers: Vec<Header> = Vec::new();

        for (index, line) in raw.split(|&b| b == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let number = index + 1;
            if line.is_empty() {
                break;
            }

            if matches!(line[0], b' ' | b'\t') {
                let Some(last) = headers.last_mut() else {
                    return Err(HeaderError::Malformed { line: number });
                };
                let text = decode_text(line);
                let text = text.trim();
                if !text.is_empty() {
                    if !last.value.is_empty() {
                        last.value.push(' ');
                    }
                    last.value.push_str(text);
                }
                continue;
            }

            let Some(colon) = line.iter().position(|&b| b == b':') else {
                return Err(HeaderError::Malformed { line: number });
            };
            let name = decode_text(&line[..colon]).trim_end().to_string();
            if name.is_empty() {
                return Err(HeaderError::EmptyName { line: number });
            }
            let value = decode_text(&line[colon + 1..]).trim().to_string();
            headers.push(Header { name, value });
        }

        Ok(Self { headers })
    }

    /// Adds a field at the end.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Returns the first value of a field, matching the name case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Returns every value of a field in wire order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    /// Number of fields.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in &self.headers {
            write!(f, "{}: {}\r\n", header.name, header.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_order() {
        let raw = b"Received: a\r\nSubject: Hello\r\nReceived: b\r\n\r\nbody";
        let headers = HeaderList::parse(raw).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("subject"), Some("Hello"));
        assert_eq!(headers.get_all("RECEIVED").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(headers.iter().next().unwrap().name, "Received");
    }

    #[test]
    fn test_folded_value() {
        let raw = b"Subject: a very\r\n  long\r\n\tsubject\r\n\r\n";
        let headers = HeaderList::parse(raw).unwrap();
        assert_eq!(headers.get("Subject"), Some("a very long subject"));
    }

    #[test]
    fn test_missing_terminator_is_accepted() {
        let headers = HeaderList::parse(b"From: a@example.com\r\n").unwrap();
        assert_eq!(headers.get("from"), Some("a@example.com"));
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            HeaderList::parse(b"Subject: ok\r\nnot a header\r\n\r\n"),
            Err(HeaderError::Malformed { line: 2 })
        );
        assert_eq!(
            HeaderList::parse(b" leading continuation\r\n"),
            Err(HeaderError::Malformed { line: 1 })
        );
        assert_eq!(
            HeaderList::parse(b": value\r\n"),
            Err(HeaderError::EmptyName { line: 1 })
        );
    }

    #[test]
    fn test_latin1_value() {
        let headers = HeaderList::parse(b"Subject: caf\xe9\r\n\r\n").unwrap();
        assert_eq!(headers.get("Subject"), Some("caf\u{e9}"));
    }

    #[test]
    fn test_display() {
        let mut headers = HeaderList::new();
        headers.push("To", "x@example.com");
        assert_eq!(headers.to_string(), "To: x@example.com\r\n");
    }
}
