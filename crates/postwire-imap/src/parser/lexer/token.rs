//! IMAP token types.

use std::borrow::Cow;
use std::fmt;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Atom (unquoted string without special characters).
    Atom,
    /// Quoted string.
    QString,
    /// Literal length marker `{n}`; the payload follows on the stream.
    Literal,
    /// `NIL`.
    Nil,
    /// Backslash flag such as `\Seen` or `\*`.
    Flag,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `+` (continuation request).
    Plus,
    /// `*` (untagged response prefix).
    Asterisk,
    /// End of line.
    Eoln,
}

impl TokenKind {
    /// Short description used in error messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::QString => "quoted string",
            Self::Literal => "literal",
            Self::Nil => "NIL",
            Self::Flag => "flag",
            Self::OpenParen => "'('",
            Self::CloseParen => "')'",
            Self::OpenBracket => "'['",
            Self::CloseBracket => "']'",
            Self::Plus => "'+'",
            Self::Asterisk => "'*'",
            Self::Eoln => "end of line",
        }
    }
}

/// Payload carried by a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    /// Punctuation and NIL carry nothing.
    None,
    /// Atom, quoted-string and flag text.
    Text(Cow<'static, str>),
    /// Declared byte count of a literal.
    Length(usize),
}

/// A single IMAP token.
///
/// Tokens are immutable. Punctuation tokens are associated constants and
/// well-known keywords and system flags borrow from a static table, so the
/// common cases never allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    value: TokenValue,
}

/// Keywords that are returned borrowed from this table when the server spells
/// them exactly this way.
static KEYWORDS: &[&str] = &[
    "OK",
    "NO",
    "BAD",
    "BYE",
    "PREAUTH",
    "CAPABILITY",
    "ENABLED",
    "FETCH",
    "EXISTS",
    "RECENT",
    "EXPUNGE",
    "VANISHED",
    "EARLIER",
    "FLAGS",
    "UID",
    "BODY",
    "BODYSTRUCTURE",
    "BINARY",
    "ENVELOPE",
    "INTERNALDATE",
    "SAVEDATE",
    "RFC822",
    "RFC822.SIZE",
    "RFC822.HEADER",
    "RFC822.TEXT",
    "MODSEQ",
    "EMAILID",
    "THREADID",
    "X-GM-MSGID",
    "X-GM-THRID",
    "X-GM-LABELS",
    "ANNOTATION",
    "PREVIEW",
    "HEADER",
    "HEADER.FIELDS",
    "HEADER.FIELDS.NOT",
    "TEXT",
    "MIME",
    "SEARCH",
    "ESEARCH",
    "LIST",
    "LSUB",
    "STATUS",
    "NAMESPACE",
    "ALERT",
    "PARSE",
    "PERMANENTFLAGS",
    "READ-ONLY",
    "READ-WRITE",
    "TRYCREATE",
    "UIDNEXT",
    "UIDVALIDITY",
    "UNSEEN",
    "APPENDUID",
    "COPYUID",
    "HIGHESTMODSEQ",
    "NOMODSEQ",
    "MODIFIED",
    "CLOSED",
    "IMAP4rev1",
    "IMAP4rev2",
];

/// System flags recognised by the tokenizer.
static SYSTEM_FLAGS: &[&str] = &[
    "\\Answered",
    "\\Deleted",
    "\\Draft",
    "\\Flagged",
    "\\Recent",
    "\\Seen",
    "\\*",
];

fn lookup(table: &'static [&'static str], bytes: &[u8]) -> Option<&'static str> {
    table.iter().copied().find(|k| k.as_bytes() == bytes)
}

impl Token {
    /// `(`
    pub const OPEN_PAREN: Self = Self::punct(TokenKind::OpenParen);
    /// `)`
    pub const CLOSE_PAREN: Self = Self::punct(TokenKind::CloseParen);
    /// `[`
    pub const OPEN_BRACKET: Self = Self::punct(TokenKind::OpenBracket);
    /// `]`
    pub const CLOSE_BRACKET: Self = Self::punct(TokenKind::CloseBracket);
    /// `+`
    pub const PLUS: Self = Self::punct(TokenKind::Plus);
    /// `*`
    pub const ASTERISK: Self = Self::punct(TokenKind::Asterisk);
    /// End of line.
    pub const EOLN: Self = Self::punct(TokenKind::Eoln);
    /// `NIL`
    pub const NIL: Self = Self::punct(TokenKind::Nil);

    const fn punct(kind: TokenKind) -> Self {
        Self {
            kind,
            value: TokenValue::None,
        }
    }

    /// Creates an atom token, borrowing well-known keywords from the static
    /// table.
    #[must_use]
    pub fn atom(text: &str) -> Self {
        Self::from_atom_bytes(text.as_bytes(), || text.to_owned())
    }

    pub(crate) fn from_atom_bytes(bytes: &[u8], owned: impl FnOnce() -> String) -> Self {
        if bytes.eq_ignore_ascii_case(b"NIL") {
            return Self::NIL;
        }
        let text = lookup(KEYWORDS, bytes).map_or_else(|| Cow::Owned(owned()), Cow::Borrowed);
        Self {
            kind: TokenKind::Atom,
            value: TokenValue::Text(text),
        }
    }

    /// Creates a flag token (`\Seen`, `\*`, `\NonExistent`).
    #[must_use]
    pub fn flag(text: &str) -> Self {
        let text = lookup(SYSTEM_FLAGS, text.as_bytes())
            .map_or_else(|| Cow::Owned(text.to_owned()), Cow::Borrowed);
        Self {
            kind: TokenKind::Flag,
            value: TokenValue::Text(text),
        }
    }

    /// Creates a quoted-string token.
    #[must_use]
    pub fn qstring(text: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::QString,
            value: TokenValue::Text(Cow::Owned(text.into())),
        }
    }

    /// Creates a literal marker for `len` payload bytes.
    #[must_use]
    pub const fn literal(len: usize) -> Self {
        Self {
            kind: TokenKind::Literal,
            value: TokenValue::Length(len),
        }
    }

    /// Returns the token kind.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Returns the token's payload.
    #[must_use]
    pub const fn value(&self) -> &TokenValue {
        &self.value
    }

    /// Returns true if the token has the given kind.
    #[must_use]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Returns the text of an atom, quoted string or flag.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the text if this is an atom.
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        if self.kind == TokenKind::Atom {
            self.text()
        } else {
            None
        }
    }

    /// Returns true if this is an atom equal to `keyword`, ignoring ASCII case.
    #[must_use]
    pub fn is_atom(&self, keyword: &str) -> bool {
        self.as_atom().is_some_and(|text| text.eq_ignore_ascii_case(keyword))
    }

    /// Returns the declared length of a literal marker.
    #[must_use]
    pub const fn literal_len(&self) -> Option<usize> {
        match self.value {
            TokenValue::Length(len) => Some(len),
            _ => None,
        }
    }

    /// Returns true if the text is borrowed from the static keyword tables.
    #[must_use]
    pub const fn is_interned(&self) -> bool {
        matches!(
            self.value,
            TokenValue::None | TokenValue::Text(Cow::Borrowed(_))
        )
    }

    /// Consumes the token, returning its text.
    #[must_use]
    pub fn into_text(self) -> Option<Cow<'static, str>> {
        match self.value {
            TokenValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.value) {
            (TokenKind::QString, TokenValue::Text(text)) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            (_, TokenValue::Text(text)) => f.write_str(text),
            (_, TokenValue::Length(len)) => write!(f, "{{{len}}}"),
            (TokenKind::Nil, _) => f.write_str("NIL"),
            (TokenKind::OpenParen, _) => f.write_str("("),
            (TokenKind::CloseParen, _) => f.write_str(")"),
            (TokenKind::OpenBracket, _) => f.write_str("["),
            (TokenKind::CloseBracket, _) => f.write_str("]"),
            (TokenKind::Plus, _) => f.write_str("+"),
            (TokenKind::Asterisk, _) => f.write_str("*"),
            (kind, _) => f.write_str(kind.describe()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_interned() {
        let token = Token::atom("FETCH");
        assert!(token.is_interned());
        assert!(token.is_atom("fetch"));

        let token = Token::atom("fetch");
        assert!(!token.is_interned());
        assert!(token.is_atom("FETCH"));
        assert_eq!(token.text(), Some("fetch"));
    }

    #[test]
    fn test_nil_any_case() {
        assert_eq!(Token::atom("nil"), Token::NIL);
        assert_eq!(Token::atom("Nil").kind(), TokenKind::Nil);
        assert_eq!(Token::NIL.text(), None);
    }

    #[test]
    fn test_system_flags_are_interned() {
        assert!(Token::flag("\\Seen").is_interned());
        assert!(Token::flag("\\*").is_interned());
        let custom = Token::flag("\\Junk");
        assert!(!custom.is_interned());
        assert_eq!(custom.kind(), TokenKind::Flag);
    }

    #[test]
    fn test_display() {
        assert_eq!(Token::qstring("a \"b\"").to_string(), "\"a \\\"b\\\"\"");
        assert_eq!(Token::literal(42).to_string(), "{42}");
        assert_eq!(Token::OPEN_PAREN.to_string(), "(");
        assert_eq!(Token::EOLN.to_string(), "end of line");
        assert_eq!(Token::atom("BODY").to_string(), "BODY");
    }

    #[test]
    fn test_literal_len() {
        assert_eq!(Token::literal(7).literal_len(), Some(7));
        assert_eq!(Token::atom("7").literal_len(), None);
    }
}
