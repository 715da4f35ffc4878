//! Bracketed section specifiers of `BODY[...]` and `BINARY[...]` items.

use super::helpers::{expect, unexpected};
use super::lexer::{Token, TokenKind, Tokenizer, decode_text};
use crate::{Error, Result};

const CONTEXT: &str = "reading section specifier";

/// A section specifier and its optional origin octet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionSpec {
    /// Canonical text between the brackets, e.g. `HEADER.FIELDS (SUBJECT)`.
    pub spec: String,
    /// Origin of a partial fetch (`<origin>`).
    pub origin: Option<u64>,
}

impl SectionSpec {
    /// Returns true if the section's payload is a header block.
    #[must_use]
    pub fn is_header(&self) -> bool {
        is_header_section(&self.spec)
    }
}

/// Returns true for `HEADER`, `HEADER.FIELDS[.NOT] (...)`, `n.HEADER...` and
/// `n.MIME`.
#[must_use]
pub fn is_header_section(spec: &str) -> bool {
    let name = spec.split_once(' ').map_or(spec, |(name, _)| name);
    let last = name.rsplit('.').find(|part| !part.eq_ignore_ascii_case("NOT"));
    let Some(last) = last else {
        return false;
    };
    last.eq_ignore_ascii_case("MIME")
        || last.eq_ignore_ascii_case("HEADER")
        || (last.eq_ignore_ascii_case("FIELDS")
            && name
                .to_ascii_uppercase()
                .contains("HEADER.FIELDS"))
}

/// Reads `[spec]` and an optional `<origin>`.
///
/// Field-name lists may contain quoted strings and literals; the canonical
/// spec renders them as plain text.
pub async fn read_section(tokens: &mut Tokenizer) -> Result<SectionSpec> {
    expect(tokens, TokenKind::OpenBracket, CONTEXT).await?;
    let mut spec = String::new();
    let mut depth = 0usize;
    loop {
        let token = tokens.read_token().await?;
        let text = match token.kind() {
            TokenKind::CloseBracket if depth == 0 => break,
            TokenKind::OpenParen => {
                depth += 1;
                "(".to_string()
            }
            TokenKind::CloseParen if depth > 0 => {
                depth -= 1;
                ")".to_string()
            }
            TokenKind::Atom | TokenKind::QString => token.text().unwrap_or_default().to_string(),
            TokenKind::Literal => decode_text(&tokens.read_literal_to_end().await?),
            _ => return Err(unexpected(CONTEXT, &token)),
        };
        let joins = !spec.is_empty() && !spec.ends_with('(') && text != ")";
        if joins {
            spec.push(' ');
        }
        spec.push_str(&text);
    }

    let origin = match tokens.peek_token().await?.as_atom() {
        Some(atom) if atom.starts_with('<') => Some(parse_origin(atom)?),
        _ => None,
    };
    if origin.is_some() {
        tokens.read_token().await?;
    }
    Ok(SectionSpec { spec, origin })
}

fn parse_origin(atom: &str) -> Result<u64> {
    atom.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .and_then(|inner| inner.split('.').next())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| unexpected(CONTEXT, &Token::atom(atom)))
}

/// Renders an item name and section the way the server echoes it.
#[must_use]
pub fn render_item(name: &str, section: &SectionSpec) -> String {
    match section.origin {
        Some(origin) => format!("{name}[{}]<{origin}>", section.spec),
        None => format!("{name}[{}]", section.spec),
    }
}

/// Fails unless the quirk that tolerates a missing section value is on.
pub(crate) fn missing_value(allowed: bool, item: &str) -> Result<()> {
    if allowed {
        tracing::warn!(item, "section has no value, treating as empty");
        Ok(())
    } else {
        Err(Error::protocol("reading FETCH", format!("{item} has no value")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::tokens;

    #[tokio::test]
    async fn test_plain_sections() {
        let mut t = tokens(b"[] [TEXT] [1.2.MIME]<0> [HEADER]<100>\r\n");
        assert_eq!(read_section(&mut t).await.unwrap(), SectionSpec::default());
        assert_eq!(read_section(&mut t).await.unwrap().spec, "TEXT");
        let mime = read_section(&mut t).await.unwrap();
        assert_eq!(mime.spec, "1.2.MIME");
        assert_eq!(mime.origin, Some(0));
        assert_eq!(read_section(&mut t).await.unwrap().origin, Some(100));
    }

    #[tokio::test]
    async fn test_field_names_with_literal() {
        let mut t = tokens(b"[HEADER.FIELDS (SUBJECT {4}\r\nFROM \"Reply-To\")] NIL\r\n");
        let section = read_section(&mut t).await.unwrap();
        assert_eq!(section.spec, "HEADER.FIELDS (SUBJECT FROM Reply-To)");
        assert!(section.origin.is_none());
        assert_eq!(t.read_token().await.unwrap(), Token::NIL);
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header_section("HEADER"));
        assert!(is_header_section("header"));
        assert!(is_header_section("HEADER.FIELDS (SUBJECT)"));
        assert!(is_header_section("HEADER.FIELDS.NOT (SUBJECT)"));
        assert!(is_header_section("1.HEADER"));
        assert!(is_header_section("2.MIME"));
        assert!(!is_header_section(""));
        assert!(!is_header_section("TEXT"));
        assert!(!is_header_section("1.2"));
    }

    #[test]
    fn test_render_item() {
        let section = SectionSpec {
            spec: "TEXT".into(),
            origin: Some(5),
        };
        assert_eq!(render_item("BODY", &section), "BODY[TEXT]<5>");
    }
}
