//! Parser helper functions.

use super::lexer::{Token, TokenKind, Tokenizer, decode_text};
use crate::types::{Capabilities, Capability, Flag, Flags};
use crate::{Error, Result};

/// Builds the protocol error for a token that does not fit the grammar.
pub fn unexpected(context: &'static str, token: &Token) -> Error {
    Error::protocol(context, format!("unexpected {}", describe(token)))
}

/// Reads a token that must be of the given kind.
pub async fn expect(
    tokens: &mut Tokenizer,
    kind: TokenKind,
    context: &'static str,
) -> Result<Token> {
    let token = tokens.read_token().await?;
    if token.is(kind) {
        Ok(token)
    } else {
        Err(Error::protocol(
            context,
            format!("expected {}, found {}", kind.describe(), describe(&token)),
        ))
    }
}

fn describe(token: &Token) -> String {
    match token.kind() {
        TokenKind::Atom | TokenKind::QString | TokenKind::Flag => {
            format!("{} {token}", token.kind().describe())
        }
        kind => kind.describe().to_string(),
    }
}

/// Reads an unsigned 32-bit number.
pub async fn read_number(tokens: &mut Tokenizer, context: &'static str) -> Result<u32> {
    let token = tokens.read_token().await?;
    token
        .as_atom()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| unexpected(context, &token))
}

/// Reads an unsigned 64-bit number.
pub async fn read_u64(tokens: &mut Tokenizer, context: &'static str) -> Result<u64> {
    let token = tokens.read_token().await?;
    token
        .as_atom()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| unexpected(context, &token))
}

/// Reads an nstring: NIL, a quoted string, or a literal.
///
/// Atoms are accepted as well since several servers send them unquoted.
pub async fn read_nstring(
    tokens: &mut Tokenizer,
    context: &'static str,
) -> Result<Option<String>> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::Nil => Ok(None),
        TokenKind::QString | TokenKind::Atom => Ok(token.into_text().map(Into::into)),
        TokenKind::Literal => {
            let data = tokens.read_literal_to_end().await?;
            Ok(Some(decode_text(&data)))
        }
        _ => Err(unexpected(context, &token)),
    }
}

/// Reads an astring: an atom, a quoted string, or a literal.
pub async fn read_astring(tokens: &mut Tokenizer, context: &'static str) -> Result<String> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::QString | TokenKind::Atom | TokenKind::Flag => {
            Ok(token.into_text().map(Into::into).unwrap_or_default())
        }
        TokenKind::Literal => {
            let data = tokens.read_literal_to_end().await?;
            Ok(decode_text(&data))
        }
        _ => Err(unexpected(context, &token)),
    }
}

/// Reads a parenthesized flag list; the open paren is read here.
pub async fn read_flag_list(tokens: &mut Tokenizer, context: &'static str) -> Result<Flags> {
    expect(tokens, TokenKind::OpenParen, context).await?;
    let mut flags = Flags::new();
    loop {
        let token = tokens.read_token().await?;
        match token.kind() {
            TokenKind::CloseParen => return Ok(flags),
            TokenKind::Flag | TokenKind::Atom => {
                if let Some(text) = token.text() {
                    flags.insert(Flag::parse(text));
                }
            }
            _ => return Err(unexpected(context, &token)),
        }
    }
}

/// Reads capability atoms up to the end of line or a closing bracket, which is
/// left unread.
pub async fn read_capabilities(tokens: &mut Tokenizer) -> Result<Capabilities> {
    let mut caps = Vec::new();
    loop {
        let token = tokens.read_token().await?;
        match token.kind() {
            TokenKind::Eoln | TokenKind::CloseBracket => {
                tokens.unget(token);
                return Ok(caps.into_iter().collect());
            }
            TokenKind::Atom => {
                if let Some(text) = token.text() {
                    caps.push(Capability::parse(text));
                }
            }
            _ => return Err(unexpected("reading capabilities", &token)),
        }
    }
}
