//! Skipping of values the parsers do not understand.
//!
//! A skipped value is a single token, or a parenthesized or bracketed group
//! consumed up to its matching close with every nested literal drained. The
//! walk is iterative so hostile nesting cannot exhaust the stack.

use super::lexer::{Token, TokenKind, Tokenizer};
use crate::{Error, Result};

/// Reads and discards one value.
pub async fn skip_value(tokens: &mut Tokenizer) -> Result<()> {
    let first = tokens.read_token().await?;
    skip_from(tokens, first).await
}

/// Discards one value whose first token has already been read.
///
/// A close paren, close bracket or end of line in first position means the
/// value is absent; the token is pushed back and nothing is consumed.
pub async fn skip_from(tokens: &mut Tokenizer, first: Token) -> Result<()> {
    let mut depth = 0usize;
    let mut token = first;
    loop {
        match token.kind() {
            TokenKind::OpenParen | TokenKind::OpenBracket => depth += 1,
            TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::Eoln if depth == 0 => {
                tokens.unget(token);
                return Ok(());
            }
            TokenKind::CloseParen | TokenKind::CloseBracket => depth -= 1,
            TokenKind::Eoln => {
                return Err(Error::protocol(
                    "skipping value",
                    "line ended inside a parenthesized list",
                ));
            }
            TokenKind::Literal => tokens.skip_literal().await?,
            _ => {}
        }
        if depth == 0 {
            return Ok(());
        }
        token = tokens.read_token().await?;
    }
}
