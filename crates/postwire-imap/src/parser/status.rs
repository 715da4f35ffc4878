//! Status responses: `OK`/`NO`/`BAD`/`PREAUTH`/`BYE` text with an optional
//! bracketed response code.

use super::helpers::{expect, read_capabilities, read_flag_list, read_number, read_u64, unexpected};
use super::lexer::{Token, TokenKind, Tokenizer, decode_text};
use crate::types::{ResponseCode, SeqNum, Uid, UidSet, UidValidity};
use crate::{Error, Result};

/// Text following a status keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    /// Bracketed response code, if present.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

/// Reads `[code] text` up to and including the end of line.
pub async fn read_status_text(tokens: &mut Tokenizer) -> Result<StatusText> {
    let code = if tokens.at_response_code().await? {
        Some(read_response_code(tokens).await?)
    } else {
        None
    };
    let text = tokens.read_text_line().await?;
    Ok(StatusText { code, text })
}

/// Parses a bracketed response code, brackets included.
pub async fn read_response_code(tokens: &mut Tokenizer) -> Result<ResponseCode> {
    const CONTEXT: &str = "reading response code";

    expect(tokens, TokenKind::OpenBracket, CONTEXT).await?;
    let name_token = tokens.read_token().await?;
    let Some(name) = name_token.as_atom() else {
        return Err(unexpected(CONTEXT, &name_token));
    };

    let code = match name.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "CLOSED" => ResponseCode::Closed,
        "UIDNEXT" => ResponseCode::UidNext(read_uid(tokens).await?),
        "UIDVALIDITY" => ResponseCode::UidValidity(read_uid_validity(tokens).await?),
        "UNSEEN" => {
            let n = read_number(tokens, CONTEXT).await?;
            let seq = SeqNum::new(n)
                .ok_or_else(|| Error::protocol(CONTEXT, "invalid sequence number 0"))?;
            ResponseCode::Unseen(seq)
        }
        "HIGHESTMODSEQ" => ResponseCode::HighestModSeq(read_u64(tokens, CONTEXT).await?),
        "CAPABILITY" => ResponseCode::Capability(read_capabilities(tokens).await?),
        "PERMANENTFLAGS" => ResponseCode::PermanentFlags(read_flag_list(tokens, CONTEXT).await?),
        "APPENDUID" => {
            let uidvalidity = read_uid_validity(tokens).await?;
            let uid = read_uid(tokens).await?;
            ResponseCode::AppendUid { uidvalidity, uid }
        }
        "COPYUID" => {
            let uidvalidity = read_uid_validity(tokens).await?;
            let source = read_uid_set(tokens).await?;
            let dest = read_uid_set(tokens).await?;
            ResponseCode::CopyUid {
                uidvalidity,
                source,
                dest,
            }
        }
        "MODIFIED" => ResponseCode::Modified(read_uid_set(tokens).await?),
        _ => {
            let name = name.to_string();
            let data = read_raw_code_data(tokens).await?;
            ResponseCode::Other { name, data }
        }
    };

    expect(tokens, TokenKind::CloseBracket, CONTEXT).await?;
    Ok(code)
}

async fn read_uid(tokens: &mut Tokenizer) -> Result<Uid> {
    let n = read_number(tokens, "reading response code").await?;
    Uid::new(n).ok_or_else(|| Error::protocol("reading response code", "invalid UID 0"))
}

async fn read_uid_validity(tokens: &mut Tokenizer) -> Result<UidValidity> {
    let n = read_number(tokens, "reading response code").await?;
    UidValidity::new(n)
        .ok_or_else(|| Error::protocol("reading response code", "invalid UIDVALIDITY 0"))
}

async fn read_uid_set(tokens: &mut Tokenizer) -> Result<UidSet> {
    let token = tokens.read_token().await?;
    token
        .as_atom()
        .and_then(UidSet::parse)
        .ok_or_else(|| unexpected("reading UID set", &token))
}

/// Renders the arguments of an unrecognised code back to text, leaving the
/// closing bracket unread.
async fn read_raw_code_data(tokens: &mut Tokenizer) -> Result<Option<String>> {
    let mut data = String::new();
    let mut depth = 0usize;
    loop {
        let token = tokens.read_token().await?;
        match token.kind() {
            TokenKind::CloseBracket if depth == 0 => {
                tokens.unget(token);
                break;
            }
            TokenKind::Eoln => {
                return Err(Error::protocol(
                    "reading response code",
                    "line ended before ']'",
                ));
            }
            TokenKind::OpenParen | TokenKind::OpenBracket => depth += 1,
            TokenKind::CloseParen | TokenKind::CloseBracket => depth = depth.saturating_sub(1),
            _ => {}
        }
        let text = if token.is(TokenKind::Literal) {
            Token::qstring(decode_text(&tokens.read_literal_to_end().await?)).to_string()
        } else {
            token.to_string()
        };
        let joins = !data.is_empty()
            && !data.ends_with(['(', '['])
            && !matches!(token.kind(), TokenKind::CloseParen | TokenKind::CloseBracket);
        if joins {
            data.push(' ');
        }
        data.push_str(&text);
    }
    Ok((!data.is_empty()).then_some(data))
}
