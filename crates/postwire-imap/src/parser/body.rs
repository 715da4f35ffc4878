//! ENVELOPE and BODY/BODYSTRUCTURE parsers.

use futures::future::{BoxFuture, FutureExt};

use super::helpers::{expect, read_astring, read_nstring, read_number, unexpected};
use super::lexer::{TokenKind, Tokenizer};
use super::skip::skip_value;
use crate::quirks::{Quirks, ServerQuirks};
use crate::summary::{Address, BodyExtension, BodyFields, BodyStructure, Disposition, Envelope};
use crate::{Error, Result};

/// Parts nested deeper than this are rejected.
pub const MAX_BODY_DEPTH: usize = 64;

const ENVELOPE: &str = "reading ENVELOPE";
const BODY: &str = "reading BODYSTRUCTURE";

async fn at_close(tokens: &mut Tokenizer) -> Result<bool> {
    Ok(tokens.peek_token().await?.is(TokenKind::CloseParen))
}

/// Reads a parenthesized envelope.
pub async fn read_envelope(tokens: &mut Tokenizer) -> Result<Envelope> {
    expect(tokens, TokenKind::OpenParen, ENVELOPE).await?;
    let envelope = Envelope {
        date: read_nstring(tokens, ENVELOPE).await?,
        subject: read_nstring(tokens, ENVELOPE).await?,
        from: read_address_list(tokens).await?,
        sender: read_address_list(tokens).await?,
        reply_to: read_address_list(tokens).await?,
        to: read_address_list(tokens).await?,
        cc: read_address_list(tokens).await?,
        bcc: read_address_list(tokens).await?,
        in_reply_to: read_nstring(tokens, ENVELOPE).await?,
        message_id: read_nstring(tokens, ENVELOPE).await?,
    };
    expect(tokens, TokenKind::CloseParen, ENVELOPE).await?;
    Ok(envelope)
}

async fn read_address_list(tokens: &mut Tokenizer) -> Result<Vec<Address>> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::Nil => return Ok(Vec::new()),
        TokenKind::OpenParen => {}
        _ => return Err(unexpected(ENVELOPE, &token)),
    }
    let mut addresses = Vec::new();
    loop {
        let token = tokens.read_token().await?;
        match token.kind() {
            TokenKind::CloseParen => return Ok(addresses),
            TokenKind::OpenParen => {
                let address = Address {
                    name: read_nstring(tokens, ENVELOPE).await?,
                    adl: read_nstring(tokens, ENVELOPE).await?,
                    mailbox: read_nstring(tokens, ENVELOPE).await?,
                    host: read_nstring(tokens, ENVELOPE).await?,
                };
                expect(tokens, TokenKind::CloseParen, ENVELOPE).await?;
                addresses.push(address);
            }
            _ => return Err(unexpected(ENVELOPE, &token)),
        }
    }
}

/// Reads the value of a `BODY` or `BODYSTRUCTURE` item.
///
/// Returns `None` only for the vendor-malformed forms `NIL` and `()`, and only
/// when [`Quirks::MALFORMED_BODY`] is enabled.
pub async fn read_body_structure(
    tokens: &mut Tokenizer,
    quirks: &ServerQuirks,
) -> Result<Option<BodyStructure>> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::Nil => {
            return malformed(quirks, "NIL");
        }
        TokenKind::OpenParen => {}
        _ => return Err(unexpected(BODY, &token)),
    }
    if at_close(tokens).await? {
        tokens.read_token().await?;
        return malformed(quirks, "()");
    }
    read_part(tokens, 1).await.map(Some)
}

fn malformed(quirks: &ServerQuirks, form: &str) -> Result<Option<BodyStructure>> {
    if quirks.allows(Quirks::MALFORMED_BODY) {
        tracing::warn!(
            server = ?quirks.server_type,
            form,
            "tolerating malformed body structure"
        );
        Ok(None)
    } else {
        Err(Error::protocol(BODY, format!("body structure is {form}")))
    }
}

/// Parses one part; its open paren has been consumed.
fn read_part(tokens: &mut Tokenizer, depth: usize) -> BoxFuture<'_, Result<BodyStructure>> {
    async move {
        if depth > MAX_BODY_DEPTH {
            return Err(Error::protocol(BODY, "body structure nested too deeply"));
        }
        if tokens.peek_token().await?.is(TokenKind::OpenParen) {
            read_multipart(tokens, depth).await
        } else {
            read_single_part(tokens, depth).await
        }
    }
    .boxed()
}

async fn read_multipart(tokens: &mut Tokenizer, depth: usize) -> Result<BodyStructure> {
    let mut parts = Vec::new();
    while tokens.peek_token().await?.is(TokenKind::OpenParen) {
        tokens.read_token().await?;
        parts.push(read_part(tokens, depth + 1).await?);
    }
    let subtype = read_astring(tokens, BODY).await?;

    let extension = if at_close(tokens).await? {
        None
    } else {
        let params = read_params(tokens).await?;
        let mut extension = read_common_extension(tokens).await?;
        extension.params = params;
        Some(extension)
    };
    expect(tokens, TokenKind::CloseParen, BODY).await?;

    Ok(BodyStructure::Multipart {
        parts,
        subtype,
        extension,
    })
}

async fn read_single_part(tokens: &mut Tokenizer, depth: usize) -> Result<BodyStructure> {
    let media_type = read_astring(tokens, BODY).await?;
    let subtype = read_astring(tokens, BODY).await?;
    let fields = BodyFields {
        params: read_params(tokens).await?,
        id: read_nstring(tokens, BODY).await?,
        description: read_nstring(tokens, BODY).await?,
        encoding: read_nstring(tokens, BODY).await?.unwrap_or_default(),
        size: read_number(tokens, BODY).await?,
    };

    let is_message = media_type.eq_ignore_ascii_case("MESSAGE")
        && (subtype.eq_ignore_ascii_case("RFC822") || subtype.eq_ignore_ascii_case("GLOBAL"));

    let mut body = if media_type.eq_ignore_ascii_case("TEXT") {
        BodyStructure::Text {
            subtype,
            fields,
            lines: read_number(tokens, BODY).await?,
            extension: None,
        }
    } else if is_message && !at_close(tokens).await? {
        let envelope = Box::new(read_envelope(tokens).await?);
        expect(tokens, TokenKind::OpenParen, BODY).await?;
        let nested = Box::new(read_part(tokens, depth + 1).await?);
        BodyStructure::Message {
            fields,
            envelope,
            body: nested,
            lines: read_number(tokens, BODY).await?,
            extension: None,
        }
    } else {
        BodyStructure::Basic {
            media_type,
            subtype,
            fields,
            extension: None,
        }
    };

    if !at_close(tokens).await? {
        let md5 = read_nstring(tokens, BODY).await?;
        let mut data = read_common_extension(tokens).await?;
        data.md5 = md5;
        match &mut body {
            BodyStructure::Basic { extension, .. }
            | BodyStructure::Text { extension, .. }
            | BodyStructure::Message { extension, .. }
            | BodyStructure::Multipart { extension, .. } => *extension = Some(data),
        }
    }
    expect(tokens, TokenKind::CloseParen, BODY).await?;
    Ok(body)
}

/// Reads disposition, language and location, each optional, then skips any
/// later extension values up to (not including) the closing paren.
async fn read_common_extension(tokens: &mut Tokenizer) -> Result<BodyExtension> {
    let mut extension = BodyExtension::default();
    if at_close(tokens).await? {
        return Ok(extension);
    }
    extension.disposition = read_disposition(tokens).await?;
    if at_close(tokens).await? {
        return Ok(extension);
    }
    extension.language = read_language(tokens).await?;
    if at_close(tokens).await? {
        return Ok(extension);
    }
    extension.location = read_nstring(tokens, BODY).await?;
    while !at_close(tokens).await? {
        skip_value(tokens).await?;
    }
    Ok(extension)
}

async fn read_params(tokens: &mut Tokenizer) -> Result<Vec<(String, String)>> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::Nil => return Ok(Vec::new()),
        TokenKind::OpenParen => {}
        _ => return Err(unexpected(BODY, &token)),
    }
    let mut params = Vec::new();
    while !at_close(tokens).await? {
        let name = read_astring(tokens, BODY).await?;
        let value = read_nstring(tokens, BODY).await?.unwrap_or_default();
        params.push((name, value));
    }
    tokens.read_token().await?;
    Ok(params)
}

async fn read_disposition(tokens: &mut Tokenizer) -> Result<Option<Disposition>> {
    let token = tokens.read_token().await?;
    match token.kind() {
        TokenKind::Nil => Ok(None),
        TokenKind::OpenParen => {
            let kind = read_astring(tokens, BODY).await?;
            let params = read_params(tokens).await?;
            expect(tokens, TokenKind::CloseParen, BODY).await?;
            Ok(Some(Disposition { kind, params }))
        }
        _ => Err(unexpected(BODY, &token)),
    }
}

async fn read_language(tokens: &mut Tokenizer) -> Result<Vec<String>> {
    if !tokens.peek_token().await?.is(TokenKind::OpenParen) {
        return Ok(read_nstring(tokens, BODY).await?.into_iter().collect());
    }
    tokens.read_token().await?;
    let mut tags = Vec::new();
    while !at_close(tokens).await? {
        tags.push(read_astring(tokens, BODY).await?);
    }
    tokens.read_token().await?;
    Ok(tags)
}
