//! FETCH item lists parsed into [`MessageSummary`] values.

use std::collections::BTreeMap;

use futures::future::{BoxFuture, FutureExt};

use super::body::{read_body_structure, read_envelope};
use super::helpers::{
    expect, read_astring, read_flag_list, read_nstring, read_number, read_u64, unexpected,
};
use super::lexer::{TokenKind, Tokenizer, decode_text};
use super::section::{SectionSpec, missing_value, read_section, render_item};
use super::skip::{skip_from, skip_value};
use crate::engine::{Dispatch, UntaggedHandler};
use crate::header::HeaderList;
use crate::quirks::{Quirks, ServerQuirks};
use crate::summary::{Annotation, MessageSummary, MessageSummaryItems, parse_date_time};
use crate::types::{SeqNum, Uid};
use crate::{Error, Result, utf7};

const CONTEXT: &str = "reading FETCH";

/// Parses one FETCH item list into a new summary; the list's open paren has
/// been consumed.
///
/// Unknown items are skipped. The only tolerated deviations are the ones
/// enabled in `quirks`.
pub async fn read_fetch_items(
    tokens: &mut Tokenizer,
    seq: SeqNum,
    quirks: &ServerQuirks,
) -> Result<MessageSummary> {
    let mut summary = MessageSummary::new(seq);

    let wrapped = tokens.peek_token().await?.is(TokenKind::OpenParen);
    if wrapped {
        if !quirks.allows(Quirks::EXTRA_PARENS) {
            return Err(Error::protocol(CONTEXT, "item list wrapped in extra parentheses"));
        }
        tracing::warn!(seq = seq.get(), "unwrapping doubly parenthesized FETCH items");
        tokens.read_token().await?;
    }

    loop {
        let token = tokens.read_token().await?;
        let name = match token.kind() {
            TokenKind::CloseParen => break,
            TokenKind::Atom => token.into_text().unwrap_or_default(),
            _ => return Err(unexpected(CONTEXT, &token)),
        };
        read_item(tokens, &name, &mut summary, quirks).await?;
    }

    if wrapped {
        expect(tokens, TokenKind::CloseParen, CONTEXT).await?;
    }
    Ok(summary)
}

async fn read_item(
    tokens: &mut Tokenizer,
    name: &str,
    summary: &mut MessageSummary,
    quirks: &ServerQuirks,
) -> Result<()> {
    use MessageSummaryItems as I;

    let seq = summary.seq.get();
    let upper = name.to_ascii_uppercase();
    if matches!(upper.as_str(), "BODY" | "BINARY")
        && tokens.peek_token().await?.is(TokenKind::OpenBracket)
    {
        let section = read_section(tokens).await?;
        let item = render_item(name, &section);
        return read_section_value(tokens, &section, &item, summary, quirks).await;
    }

    match upper.as_str() {
        "UID" => {
            let n = read_number(tokens, CONTEXT).await?;
            summary.uid = Some(Uid::new(n).ok_or_else(|| Error::protocol(CONTEXT, "UID 0"))?);
            summary.items |= I::UNIQUE_ID;
        }
        "FLAGS" => {
            summary.flags = Some(read_flag_list(tokens, CONTEXT).await?);
            summary.items |= I::FLAGS;
        }
        "INTERNALDATE" => {
            summary.internal_date = read_date(tokens, seq, "INTERNALDATE").await?;
            summary.items |= I::INTERNAL_DATE;
        }
        "SAVEDATE" => {
            summary.save_date = read_date(tokens, seq, "SAVEDATE").await?;
            summary.items |= I::SAVE_DATE;
        }
        "RFC822.SIZE" => {
            summary.size = Some(read_u64(tokens, CONTEXT).await?);
            summary.items |= I::SIZE;
        }
        "ENVELOPE" => {
            summary.envelope = Some(Box::new(read_envelope(tokens).await?));
            summary.items |= I::ENVELOPE;
        }
        "BODYSTRUCTURE" => {
            if let Some(body) = read_body_structure(tokens, quirks).await? {
                summary.body = Some(body);
                summary.items |= I::BODY_STRUCTURE;
            }
        }
        "BODY" => {
            if let Some(body) = read_body_structure(tokens, quirks).await? {
                summary.body = Some(body);
                summary.items |= I::BODY;
            }
        }
        "RFC822.HEADER" => {
            let section = SectionSpec {
                spec: "HEADER".into(),
                origin: None,
            };
            read_section_value(tokens, &section, name, summary, quirks).await?;
        }
        "MODSEQ" => {
            if let Some(value) = read_mod_seq(tokens, seq, quirks).await? {
                summary.mod_seq = Some(value);
                summary.items |= I::MOD_SEQ;
            }
        }
        "EMAILID" => {
            summary.email_id = Some(read_object_id(tokens).await?);
            summary.items |= I::EMAIL_ID;
        }
        "THREADID" => {
            summary.thread_id = if tokens.peek_token().await?.is(TokenKind::Nil) {
                tokens.read_token().await?;
                None
            } else {
                Some(read_object_id(tokens).await?)
            };
            summary.items |= I::THREAD_ID;
        }
        "X-GM-MSGID" => {
            summary.gmail_message_id = Some(read_u64(tokens, CONTEXT).await?);
            summary.items |= I::GMAIL_MESSAGE_ID;
        }
        "X-GM-THRID" => {
            summary.gmail_thread_id = Some(read_u64(tokens, CONTEXT).await?);
            summary.items |= I::GMAIL_THREAD_ID;
        }
        "X-GM-LABELS" => {
            summary.gmail_labels = read_labels(tokens).await?;
            summary.items |= I::GMAIL_LABELS;
        }
        "ANNOTATION" => {
            summary.annotations = read_annotations(tokens).await?;
            summary.items |= I::ANNOTATIONS;
        }
        "PREVIEW" => {
            summary.preview_text = read_preview(tokens).await?;
            summary.items |= I::PREVIEW_TEXT;
        }
        _ => {
            tracing::debug!(seq, item = name, "skipping unknown FETCH item");
            skip_item_value(tokens).await?;
        }
    }
    Ok(())
}

/// Reads a section payload. Header blocks are parsed, anything else is
/// discarded.
async fn read_section_value(
    tokens: &mut Tokenizer,
    section: &SectionSpec,
    item: &str,
    summary: &mut MessageSummary,
    quirks: &ServerQuirks,
) -> Result<()> {
    let token = tokens.read_token().await?;
    let raw = match token.kind() {
        TokenKind::Literal if section.is_header() => Some(tokens.read_literal_to_end().await?),
        TokenKind::Literal => {
            tokens.skip_literal().await?;
            None
        }
        TokenKind::QString | TokenKind::Atom => {
            Some(token.text().unwrap_or_default().as_bytes().to_vec())
        }
        TokenKind::Nil => Some(Vec::new()),
        TokenKind::CloseParen => {
            missing_value(quirks.allows(Quirks::MISSING_BODY_VALUE), item)?;
            tokens.unget(token);
            Some(Vec::new())
        }
        _ => return Err(unexpected(CONTEXT, &token)),
    };

    if section.is_header() {
        let raw = raw.unwrap_or_default();
        let headers = HeaderList::parse(&raw).unwrap_or_else(|err| {
            tracing::warn!(seq = summary.seq.get(), item, %err, "unparseable header block");
            HeaderList::new()
        });
        summary.headers = Some(headers);
        summary.items |= MessageSummaryItems::HEADERS;
    }
    Ok(())
}

async fn read_date(
    tokens: &mut Tokenizer,
    seq: u32,
    item: &str,
) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>> {
    let Some(text) = read_nstring(tokens, CONTEXT).await? else {
        return Ok(None);
    };
    let date = parse_date_time(&text);
    if date.is_none() {
        tracing::warn!(seq, item, value = %text, "unparseable date");
    }
    Ok(date)
}

/// Reads `(mod-sequence)`. An unparseable value is dropped when the
/// server is known to send them.
pub(crate) async fn read_mod_seq(
    tokens: &mut Tokenizer,
    seq: u32,
    quirks: &ServerQuirks,
) -> Result<Option<u64>> {
    expect(tokens, TokenKind::OpenParen, CONTEXT).await?;
    let token = tokens.read_token().await?;
    let value = match token.as_atom().and_then(|text| text.parse::<u64>().ok()) {
        Some(value) => Some(value),
        None if quirks.allows(Quirks::INVALID_MODSEQ) && token.is(TokenKind::Atom) => {
            tracing::warn!(seq, value = %token, "ignoring invalid MODSEQ");
            None
        }
        None => return Err(unexpected("reading MODSEQ", &token)),
    };
    expect(tokens, TokenKind::CloseParen, CONTEXT).await?;
    Ok(value)
}

async fn read_object_id(tokens: &mut Tokenizer) -> Result<String> {
    expect(tokens, TokenKind::OpenParen, CONTEXT).await?;
    let id = read_astring(tokens, CONTEXT).await?;
    expect(tokens, TokenKind::CloseParen, CONTEXT).await?;
    Ok(id)
}

pub(crate) async fn read_labels(tokens: &mut Tokenizer) -> Result<Vec<String>> {
    expect(tokens, TokenKind::OpenParen, CONTEXT).await?;
    let mut labels = Vec::new();
    loop {
        let token = tokens.read_token().await?;
        let label = match token.kind() {
            TokenKind::CloseParen => return Ok(labels),
            TokenKind::Flag => token.into_text().unwrap_or_default().into_owned(),
            TokenKind::Atom | TokenKind::QString => {
                utf7::decode(token.text().unwrap_or_default()).into_owned()
            }
            TokenKind::Literal => {
                let raw = decode_text(&tokens.read_literal_to_end().await?);
                utf7::decode(&raw).into_owned()
            }
            _ => return Err(unexpected("reading X-GM-LABELS", &token)),
        };
        labels.push(label);
    }
}

/// Reads `(entry (attr value ...) entry (...) ...)`.
pub(crate) async fn read_annotations(tokens: &mut Tokenizer) -> Result<Vec<Annotation>> {
    const ANNOTATION: &str = "reading ANNOTATION";
    expect(tokens, TokenKind::OpenParen, ANNOTATION).await?;
    let mut annotations = Vec::new();
    loop {
        if tokens.peek_token().await?.is(TokenKind::CloseParen) {
            tokens.read_token().await?;
            return Ok(annotations);
        }
        let entry = read_astring(tokens, ANNOTATION).await?;
        expect(tokens, TokenKind::OpenParen, ANNOTATION).await?;
        let mut attributes = Vec::new();
        while !tokens.peek_token().await?.is(TokenKind::CloseParen) {
            let attribute = read_astring(tokens, ANNOTATION).await?;
            let value = read_nstring(tokens, ANNOTATION).await?;
            attributes.push((attribute, value));
        }
        tokens.read_token().await?;
        annotations.push(Annotation { entry, attributes });
    }
}

async fn read_preview(tokens: &mut Tokenizer) -> Result<Option<String>> {
    if tokens.peek_token().await?.is(TokenKind::OpenParen) {
        // Draft syntax: PREVIEW (FUZZY "text")
        tokens.read_token().await?;
        let mut text = None;
        loop {
            let token = tokens.read_token().await?;
            match token.kind() {
                TokenKind::CloseParen => return Ok(text),
                TokenKind::QString => text = token.into_text().map(Into::into),
                TokenKind::Literal => {
                    text = Some(decode_text(&tokens.read_literal_to_end().await?));
                }
                _ => skip_from(tokens, token).await?,
            }
        }
    }
    read_nstring(tokens, CONTEXT).await
}

/// Skips the value of an unrecognised item, including a section specifier
/// and origin if the item carries one.
pub(crate) async fn skip_item_value(tokens: &mut Tokenizer) -> Result<()> {
    if tokens.peek_token().await?.is(TokenKind::OpenBracket) {
        read_section(tokens).await?;
    }
    skip_value(tokens).await
}

/// Callback invoked with the merged summary each time a FETCH item list
/// closes.
pub type SummaryCallback = Box<dyn FnMut(&MessageSummary) + Send>;

/// FETCH handler that accumulates [`MessageSummary`] values by sequence
/// number.
#[derive(Default)]
pub struct SummaryHandler {
    summaries: BTreeMap<u32, MessageSummary>,
    on_complete: Option<SummaryCallback>,
}

impl std::fmt::Debug for SummaryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryHandler")
            .field("summaries", &self.summaries.len())
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

impl SummaryHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback fired whenever a FETCH line has been merged.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnMut(&MessageSummary) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Returns the summary for a sequence number.
    #[must_use]
    pub fn get(&self, seq: SeqNum) -> Option<&MessageSummary> {
        self.summaries.get(&seq.get())
    }

    /// Number of distinct messages seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Returns true if no FETCH data arrived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Returns the summaries ordered by sequence number.
    #[must_use]
    pub fn into_summaries(self) -> Vec<MessageSummary> {
        self.summaries.into_values().collect()
    }

    /// Merges a parsed FETCH line into the summary for its sequence number.
    pub fn merge(&mut self, parsed: MessageSummary) -> &MessageSummary {
        let seq = parsed.seq;
        let entry = self
            .summaries
            .entry(seq.get())
            .or_insert_with(|| MessageSummary::new(seq));
        entry.merge(parsed);
        if let Some(callback) = self.on_complete.as_mut() {
            callback(entry);
        }
        entry
    }
}

/// Reads the sequence number and item list of a `FETCH` response.
pub(crate) async fn read_fetch_response(cx: Dispatch<'_>) -> Result<MessageSummary> {
    let seq = cx
        .number
        .and_then(SeqNum::new)
        .ok_or_else(|| Error::protocol(CONTEXT, "FETCH without a sequence number"))?;
    expect(cx.tokens, TokenKind::OpenParen, CONTEXT).await?;
    read_fetch_items(cx.tokens, seq, cx.quirks).await
}

impl UntaggedHandler for SummaryHandler {
    fn handle<'a>(&'a mut self, cx: Dispatch<'a>) -> BoxFuture<'a, Result<()>> {
        async move {
            let parsed = read_fetch_response(cx).await?;
            let merged = self.merge(parsed);
            tracing::trace!(seq = merged.seq.get(), items = ?merged.items, "merged FETCH summary");
            Ok(())
        }
        .boxed()
    }
}
