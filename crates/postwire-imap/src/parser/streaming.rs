//! FETCH handler that streams section payloads into a [`FetchContext`].

use std::io::Write;

use futures::future::{BoxFuture, FutureExt};

use super::helpers::{expect, read_flag_list, read_number, unexpected};
use super::lexer::{TokenKind, Tokenizer};
use super::section::{missing_value, read_section, render_item};
use super::summary::{read_annotations, read_labels, read_mod_seq, skip_item_value};
use crate::config::DEFAULT_LITERAL_CHUNK;
use crate::engine::{Dispatch, UntaggedHandler};
use crate::quirks::{Quirks, ServerQuirks};
use crate::section::{FetchContext, FetchEvent, Section, SectionKey};
use crate::types::{SeqNum, Uid};
use crate::{Error, Result};

const CONTEXT: &str = "reading FETCH";

/// Streams `BODY[...]`, `BINARY[...]` and `RFC822*` payloads to storage
/// created by the context's sink factory.
///
/// Literal payloads are copied chunk by chunk and never held in memory as a
/// whole. Flag, label, mod-sequence and annotation changes seen along the way
/// are recorded as [`FetchEvent`]s. Any error disposes every stored section.
#[derive(Debug)]
pub struct StreamingHandler {
    context: FetchContext,
    events: Vec<FetchEvent>,
    chunk_size: usize,
}

impl Default for StreamingHandler {
    fn default() -> Self {
        Self::new(FetchContext::default())
    }
}

impl StreamingHandler {
    /// Creates a handler that stores sections in `context`.
    #[must_use]
    pub const fn new(context: FetchContext) -> Self {
        Self {
            context,
            events: Vec::new(),
            chunk_size: DEFAULT_LITERAL_CHUNK,
        }
    }

    /// Sets the largest slice copied from the connection at once.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sections stored so far.
    #[must_use]
    pub const fn context(&self) -> &FetchContext {
        &self.context
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[FetchEvent] {
        &self.events
    }

    /// Releases the stored sections and recorded events.
    #[must_use]
    pub fn finish(self) -> (FetchContext, Vec<FetchEvent>) {
        (self.context, self.events)
    }

    async fn read_response(
        &mut self,
        tokens: &mut Tokenizer,
        seq: SeqNum,
        quirks: &ServerQuirks,
    ) -> Result<()> {
        expect(tokens, TokenKind::OpenParen, CONTEXT).await?;
        let wrapped = tokens.peek_token().await?.is(TokenKind::OpenParen);
        if wrapped {
            if !quirks.allows(Quirks::EXTRA_PARENS) {
                return Err(Error::protocol(CONTEXT, "item list wrapped in extra parentheses"));
            }
            tokens.read_token().await?;
        }

        let first_event = self.events.len();
        let mut uid = None;
        loop {
            let token = tokens.read_token().await?;
            let name = match token.kind() {
                TokenKind::CloseParen => break,
                TokenKind::Atom => token.into_text().unwrap_or_default(),
                _ => return Err(unexpected(CONTEXT, &token)),
            };
            self.read_item(tokens, &name, seq, &mut uid, quirks).await?;
        }
        if wrapped {
            expect(tokens, TokenKind::CloseParen, CONTEXT).await?;
        }

        if let Some(uid) = uid {
            self.context.assign_uid(seq, uid);
            for event in &mut self.events[first_event..] {
                event.set_uid(uid);
            }
        }
        Ok(())
    }

    async fn read_item(
        &mut self,
        tokens: &mut Tokenizer,
        name: &str,
        seq: SeqNum,
        uid: &mut Option<Uid>,
        quirks: &ServerQuirks,
    ) -> Result<()> {
        let upper = name.to_ascii_uppercase();
        if matches!(upper.as_str(), "BODY" | "BINARY")
            && tokens.peek_token().await?.is(TokenKind::OpenBracket)
        {
            let section = read_section(tokens).await?;
            let item = render_item(&upper, &section);
            let key = SectionKey {
                seq,
                uid: *uid,
                spec: &section.spec,
                origin: section.origin,
            };
            return self.store_payload(tokens, &key, &item, quirks).await;
        }

        let legacy_spec = match upper.as_str() {
            "RFC822" => Some(""),
            "RFC822.HEADER" => Some("HEADER"),
            "RFC822.TEXT" => Some("TEXT"),
            _ => None,
        };
        if let Some(spec) = legacy_spec {
            let key = SectionKey {
                seq,
                uid: *uid,
                spec,
                origin: None,
            };
            return self.store_payload(tokens, &key, &upper, quirks).await;
        }

        match upper.as_str() {
            "UID" => {
                let n = read_number(tokens, CONTEXT).await?;
                *uid = Some(Uid::new(n).ok_or_else(|| Error::protocol(CONTEXT, "UID 0"))?);
            }
            "FLAGS" => {
                let flags = read_flag_list(tokens, CONTEXT).await?;
                self.events.push(FetchEvent::FlagsChanged {
                    seq,
                    uid: *uid,
                    flags,
                });
            }
            "X-GM-LABELS" => {
                let labels = read_labels(tokens).await?;
                self.events.push(FetchEvent::LabelsChanged {
                    seq,
                    uid: *uid,
                    labels,
                });
            }
            "MODSEQ" => {
                if let Some(mod_seq) = read_mod_seq(tokens, seq.get(), quirks).await? {
                    self.events.push(FetchEvent::ModSeqChanged {
                        seq,
                        uid: *uid,
                        mod_seq,
                    });
                }
            }
            "ANNOTATION" => {
                let annotations = read_annotations(tokens).await?;
                self.events.push(FetchEvent::AnnotationsChanged {
                    seq,
                    uid: *uid,
                    annotations,
                });
            }
            _ => {
                tracing::trace!(seq = seq.get(), item = name, "ignoring FETCH item");
                skip_item_value(tokens).await?;
            }
        }
        Ok(())
    }

    async fn store_payload(
        &mut self,
        tokens: &mut Tokenizer,
        key: &SectionKey<'_>,
        item: &str,
        quirks: &ServerQuirks,
    ) -> Result<()> {
        let token = tokens.read_token().await?;
        let section = match token.kind() {
            TokenKind::Literal => {
                let total = token.literal_len().unwrap_or_default();
                let mut stream = self.context.create_stream(key, total)?;
                let mut written = 0u64;
                while tokens.literal_remaining() > 0 {
                    let chunk = tokens.read_literal_chunk(self.chunk_size).await?;
                    stream.write_all(&chunk)?;
                    written += chunk.len() as u64;
                    self.context.report_progress(written, total as u64);
                }
                Section::new(key, written, stream)?
            }
            TokenKind::QString | TokenKind::Atom => {
                let data = token.text().unwrap_or_default().as_bytes();
                let mut stream = self.context.create_stream(key, data.len())?;
                stream.write_all(data)?;
                Section::new(key, data.len() as u64, stream)?
            }
            TokenKind::Nil => Section::new(key, 0, self.context.create_stream(key, 0)?)?,
            TokenKind::CloseParen => {
                missing_value(quirks.allows(Quirks::MISSING_BODY_VALUE), item)?;
                tokens.unget(token);
                Section::new(key, 0, self.context.create_stream(key, 0)?)?
            }
            _ => return Err(unexpected(CONTEXT, &token)),
        };
        tracing::trace!(
            seq = key.seq.get(),
            item,
            bytes = section.len(),
            "stored section"
        );
        self.context.insert(section);
        Ok(())
    }
}

impl UntaggedHandler for StreamingHandler {
    fn handle<'a>(&'a mut self, cx: Dispatch<'a>) -> BoxFuture<'a, Result<()>> {
        async move {
            let seq = cx
                .number
                .and_then(SeqNum::new)
                .ok_or_else(|| Error::protocol(CONTEXT, "FETCH without a sequence number"))?;
            let result = self.read_response(cx.tokens, seq, cx.quirks).await;
            if result.is_err() {
                self.context.dispose();
            }
            result
        }
        .boxed()
    }

    fn abort(&mut self) {
        self.context.dispose();
    }
}
