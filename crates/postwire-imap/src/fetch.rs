//! FETCH operations built on the engine.
//!
//! [`Engine::fetch_summaries`] collects [`MessageSummary`] values;
//! [`Engine::fetch_section`] and [`Engine::fetch_sections`] stream section
//! payloads into storage chosen by a [`SinkFactory`];
//! [`Engine::sink_factory`] gives the default storage with the configured
//! memory threshold. Every operation checks
//! the capabilities its items need before anything is written.
//!
//! # Example
//!
//! ```ignore
//! use postwire_imap::fetch::FetchRequest;
//! use postwire_imap::summary::MessageSummaryItems;
//!
//! let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::FLAGS);
//! for summary in engine.fetch_summaries(&set, &request).await? {
//!     println!("{:?} {:?}", summary.uid, summary.flags);
//! }
//! ```

use crate::engine::{Command, CommandBuilder, Engine};
use crate::parser::{StreamingHandler, SummaryHandler};
use crate::section::{DefaultSinkFactory, FetchContext, FetchEvent, Section, SinkFactory};
use crate::summary::{MessageSummary, MessageSummaryItems};
use crate::transport::block_on;
use crate::types::{Capability, MessageId, MessageSet, SequenceSet, UidSet};
use crate::{Error, Result};

/// What to fetch for each message of a summary request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    /// Fields to request.
    pub items: MessageSummaryItems,
    /// Header field names for [`MessageSummaryItems::HEADERS`]; empty means
    /// the whole header.
    pub header_fields: Vec<String>,
    /// Only report messages whose mod-sequence is higher (CONDSTORE).
    pub changed_since: Option<u64>,
}

impl FetchRequest {
    /// Requests `items`.
    #[must_use]
    pub fn new(items: MessageSummaryItems) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Limits the header fetch to the named fields.
    #[must_use]
    pub fn header_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_fields = fields.into_iter().map(Into::into).collect();
        self.items |= MessageSummaryItems::HEADERS;
        self
    }

    /// Adds a `CHANGEDSINCE` modifier.
    #[must_use]
    pub const fn changed_since(mut self, mod_seq: u64) -> Self {
        self.changed_since = Some(mod_seq);
        self
    }

    /// Capabilities the server must advertise for this request.
    #[must_use]
    pub fn required_capabilities(&self) -> Vec<Capability> {
        use MessageSummaryItems as I;

        let gates = [
            (I::MOD_SEQ, Capability::CondStore),
            (I::EMAIL_ID | I::THREAD_ID, Capability::ObjectId),
            (
                I::GMAIL_MESSAGE_ID | I::GMAIL_THREAD_ID | I::GMAIL_LABELS,
                Capability::GmailExt,
            ),
            (I::ANNOTATIONS, Capability::Annotate),
            (I::SAVE_DATE, Capability::SaveDate),
            (I::PREVIEW_TEXT, Capability::Preview),
        ];
        let mut required: Vec<Capability> = gates
            .into_iter()
            .filter(|(items, _)| self.items.intersects(*items))
            .map(|(_, capability)| capability)
            .collect();
        if self.changed_since.is_some() && !required.contains(&Capability::CondStore) {
            required.push(Capability::CondStore);
        }
        required
    }

    /// Renders the parenthesized attribute list, e.g. `(UID FLAGS)`.
    #[must_use]
    pub fn attributes(&self) -> String {
        use MessageSummaryItems as I;

        let names = [
            (I::UNIQUE_ID, "UID"),
            (I::FLAGS, "FLAGS"),
            (I::INTERNAL_DATE, "INTERNALDATE"),
            (I::SAVE_DATE, "SAVEDATE"),
            (I::SIZE, "RFC822.SIZE"),
            (I::ENVELOPE, "ENVELOPE"),
            (I::BODY, "BODY"),
            (I::BODY_STRUCTURE, "BODYSTRUCTURE"),
            (I::MOD_SEQ, "MODSEQ"),
            (I::EMAIL_ID, "EMAILID"),
            (I::THREAD_ID, "THREADID"),
            (I::GMAIL_MESSAGE_ID, "X-GM-MSGID"),
            (I::GMAIL_THREAD_ID, "X-GM-THRID"),
            (I::GMAIL_LABELS, "X-GM-LABELS"),
            (I::ANNOTATIONS, "ANNOTATION (/* (value.priv value.shared))"),
            (I::PREVIEW_TEXT, "PREVIEW"),
        ];
        let mut parts: Vec<String> = names
            .into_iter()
            .filter(|(item, _)| self.items.contains(*item))
            .map(|(_, name)| name.to_string())
            .collect();
        if self.items.contains(I::HEADERS) {
            if self.header_fields.is_empty() {
                parts.push("BODY.PEEK[HEADER]".to_string());
            } else {
                parts.push(format!(
                    "BODY.PEEK[HEADER.FIELDS ({})]",
                    self.header_fields.join(" ")
                ));
            }
        }
        format!("({})", parts.join(" "))
    }

    fn command(&self, set: &MessageSet) -> CommandBuilder {
        let mut builder = fetch_builder(set).text(&self.attributes());
        if let Some(mod_seq) = self.changed_since {
            builder = builder.text(&format!("(CHANGEDSINCE {mod_seq})"));
        }
        self.required_capabilities()
            .into_iter()
            .fold(builder, CommandBuilder::requires)
    }
}

/// Sections and incidental changes produced by [`Engine::fetch_sections`].
#[derive(Debug)]
pub struct FetchOutcome {
    /// The stored sections.
    pub context: FetchContext,
    /// Flag, label, mod-sequence and annotation changes seen while fetching.
    pub events: Vec<FetchEvent>,
}

fn fetch_builder(set: &MessageSet) -> CommandBuilder {
    let name = if set.is_uid() { "UID FETCH" } else { "FETCH" };
    Command::builder(name).text(&set.to_string())
}

fn section_item(spec: &str, partial: Option<(u64, u32)>) -> String {
    match partial {
        Some((origin, length)) => format!("BODY.PEEK[{spec}]<{origin}.{length}>"),
        None => format!("BODY.PEEK[{spec}]"),
    }
}

fn message_set(id: MessageId) -> MessageSet {
    match id {
        MessageId::Seq(seq) => MessageSet::Seq(SequenceSet::Single(seq)),
        MessageId::Uid(uid) => MessageSet::Uid(UidSet::single(uid)),
    }
}

fn missing_handler() -> Error {
    Error::InvalidState("FETCH handler missing from completed command".into())
}

impl Engine {
    /// Section storage honouring the configured memory threshold.
    #[must_use]
    pub fn sink_factory(&self) -> DefaultSinkFactory {
        DefaultSinkFactory::new(self.config().memory_threshold)
    }

    /// Fetches summaries for `set`, ordered by sequence number.
    ///
    /// # Errors
    ///
    /// [`Error::MissingCapability`] if an item needs an extension the server
    /// lacks, [`Error::Command`] on NO or BAD, or any fatal engine error.
    pub async fn fetch_summaries(
        &mut self,
        set: &MessageSet,
        request: &FetchRequest,
    ) -> Result<Vec<MessageSummary>> {
        let command = request
            .command(set)
            .handler("FETCH", SummaryHandler::new())
            .build();
        let mut command = self.execute(command).await?;
        command.check()?;
        let handler = command
            .take_handler::<SummaryHandler>("FETCH")
            .ok_or_else(missing_handler)?;
        Ok(handler.into_summaries())
    }

    /// Blocking variant of [`Engine::fetch_summaries`].
    ///
    /// # Errors
    ///
    /// See [`Engine::fetch_summaries`].
    pub fn fetch_summaries_blocking(
        &mut self,
        set: &MessageSet,
        request: &FetchRequest,
    ) -> Result<Vec<MessageSummary>> {
        block_on(self.fetch_summaries(set, request))
    }

    /// Fetches one section of one message, optionally a partial range
    /// `(origin, length)`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the response does not contain the section,
    /// [`Error::Command`] on NO or BAD, or any fatal engine error.
    pub async fn fetch_section(
        &mut self,
        id: MessageId,
        spec: &str,
        partial: Option<(u64, u32)>,
        factory: impl SinkFactory + 'static,
    ) -> Result<Section> {
        let items = format!("(UID {})", section_item(spec, partial));
        let mut outcome = self
            .fetch_streamed(&message_set(id), &items, FetchContext::new(factory))
            .await?;
        outcome
            .context
            .take(id, spec, partial.map(|(origin, _)| origin))
    }

    /// Blocking variant of [`Engine::fetch_section`].
    ///
    /// # Errors
    ///
    /// See [`Engine::fetch_section`].
    pub fn fetch_section_blocking(
        &mut self,
        id: MessageId,
        spec: &str,
        partial: Option<(u64, u32)>,
        factory: impl SinkFactory + 'static,
    ) -> Result<Section> {
        block_on(self.fetch_section(id, spec, partial, factory))
    }

    /// Fetches several sections of every message in `set`.
    ///
    /// # Errors
    ///
    /// [`Error::Command`] on NO or BAD, or any fatal engine error.
    pub async fn fetch_sections(
        &mut self,
        set: &MessageSet,
        specs: &[&str],
        factory: impl SinkFactory + 'static,
    ) -> Result<FetchOutcome> {
        let items: Vec<String> = specs.iter().map(|spec| section_item(spec, None)).collect();
        let items = format!("(UID {})", items.join(" "));
        self.fetch_streamed(set, &items, FetchContext::new(factory))
            .await
    }

    /// Blocking variant of [`Engine::fetch_sections`].
    ///
    /// # Errors
    ///
    /// See [`Engine::fetch_sections`].
    pub fn fetch_sections_blocking(
        &mut self,
        set: &MessageSet,
        specs: &[&str],
        factory: impl SinkFactory + 'static,
    ) -> Result<FetchOutcome> {
        block_on(self.fetch_sections(set, specs, factory))
    }

    async fn fetch_streamed(
        &mut self,
        set: &MessageSet,
        items: &str,
        context: FetchContext,
    ) -> Result<FetchOutcome> {
        let handler =
            StreamingHandler::new(context).with_chunk_size(self.config().literal_chunk_size);
        let command = fetch_builder(set)
            .text(items)
            .handler("FETCH", handler)
            .build();
        let mut command = self.execute(command).await?;
        let handler = command
            .take_handler::<StreamingHandler>("FETCH")
            .ok_or_else(missing_handler)?;
        let (mut context, events) = handler.finish();
        if let Err(err) = command.check() {
            context.dispose();
            return Err(err);
        }
        tracing::debug!(sections = context.len(), events = events.len(), "fetch complete");
        Ok(FetchOutcome { context, events })
    }
}
