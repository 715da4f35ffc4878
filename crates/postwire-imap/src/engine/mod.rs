//! The pipelined command engine.
//!
//! The engine owns the connection's [`Tokenizer`]. Callers hand it
//! [`Command`]s with [`Engine::enqueue`] and drive the connection with
//! [`Engine::run`] until their command completes. While running, the engine
//! writes queued commands (pipelining them when allowed), answers `+`
//! continuation requests with pending literal payloads, routes untagged
//! responses to the handler the oldest in-flight command registered for the
//! keyword, and completes commands on their tagged responses.
//!
//! Any error while reading or writing leaves the byte stream in an unknown
//! position. The engine is then poisoned: every pending command is aborted and
//! all later calls fail with [`Error::Poisoned`].
//!
//! # Example
//!
//! ```ignore
//! use postwire_imap::{Command, Engine, EngineConfig};
//!
//! let mut engine = Engine::new(stream, EngineConfig::default());
//! let command = engine.execute(Command::builder("NOOP").build()).await?;
//! command.check()?;
//! ```

mod command;
mod handler;
mod pipeline;
mod shared;
mod tag_generator;

use std::io;

pub use command::{Command, CommandBuilder};
pub use handler::{AsAny, Dispatch, UntaggedHandler};
pub use shared::SharedEngine;
pub use tag_generator::TagGenerator;

use self::command::SendState;
use self::pipeline::Pipeline;
use crate::config::EngineConfig;
use crate::parser::helpers::{read_capabilities, read_flag_list, unexpected};
use crate::parser::skip::skip_from;
use crate::parser::status::{StatusText, read_status_text};
use crate::parser::summary::read_fetch_response;
use crate::parser::{TokenKind, Tokenizer};
use crate::quirks::{ServerQuirks, ServerType};
use crate::transport::{Blocking, ImapStream, block_on};
use crate::types::{Capabilities, Capability, ResponseCode, SeqNum, Status, Tag, UidSet};
use crate::unsolicited::{NoopHandler, UnsolicitedHandler};
use crate::{Error, Result};

const UNTAGGED: &str = "reading untagged response";
const TAGGED: &str = "reading tagged response";

/// Drives one IMAP connection.
pub struct Engine {
    tokens: Tokenizer,
    config: EngineConfig,
    tags: TagGenerator,
    capabilities: Capabilities,
    enabled: Vec<Capability>,
    quirks: ServerQuirks,
    greeting: Option<String>,
    pipeline: Pipeline,
    unsolicited: Box<dyn UnsolicitedHandler>,
    bye: Option<String>,
    poisoned: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tokens", &self.tokens)
            .field("capabilities", &self.capabilities)
            .field("quirks", &self.quirks)
            .field("greeting", &self.greeting)
            .field("pipeline", &self.pipeline)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over an async stream.
    ///
    /// The stream must be positioned after the greeting and any
    /// authentication. Pass the greeting text to [`Engine::set_greeting`];
    /// capabilities can be supplied with [`Engine::set_capabilities`] or
    /// learnt from CAPABILITY responses.
    pub fn new(stream: impl ImapStream + 'static, config: EngineConfig) -> Self {
        let mut tokens = Tokenizer::with_capacity(stream, config.read_buffer_size);
        tokens.set_max_literal_size(config.max_literal_size);
        let server_type = config.server_type.unwrap_or(ServerType::Unknown);
        Self {
            tokens,
            tags: TagGenerator::new(config.tag_prefix),
            pipeline: Pipeline::new(&config),
            config,
            capabilities: Capabilities::new(),
            enabled: Vec::new(),
            quirks: ServerQuirks::for_server(server_type),
            greeting: None,
            unsolicited: Box::new(NoopHandler),
            bye: None,
            poisoned: false,
        }
    }

    /// Creates an engine over a blocking `std::io` stream, for use with the
    /// `*_blocking` methods.
    pub fn blocking<S>(stream: S, config: EngineConfig) -> Self
    where
        S: io::Read + io::Write + Unpin + Send + 'static,
    {
        Self::new(Blocking::new(stream), config)
    }

    /// Sets the initial capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.set_capabilities(capabilities);
        self
    }

    /// Installs the handler for responses no command claims.
    #[must_use]
    pub fn with_unsolicited_handler(mut self, handler: impl UnsolicitedHandler + 'static) -> Self {
        self.unsolicited = Box::new(handler);
        self
    }

    /// Replaces the handler for responses no command claims.
    pub fn set_unsolicited_handler(&mut self, handler: impl UnsolicitedHandler + 'static) {
        self.unsolicited = Box::new(handler);
    }

    /// Replaces the capability set and re-derives the server quirks.
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
        self.refresh_quirks();
    }

    /// Sets the greeting text used to recognise the server.
    #[must_use]
    pub fn with_greeting(mut self, greeting: &str) -> Self {
        self.set_greeting(greeting);
        self
    }

    /// Records the server's greeting text and re-derives the server quirks.
    ///
    /// Some servers (Exchange among them) can only be recognised by their
    /// greeting. The text may include the leading `* OK`.
    pub fn set_greeting(&mut self, greeting: &str) {
        self.greeting = Some(greeting.to_string());
        self.refresh_quirks();
    }

    /// The greeting text, if one was supplied.
    #[must_use]
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    fn refresh_quirks(&mut self) {
        let server_type = self.config.server_type.unwrap_or_else(|| {
            ServerType::detect(&self.capabilities, self.greeting.as_deref())
        });
        if server_type != self.quirks.server_type {
            tracing::debug!(?server_type, "server type detected");
        }
        self.quirks = ServerQuirks::for_server(server_type);
    }

    /// The server's capabilities as last reported.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Extensions the server confirmed with ENABLED.
    #[must_use]
    pub fn enabled(&self) -> &[Capability] {
        &self.enabled
    }

    /// Grammar tolerances in effect.
    #[must_use]
    pub const fn quirks(&self) -> &ServerQuirks {
        &self.quirks
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns true after a fatal error.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Text of the server's BYE, if one was received.
    #[must_use]
    pub fn bye(&self) -> Option<&str> {
        self.bye.as_deref()
    }

    const fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Tags `command` and queues it for sending.
    ///
    /// Nothing is written until [`Engine::run`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCapability`] if the server does not advertise
    /// a capability the command requires, and [`Error::Poisoned`] after a
    /// fatal error.
    pub fn enqueue(&mut self, mut command: Command) -> Result<Tag> {
        self.ensure_usable()?;
        for capability in command.required_capabilities() {
            self.capabilities.require(capability)?;
        }
        let tag = self.tags.next();
        command.assign_tag(tag.clone());
        tracing::debug!(tag = %tag, command = command.name(), "command queued");
        self.pipeline.push(command);
        Ok(tag)
    }

    /// Drives the connection until the command tagged `tag` completes, then
    /// returns it.
    ///
    /// Other commands may complete along the way; they stay available to
    /// their own `run` calls.
    ///
    /// # Errors
    ///
    /// Any read, write, parse or cancellation error poisons the engine and is
    /// returned. A NO or BAD completion is not an error here; see
    /// [`Command::check`].
    pub async fn run(&mut self, tag: &Tag) -> Result<Command> {
        self.ensure_usable()?;
        if !self.pipeline.contains(tag) {
            return Err(Error::InvalidState(format!("no command tagged {tag}")));
        }
        let result = self.drive(tag).await;
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    /// Blocking variant of [`Engine::run`].
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub fn run_blocking(&mut self, tag: &Tag) -> Result<Command> {
        block_on(self.run(tag))
    }

    /// Enqueues `command` and runs it to completion.
    ///
    /// # Errors
    ///
    /// See [`Engine::enqueue`] and [`Engine::run`].
    pub async fn execute(&mut self, command: Command) -> Result<Command> {
        let tag = self.enqueue(command)?;
        self.run(&tag).await
    }

    /// Blocking variant of [`Engine::execute`].
    ///
    /// # Errors
    ///
    /// See [`Engine::enqueue`] and [`Engine::run`].
    pub fn execute_blocking(&mut self, command: Command) -> Result<Command> {
        block_on(self.execute(command))
    }

    fn poison(&mut self, err: &Error) {
        if self.poisoned {
            return;
        }
        tracing::warn!(error = %err, "connection poisoned");
        self.poisoned = true;
        for mut command in self.pipeline.drain() {
            command.abort();
        }
    }

    async fn drive(&mut self, tag: &Tag) -> Result<Command> {
        loop {
            if let Some(command) = self.pipeline.take_completed(tag) {
                return Ok(command);
            }
            self.send_ready().await?;
            self.read_response().await?;
        }
    }

    async fn send_ready(&mut self) -> Result<()> {
        let literals = self.capabilities.literal_mode();
        while self.pipeline.can_send_next() {
            let Some(command) = self.pipeline.start_next() else {
                break;
            };
            tracing::debug!(
                tag = command.tag().map_or("", Tag::as_str),
                command = command.name(),
                "sending command"
            );
            if command.send(&mut self.tokens, literals).await? == SendState::AwaitingContinuation {
                tracing::trace!(command = command.name(), "waiting for continuation");
            }
        }
        Ok(())
    }

    async fn read_response(&mut self) -> Result<()> {
        let cancel = self
            .pipeline
            .oldest()
            .map(|command| command.cancellation().clone());
        self.tokens.set_cancellation(cancel);

        let token = match self.tokens.read_token().await {
            Ok(token) => token,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(self.bye.clone().map_or(Error::Io(err), Error::Bye));
            }
            Err(err) => return Err(err),
        };
        match token.kind() {
            TokenKind::Plus => self.continue_literal().await,
            TokenKind::Asterisk => self.read_untagged().await,
            TokenKind::Atom => {
                let tag = token.into_text().unwrap_or_default();
                self.read_tagged(&tag).await
            }
            _ => Err(unexpected("reading response", &token)),
        }
    }

    async fn continue_literal(&mut self) -> Result<()> {
        let text = self.tokens.read_text_line().await?;
        let literals = self.capabilities.literal_mode();
        let Some(command) = self.pipeline.awaiting_continuation_mut() else {
            return Err(Error::protocol(
                "reading continuation",
                format!("no literal is waiting for it: {text}"),
            ));
        };
        command.resume(&mut self.tokens, literals).await?;
        Ok(())
    }

    async fn read_tagged(&mut self, tag: &str) -> Result<()> {
        let token = self.tokens.read_token().await?;
        let status = token
            .as_atom()
            .and_then(Status::parse)
            .filter(|status| matches!(status, Status::Ok | Status::No | Status::Bad))
            .ok_or_else(|| unexpected(TAGGED, &token))?;
        let StatusText { code, text } = read_status_text(&mut self.tokens).await?;
        if let Some(ResponseCode::Capability(capabilities)) = &code {
            self.set_capabilities(capabilities.clone());
        }

        let Some(command) = self.pipeline.complete(tag) else {
            return Err(Error::protocol(TAGGED, format!("unknown tag {tag}")));
        };
        tracing::debug!(tag, %status, command = command.name(), "command completed");
        command.complete(status, code, text);
        Ok(())
    }

    async fn read_untagged(&mut self) -> Result<()> {
        let first = self.tokens.read_token().await?;
        let Some(word) = first.as_atom() else {
            return Err(unexpected(UNTAGGED, &first));
        };
        let (number, keyword) = match word.parse::<u32>() {
            Ok(n) => {
                let next = self.tokens.read_token().await?;
                let keyword = next
                    .as_atom()
                    .ok_or_else(|| unexpected(UNTAGGED, &next))?
                    .to_string();
                (Some(n), keyword)
            }
            Err(_) => (None, word.to_string()),
        };
        tracing::trace!(number, keyword = %keyword, "untagged response");

        let handler = self
            .pipeline
            .oldest_mut()
            .and_then(|command| command.handlers_mut().get_mut(&keyword));
        if let Some(handler) = handler {
            handler
                .handle(Dispatch {
                    tokens: &mut self.tokens,
                    quirks: &self.quirks,
                    number,
                    keyword: &keyword,
                })
                .await?;
            return self.tokens.skip_line().await;
        }
        self.read_builtin(number, &keyword).await
    }

    async fn read_builtin(&mut self, number: Option<u32>, keyword: &str) -> Result<()> {
        let upper = keyword.to_ascii_uppercase();
        match upper.as_str() {
            "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => return self.read_untagged_status(&upper).await,
            "CAPABILITY" => {
                let capabilities = read_capabilities(&mut self.tokens).await?;
                self.set_capabilities(capabilities);
            }
            "ENABLED" => loop {
                let token = self.tokens.read_token().await?;
                if token.is(TokenKind::Eoln) {
                    return Ok(());
                }
                match token.as_atom() {
                    Some(atom) => self.enabled.push(Capability::parse(atom)),
                    None => skip_from(&mut self.tokens, token).await?,
                }
            },
            "FLAGS" => {
                let flags = read_flag_list(&mut self.tokens, UNTAGGED).await?;
                self.unsolicited.on_flags(&flags);
            }
            "EXISTS" => self.unsolicited.on_exists(require_number(number, keyword)?),
            "RECENT" => self.unsolicited.on_recent(require_number(number, keyword)?),
            "EXPUNGE" => {
                let seq = SeqNum::new(require_number(number, keyword)?)
                    .ok_or_else(|| Error::protocol(UNTAGGED, "EXPUNGE of message 0"))?;
                self.unsolicited.on_expunge(seq);
            }
            "VANISHED" => self.read_vanished().await?,
            "FETCH" => {
                let summary = read_fetch_response(Dispatch {
                    tokens: &mut self.tokens,
                    quirks: &self.quirks,
                    number,
                    keyword,
                })
                .await?;
                self.unsolicited.on_fetch(&summary);
            }
            _ => tracing::trace!(keyword, "skipping untagged response"),
        }
        self.tokens.skip_line().await
    }

    async fn read_untagged_status(&mut self, keyword: &str) -> Result<()> {
        let status = Status::parse(keyword)
            .ok_or_else(|| Error::protocol(UNTAGGED, format!("unknown status {keyword}")))?;
        let StatusText { code, text } = read_status_text(&mut self.tokens).await?;

        if let Some(code) = code {
            match &code {
                ResponseCode::Capability(capabilities) => {
                    self.set_capabilities(capabilities.clone());
                }
                ResponseCode::Alert => self.unsolicited.on_alert(&text),
                _ => {}
            }
            if let Some(command) = self.pipeline.oldest_mut() {
                command.record_untagged_code(code);
            }
        }

        match status {
            Status::Ok | Status::PreAuth => self.unsolicited.on_ok(&text),
            Status::No => self.unsolicited.on_no(&text),
            Status::Bad => self.unsolicited.on_bad(&text),
            Status::Bye => {
                tracing::info!(text = %text, "server sent BYE");
                self.unsolicited.on_bye(&text);
                self.bye = Some(text);
            }
        }
        Ok(())
    }

    async fn read_vanished(&mut self) -> Result<()> {
        let mut earlier = false;
        if self.tokens.peek_token().await?.is(TokenKind::OpenParen) {
            self.tokens.read_token().await?;
            loop {
                let token = self.tokens.read_token().await?;
                match token.kind() {
                    TokenKind::CloseParen => break,
                    TokenKind::Atom => earlier |= token.is_atom("EARLIER"),
                    _ => return Err(unexpected(UNTAGGED, &token)),
                }
            }
        }
        let token = self.tokens.read_token().await?;
        let uids = token
            .as_atom()
            .and_then(UidSet::parse)
            .ok_or_else(|| unexpected(UNTAGGED, &token))?;
        self.unsolicited.on_vanished(&uids, earlier);
        Ok(())
    }
}

fn require_number(number: Option<u32>, keyword: &str) -> Result<u32> {
    number.ok_or_else(|| Error::protocol(UNTAGGED, format!("{keyword} without a number")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::quirks::Quirks;
    use crate::testing::MockServer;
    use crate::unsolicited::{CollectingHandler, UnsolicitedEvent};

    fn engine(input: &[u8]) -> (Engine, std::sync::Arc<std::sync::Mutex<Vec<u8>>>) {
        engine_with(input, EngineConfig::default())
    }

    fn engine_with(
        input: &[u8],
        config: EngineConfig,
    ) -> (Engine, std::sync::Arc<std::sync::Mutex<Vec<u8>>>) {
        let server = MockServer::new(input);
        let output = server.output();
        (Engine::new(server.into_stream(), config), output)
    }

    fn written(output: &std::sync::Arc<std::sync::Mutex<Vec<u8>>>) -> String {
        String::from_utf8(output.lock().unwrap().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_noop_round_trip() {
        let (mut engine, output) = engine(b"A0000 OK NOOP completed\r\n");
        let command = engine.execute(Command::builder("NOOP").build()).await.unwrap();
        assert_eq!(command.status(), Some(Status::Ok));
        assert_eq!(command.text(), "NOOP completed");
        assert_eq!(written(&output), "A0000 NOOP\r\n");
        command.check().unwrap();
    }

    #[tokio::test]
    async fn test_untagged_capability_updates_quirks() {
        let (mut engine, _) = engine(b"* CAPABILITY IMAP4rev1 X-GM-EXT-1 LITERAL+\r\nA0000 OK done\r\n");
        engine
            .execute(Command::builder("CAPABILITY").build())
            .await
            .unwrap();
        assert!(engine.capabilities().has(&Capability::GmailExt));
        assert_eq!(engine.quirks().server_type, ServerType::Gmail);
    }

    /// Collector that stays readable after being moved into the engine.
    #[derive(Clone, Default)]
    struct SharedCollector(std::sync::Arc<std::sync::Mutex<CollectingHandler>>);

    impl SharedCollector {
        fn take(&self) -> Vec<UnsolicitedEvent> {
            self.0.lock().unwrap().take()
        }
    }

    impl UnsolicitedHandler for SharedCollector {
        fn on_exists(&mut self, count: u32) {
            self.0.lock().unwrap().on_exists(count);
        }
        fn on_recent(&mut self, count: u32) {
            self.0.lock().unwrap().on_recent(count);
        }
        fn on_expunge(&mut self, seq: SeqNum) {
            self.0.lock().unwrap().on_expunge(seq);
        }
        fn on_vanished(&mut self, uids: &UidSet, earlier: bool) {
            self.0.lock().unwrap().on_vanished(uids, earlier);
        }
        fn on_fetch(&mut self, summary: &crate::summary::MessageSummary) {
            self.0.lock().unwrap().on_fetch(summary);
        }
        fn on_flags(&mut self, flags: &crate::types::Flags) {
            self.0.lock().unwrap().on_flags(flags);
        }
        fn on_bye(&mut self, text: &str) {
            self.0.lock().unwrap().on_bye(text);
        }
        fn on_alert(&mut self, text: &str) {
            self.0.lock().unwrap().on_alert(text);
        }
    }

    #[tokio::test]
    async fn test_unsolicited_events_are_forwarded() {
        let input = b"* 12 EXISTS\r\n\
            * 2 RECENT\r\n\
            * 3 EXPUNGE\r\n\
            * VANISHED (EARLIER) 4:6\r\n\
            * FLAGS (\\Seen \\Deleted)\r\n\
            * 5 FETCH (FLAGS (\\Seen) UID 55)\r\n\
            * OK [ALERT] disk almost full\r\n\
            * NOTIFY-SOMETHING (a {3}\r\nxyz b)\r\n\
            A0000 OK done\r\n";
        let collector = SharedCollector::default();
        let (engine, _) = engine(input);
        let mut engine = engine.with_unsolicited_handler(collector.clone());
        let command = engine.execute(Command::builder("NOOP").build()).await.unwrap();
        command.check().unwrap();
        assert_eq!(command.untagged_codes(), &[ResponseCode::Alert]);

        let events = collector.take();
        assert_eq!(events.len(), 7, "{events:?}");
        assert_eq!(events[0], UnsolicitedEvent::Exists(12));
        assert_eq!(events[1], UnsolicitedEvent::Recent(2));
        assert_eq!(events[2], UnsolicitedEvent::Expunge(SeqNum::new(3).unwrap()));
        assert_eq!(
            events[3],
            UnsolicitedEvent::Vanished {
                uids: UidSet::parse("4:6").unwrap(),
                earlier: true,
            }
        );
        let UnsolicitedEvent::Flags(flags) = &events[4] else {
            panic!("expected FLAGS, got {:?}", events[4]);
        };
        assert_eq!(flags.len(), 2);
        assert!(flags.is_seen());
        assert!(flags.is_deleted());
        let UnsolicitedEvent::Fetch(summary) = &events[5] else {
            panic!("expected FETCH, got {:?}", events[5]);
        };
        assert_eq!(summary.seq.get(), 5);
        assert_eq!(summary.uid.unwrap().get(), 55);
        assert!(summary.flags.as_ref().unwrap().is_seen());
        assert_eq!(events[6], UnsolicitedEvent::Alert("disk almost full".to_string()));
    }

    #[tokio::test]
    async fn test_bye_reaches_handler_before_eof() {
        let collector = SharedCollector::default();
        let (engine, _) = engine(b"* 1 EXISTS\r\n* VANISHED 9\r\n* BYE idle timeout\r\n");
        let mut engine = engine.with_unsolicited_handler(collector.clone());
        let err = engine
            .execute(Command::builder("NOOP").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bye(_)));
        assert_eq!(
            collector.take(),
            vec![
                UnsolicitedEvent::Exists(1),
                UnsolicitedEvent::Vanished {
                    uids: UidSet::parse("9").unwrap(),
                    earlier: false,
                },
                UnsolicitedEvent::Bye("idle timeout".to_string()),
            ]
        );
    }

    #[test]
    fn test_greeting_detects_exchange() {
        let (mut engine, _) = engine(b"");
        assert!(!engine.quirks().allows(Quirks::MALFORMED_BODY));
        engine.set_greeting("* OK The Microsoft Exchange IMAP4 service is ready.");
        assert_eq!(
            engine.greeting(),
            Some("* OK The Microsoft Exchange IMAP4 service is ready.")
        );
        assert_eq!(engine.quirks().server_type, ServerType::Exchange);
        assert!(engine.quirks().allows(Quirks::MALFORMED_BODY));
    }

    #[tokio::test]
    async fn test_capabilities_win_over_greeting() {
        let (engine, _) = engine(b"* CAPABILITY IMAP4rev1 X-GM-EXT-1\r\nA0000 OK\r\n");
        let mut engine = engine.with_greeting("Dovecot ready.");
        assert_eq!(engine.quirks().server_type, ServerType::Dovecot);
        engine
            .execute(Command::builder("CAPABILITY").build())
            .await
            .unwrap();
        assert_eq!(engine.quirks().server_type, ServerType::Gmail);
    }

    #[test]
    fn test_configured_server_type_wins_over_greeting() {
        let config = EngineConfig::builder().server_type(ServerType::Gmail).build();
        let (engine, _) = engine_with(b"", config);
        let engine = engine.with_greeting("Microsoft Exchange");
        assert_eq!(engine.quirks().server_type, ServerType::Gmail);
    }

    #[tokio::test]
    async fn test_oversized_literal_in_untagged_response_poisons() {
        let config = EngineConfig::builder().max_literal_size(4).build();
        let (mut engine, _) = engine_with(
            b"* 1 FETCH (X-GM-LABELS ({5}\r\nlabel))\r\nA0000 OK\r\n",
            config,
        );
        let err = engine
            .execute(Command::builder("NOOP").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { context: "reading literal", .. }));
        assert!(engine.is_poisoned());
    }

    #[tokio::test]
    async fn test_enabled_is_recorded() {
        let (mut engine, _) = engine(b"* ENABLED CONDSTORE QRESYNC\r\nA0000 OK\r\n");
        engine
            .execute(Command::builder("ENABLE").text("CONDSTORE QRESYNC").build())
            .await
            .unwrap();
        assert_eq!(engine.enabled(), &[Capability::CondStore, Capability::QResync]);
    }

    #[tokio::test]
    async fn test_unknown_tag_poisons() {
        let (mut engine, _) = engine(b"Z9 OK what\r\n");
        let tag = engine.enqueue(Command::builder("NOOP").build()).unwrap();
        let err = engine.run(&tag).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(engine.is_poisoned());
        assert!(matches!(
            engine.enqueue(Command::builder("NOOP").build()),
            Err(Error::Poisoned)
        ));
    }

    #[tokio::test]
    async fn test_unexpected_continuation_is_protocol_error() {
        let (mut engine, _) = engine(b"+ go ahead\r\n");
        let err = engine
            .execute(Command::builder("NOOP").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { context: "reading continuation", .. }));
    }

    #[tokio::test]
    async fn test_bye_then_eof() {
        let (mut engine, _) = engine(b"* BYE shutting down\r\n");
        let err = engine
            .execute(Command::builder("NOOP").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bye(ref text) if text == "shutting down"));
        assert_eq!(engine.bye(), Some("shutting down"));
    }

    #[tokio::test]
    async fn test_run_unknown_tag_is_not_fatal() {
        let (mut engine, _) = engine(b"");
        let err = engine.run(&Tag::new("A0042")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(!engine.is_poisoned());
    }

    #[test]
    fn test_blocking_execute() {
        let server = MockServer::new(b"* 3 EXISTS\r\nA0000 OK done\r\n");
        let mut engine = Engine::blocking(server, EngineConfig::default());
        let command = engine
            .execute_blocking(Command::builder("NOOP").build())
            .unwrap();
        command.check().unwrap();
    }
}
