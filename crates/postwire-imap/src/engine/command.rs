//! Commands as the engine sends and completes them.

use std::any::Any;

use tokio_util::sync::CancellationToken;

use super::handler::{HandlerTable, UntaggedHandler};
use crate::parser::Tokenizer;
use crate::types::{Capability, LiteralMode, ResponseCode, Status, Tag};
use crate::{Error, Result, utf7};

/// A piece of a command's wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(Vec<u8>),
    Literal(Vec<u8>),
}

/// Where a command stands on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendState {
    /// Every part and the final CRLF have been written.
    Sent,
    /// A synchronizing literal was announced; the payload waits for `+`.
    AwaitingContinuation,
}

/// An IMAP command together with its per-command response state.
///
/// Built with [`Command::builder`], handed to the engine by
/// [`Engine::enqueue`](super::Engine::enqueue) and given back completed by
/// [`Engine::run`](super::Engine::run).
pub struct Command {
    name: String,
    tag: Option<Tag>,
    parts: Vec<Part>,
    next_part: usize,
    started: bool,
    awaiting_continuation: bool,
    cancel: CancellationToken,
    handlers: HandlerTable,
    context: Option<Box<dyn Any + Send>>,
    required: Vec<Capability>,
    pipeline_safe: bool,
    status: Option<Status>,
    code: Option<ResponseCode>,
    text: String,
    untagged_codes: Vec<ResponseCode>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("handlers", &self.handlers)
            .field("status", &self.status)
            .field("code", &self.code)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Starts a command whose first word is `name`.
    #[must_use]
    pub fn builder(name: &str) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    /// The command name, e.g. `UID FETCH`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tag assigned at enqueue time.
    #[must_use]
    pub const fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Terminal status, once the command has completed.
    #[must_use]
    pub const fn status(&self) -> Option<Status> {
        self.status
    }

    /// Response code of the tagged completion.
    #[must_use]
    pub const fn response_code(&self) -> Option<&ResponseCode> {
        self.code.as_ref()
    }

    /// Human-readable text of the tagged completion.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Response codes carried by untagged OK/NO/BAD while the command ran.
    #[must_use]
    pub fn untagged_codes(&self) -> &[ResponseCode] {
        &self.untagged_codes
    }

    /// Capabilities the server must advertise for this command.
    #[must_use]
    pub fn required_capabilities(&self) -> &[Capability] {
        &self.required
    }

    /// Returns true if other commands may be in flight alongside this one.
    #[must_use]
    pub const fn is_pipeline_safe(&self) -> bool {
        self.pipeline_safe
    }

    /// Returns true if the command carries a literal.
    #[must_use]
    pub fn has_literal(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Literal(_)))
    }

    /// The command's cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Requests cancellation. The engine notices at its next read or write
    /// for this command.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Turns a NO or BAD completion into [`Error::Command`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] unless the command completed with OK, and
    /// [`Error::InvalidState`] if it has not completed at all.
    pub fn check(&self) -> Result<()> {
        match self.status {
            Some(status) if status.is_ok() => Ok(()),
            Some(status) => Err(Error::Command {
                tag: self.tag.clone().unwrap_or_else(|| Tag::new("*")),
                status,
                code: self.code.clone(),
                text: self.text.clone(),
            }),
            None => Err(Error::InvalidState(format!("{} has not completed", self.name))),
        }
    }

    /// Borrows the handler registered for `keyword`, if it has type `H`.
    #[must_use]
    pub fn handler<H: UntaggedHandler>(&self, keyword: &str) -> Option<&H> {
        self.handlers.get(keyword)?.as_any().downcast_ref()
    }

    /// Removes the handler registered for `keyword`, if it has type `H`.
    pub fn take_handler<H: UntaggedHandler>(&mut self, keyword: &str) -> Option<H> {
        let matches = self.handler::<H>(keyword).is_some();
        if !matches {
            return None;
        }
        let handler = self.handlers.remove(keyword)?;
        handler.into_any().downcast::<H>().ok().map(|boxed| *boxed)
    }

    /// Borrows the caller's context value, if it has type `T`.
    #[must_use]
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_ref()?.downcast_ref()
    }

    /// Removes the caller's context value, if it has type `T`.
    pub fn take_context<T: Any>(&mut self) -> Option<T> {
        let context = self.context.take()?;
        match context.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(context) => {
                self.context = Some(context);
                None
            }
        }
    }

    pub(crate) fn assign_tag(&mut self, tag: Tag) {
        self.tag = Some(tag);
    }

    pub(crate) fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    pub(crate) const fn is_fully_sent(&self) -> bool {
        self.started && !self.awaiting_continuation && self.next_part == self.parts.len()
    }

    pub(crate) const fn is_awaiting_continuation(&self) -> bool {
        self.awaiting_continuation
    }

    pub(crate) fn record_untagged_code(&mut self, code: ResponseCode) {
        self.untagged_codes.push(code);
    }

    pub(crate) fn complete(&mut self, status: Status, code: Option<ResponseCode>, text: String) {
        self.status = Some(status);
        self.code = code;
        self.text = text;
    }

    pub(crate) fn abort(&mut self) {
        self.handlers.abort_all();
    }

    /// Writes parts until the command is complete or a synchronizing
    /// literal has been announced.
    pub(crate) async fn send(
        &mut self,
        tokens: &mut Tokenizer,
        literals: LiteralMode,
    ) -> Result<SendState> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !self.started {
            let tag = self
                .tag
                .as_ref()
                .ok_or_else(|| Error::InvalidState(format!("{} has no tag", self.name)))?;
            tokens.write_all(tag.as_str().as_bytes()).await?;
            tokens.write_all(b" ").await?;
            self.started = true;
        }

        while let Some(part) = self.parts.get(self.next_part) {
            match part {
                Part::Text(text) => tokens.write_all(text).await?,
                Part::Literal(data) if literals.is_eager(data.len()) => {
                    tokens
                        .write_all(format!("{{{}+}}\r\n", data.len()).as_bytes())
                        .await?;
                    tokens.write_all(data).await?;
                }
                Part::Literal(data) => {
                    tokens
                        .write_all(format!("{{{}}}\r\n", data.len()).as_bytes())
                        .await?;
                    tokens.flush().await?;
                    self.awaiting_continuation = true;
                    return Ok(SendState::AwaitingContinuation);
                }
            }
            self.next_part += 1;
        }
        tokens.write_all(b"\r\n").await?;
        tokens.flush().await?;
        Ok(SendState::Sent)
    }

    /// Writes the payload of the announced literal after the server's `+`,
    /// then the rest of the command.
    pub(crate) async fn resume(
        &mut self,
        tokens: &mut Tokenizer,
        literals: LiteralMode,
    ) -> Result<SendState> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(Part::Literal(data)) = self.parts.get(self.next_part) {
            tokens.write_all(data).await?;
        }
        self.awaiting_continuation = false;
        self.next_part += 1;
        self.send(tokens, literals).await
    }
}

/// Builds a [`Command`] word by word.
pub struct CommandBuilder {
    command: Command,
    text: Vec<u8>,
}

impl std::fmt::Debug for CommandBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuilder")
            .field("name", &self.command.name)
            .field("text", &String::from_utf8_lossy(&self.text))
            .finish_non_exhaustive()
    }
}

impl CommandBuilder {
    fn new(name: &str) -> Self {
        Self {
            command: Command {
                name: name.to_string(),
                tag: None,
                parts: Vec::new(),
                next_part: 0,
                started: false,
                awaiting_continuation: false,
                cancel: CancellationToken::new(),
                handlers: HandlerTable::default(),
                context: None,
                required: Vec::new(),
                pipeline_safe: true,
                status: None,
                code: None,
                text: String::new(),
                untagged_codes: Vec::new(),
            },
            text: name.as_bytes().to_vec(),
        }
    }

    fn space(&mut self) {
        let needed = match self.text.last() {
            Some(b'(') => false,
            Some(_) => true,
            None => !self.command.parts.is_empty(),
        };
        if needed {
            self.text.push(b' ');
        }
    }

    /// Appends raw protocol text, preceded by a space.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.space();
        self.text.extend_from_slice(text.as_bytes());
        self
    }

    /// Appends an atom, quoting it if it contains special characters.
    #[must_use]
    pub fn atom(self, atom: &str) -> Self {
        self.astring(atom)
    }

    /// Appends an astring: bare when possible, quoted when printable,
    /// a literal otherwise.
    #[must_use]
    pub fn astring(mut self, value: &str) -> Self {
        if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0) || b >= 0x80) {
            return self.literal(value.as_bytes());
        }
        self.space();
        write_astring(&mut self.text, value);
        self
    }

    /// Appends a mailbox name in modified UTF-7.
    #[must_use]
    pub fn mailbox(self, name: &str) -> Self {
        let encoded = utf7::encode(name);
        self.astring(&encoded)
    }

    /// Appends a literal. The marker style is chosen when the command is
    /// sent, from the server's capabilities.
    #[must_use]
    pub fn literal(mut self, data: &[u8]) -> Self {
        self.space();
        let text = std::mem::take(&mut self.text);
        self.command.parts.push(Part::Text(text));
        self.command.parts.push(Part::Literal(data.to_vec()));
        self
    }

    /// Requires `capability` at enqueue time.
    #[must_use]
    pub fn requires(mut self, capability: Capability) -> Self {
        if !self.command.required.contains(&capability) {
            self.command.required.push(capability);
        }
        self
    }

    /// Marks the command unsafe to pipeline: it is sent only when nothing
    /// else is in flight, and nothing follows it until it completes.
    #[must_use]
    pub const fn exclusive(mut self) -> Self {
        self.command.pipeline_safe = false;
        self
    }

    /// Registers a handler for untagged responses with `keyword`.
    #[must_use]
    pub fn handler(mut self, keyword: &str, handler: impl UntaggedHandler) -> Self {
        self.command.handlers.insert(keyword, Box::new(handler));
        self
    }

    /// Attaches an opaque value the caller can recover after completion.
    #[must_use]
    pub fn context(mut self, context: impl Any + Send) -> Self {
        self.command.context = Some(Box::new(context));
        self
    }

    /// Uses `token` instead of a fresh cancellation token.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.command.cancel = token;
        self
    }

    /// Finishes the command.
    #[must_use]
    pub fn build(mut self) -> Command {
        if !self.text.is_empty() {
            self.command.parts.push(Part::Text(self.text));
        }
        self.command
    }
}

fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b == 0x7F
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MockServer;

    async fn wire(mut command: Command, literals: LiteralMode) -> (String, SendState) {
        let server = MockServer::new(b"");
        let output = server.output();
        let mut tokens = Tokenizer::new(server.into_stream());
        command.assign_tag(Tag::new("A0001"));
        let state = command.send(&mut tokens, literals).await.unwrap();
        let written = String::from_utf8(output.lock().unwrap().clone()).unwrap();
        (written, state)
    }

    #[tokio::test]
    async fn test_simple_command() {
        let command = Command::builder("SELECT").mailbox("INBOX").build();
        assert!(!command.has_literal());
        let (written, state) = wire(command, LiteralMode::Synchronizing).await;
        assert_eq!(written, "A0001 SELECT INBOX\r\n");
        assert_eq!(state, SendState::Sent);
    }

    #[tokio::test]
    async fn test_astring_quoting_and_utf7_mailbox() {
        let command = Command::builder("RENAME")
            .astring("My Folder")
            .mailbox("Entwürfe")
            .build();
        let (written, _) = wire(command, LiteralMode::Synchronizing).await;
        assert_eq!(written, "A0001 RENAME \"My Folder\" Entw&APw-rfe\r\n");
    }

    #[tokio::test]
    async fn test_eager_literal() {
        let command = Command::builder("APPEND")
            .mailbox("INBOX")
            .literal(b"hello")
            .build();
        assert!(command.has_literal());
        let (written, state) = wire(command, LiteralMode::NonSynchronizing).await;
        assert_eq!(written, "A0001 APPEND INBOX {5+}\r\nhello\r\n");
        assert_eq!(state, SendState::Sent);
    }

    #[tokio::test]
    async fn test_synchronizing_literal_stops_at_marker() {
        let command = Command::builder("LOGIN")
            .literal(b"caf\xc3\xa9")
            .astring("pw")
            .build();
        let server = MockServer::new(b"");
        let output = server.output();
        let mut tokens = Tokenizer::new(server.into_stream());
        let mut command = command;
        command.assign_tag(Tag::new("A0001"));

        let state = command.send(&mut tokens, LiteralMode::Synchronizing).await.unwrap();
        assert_eq!(state, SendState::AwaitingContinuation);
        assert!(!command.is_fully_sent());
        assert_eq!(output.lock().unwrap().as_slice(), b"A0001 LOGIN {5}\r\n");

        let state = command.resume(&mut tokens, LiteralMode::Synchronizing).await.unwrap();
        assert_eq!(state, SendState::Sent);
        assert!(command.is_fully_sent());
        assert_eq!(
            output.lock().unwrap().as_slice(),
            b"A0001 LOGIN {5}\r\ncaf\xc3\xa9 pw\r\n"
        );
    }

    #[test]
    fn test_check_maps_completion() {
        let mut command = Command::builder("NOOP").build();
        assert!(matches!(command.check(), Err(Error::InvalidState(_))));
        command.assign_tag(Tag::new("A0002"));
        command.complete(Status::No, Some(ResponseCode::TryCreate), "no such mailbox".into());
        let err = command.check().unwrap_err();
        assert!(matches!(err, Error::Command { status: Status::No, .. }));
        assert_eq!(err.response_code(), Some(&ResponseCode::TryCreate));
    }

    #[test]
    fn test_context_round_trip() {
        let mut command = Command::builder("NOOP").context(42u32).build();
        assert_eq!(command.context::<u32>(), Some(&42));
        assert!(command.take_context::<String>().is_none());
        assert_eq!(command.take_context::<u32>(), Some(42));
        assert!(command.context::<u32>().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_command_writes_nothing() {
        let command = Command::builder("NOOP").build();
        command.cancel();
        let server = MockServer::new(b"");
        let output = server.output();
        let mut tokens = Tokenizer::new(server.into_stream());
        let mut command = command;
        command.assign_tag(Tag::new("A0001"));
        let err = command.send(&mut tokens, LiteralMode::Synchronizing).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(output.lock().unwrap().is_empty());
    }
}
