//! Unsolicited response handling.
//!
//! IMAP servers may send certain responses at any time, not only in reply to
//! the command that is running (RFC 2683): EXISTS, RECENT, EXPUNGE, VANISHED,
//! FETCH, FLAGS, status responses with an ALERT, and BYE. The engine forwards
//! every such response that no command-specific handler claimed to an
//! [`UnsolicitedHandler`].
//!
//! # Example
//!
//! ```ignore
//! use postwire_imap::unsolicited::UnsolicitedHandler;
//!
//! struct Counter {
//!     messages: u32,
//! }
//!
//! impl UnsolicitedHandler for Counter {
//!     fn on_exists(&mut self, count: u32) {
//!         self.messages = count;
//!     }
//! }
//! ```

use crate::summary::MessageSummary;
use crate::types::{Flags, SeqNum, UidSet};

/// Receives responses that no command-specific handler claimed.
///
/// Every method has a no-op default.
pub trait UnsolicitedHandler: Send {
    /// The mailbox now holds `count` messages.
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// `count` messages carry the `\Recent` flag.
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// A message was expunged. Later sequence numbers shift down by one.
    fn on_expunge(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// Messages were expunged (QRESYNC). `earlier` is set for responses
    /// describing expunges from before the current command.
    fn on_vanished(&mut self, uids: &UidSet, earlier: bool) {
        let _ = (uids, earlier);
    }

    /// A FETCH response arrived outside any FETCH command, typically a
    /// flag change made by another client.
    fn on_fetch(&mut self, summary: &MessageSummary) {
        let _ = summary;
    }

    /// The mailbox's defined flags changed.
    fn on_flags(&mut self, flags: &Flags) {
        let _ = flags;
    }

    /// The server is closing the connection.
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }

    /// A response carried an ALERT code. The text must be shown to the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged OK with informational text.
    fn on_ok(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged NO (a warning).
    fn on_no(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged BAD.
    fn on_bad(&mut self, text: &str) {
        let _ = text;
    }
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl UnsolicitedHandler for NoopHandler {}

/// Logs every response with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl UnsolicitedHandler for LoggingHandler {
    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "EXPUNGE");
    }

    fn on_vanished(&mut self, uids: &UidSet, earlier: bool) {
        tracing::debug!(%uids, earlier, "VANISHED");
    }

    fn on_fetch(&mut self, summary: &MessageSummary) {
        tracing::debug!(seq = summary.seq.get(), items = ?summary.items, "FETCH");
    }

    fn on_flags(&mut self, flags: &Flags) {
        tracing::debug!(?flags, "FLAGS");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_ok(&mut self, text: &str) {
        tracing::trace!(text, "OK");
    }

    fn on_no(&mut self, text: &str) {
        tracing::warn!(text, "NO");
    }

    fn on_bad(&mut self, text: &str) {
        tracing::error!(text, "BAD");
    }
}

/// Records events for later processing.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events, oldest first.
    pub events: Vec<UnsolicitedEvent>,
}

impl CollectingHandler {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<UnsolicitedEvent> {
        std::mem::take(&mut self.events)
    }
}

impl UnsolicitedHandler for CollectingHandler {
    fn on_exists(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Exists(count));
    }

    fn on_recent(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Recent(count));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.events.push(UnsolicitedEvent::Expunge(seq));
    }

    fn on_vanished(&mut self, uids: &UidSet, earlier: bool) {
        self.events.push(UnsolicitedEvent::Vanished {
            uids: uids.clone(),
            earlier,
        });
    }

    fn on_fetch(&mut self, summary: &MessageSummary) {
        self.events
            .push(UnsolicitedEvent::Fetch(Box::new(summary.clone())));
    }

    fn on_flags(&mut self, flags: &Flags) {
        self.events.push(UnsolicitedEvent::Flags(flags.clone()));
    }

    fn on_bye(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Bye(text.to_string()));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Alert(text.to_string()));
    }
}

/// An event recorded by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum UnsolicitedEvent {
    /// EXISTS.
    Exists(u32),
    /// RECENT.
    Recent(u32),
    /// EXPUNGE.
    Expunge(SeqNum),
    /// VANISHED.
    Vanished {
        /// Expunged UIDs.
        uids: UidSet,
        /// Whether the response carried `(EARLIER)`.
        earlier: bool,
    },
    /// FETCH outside a FETCH command.
    Fetch(Box<MessageSummary>),
    /// FLAGS.
    Flags(Flags),
    /// BYE.
    Bye(String),
    /// ALERT response code.
    Alert(String),
}
