//! Error types for the protocol engine.

use thiserror::Error;

use crate::types::{Capability, ResponseCode, Status, Tag};

/// Errors that can occur while driving an IMAP connection.
///
/// The variants map onto two classes: errors that leave the connection usable
/// ([`Error::Command`], [`Error::NotFound`], [`Error::MissingCapability`]) and
/// errors after which the byte stream can no longer be trusted. Use
/// [`Error::is_fatal`] to tell them apart.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that violate the IMAP grammar.
    #[error("Protocol error while {context}: {message}")]
    Protocol {
        /// What the parser was doing when the violation was detected.
        context: &'static str,
        /// Description of the offending input.
        message: String,
    },

    /// The server completed a command with NO or BAD.
    #[error("Server returned {status} for {tag}: {text}")]
    Command {
        /// Tag of the failed command.
        tag: Tag,
        /// Completion status (NO or BAD).
        status: Status,
        /// Structured response code, if the server sent one.
        code: Option<ResponseCode>,
        /// Human-readable text from the server.
        text: String,
    },

    /// A well-formed response did not contain the requested item.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation needs an extension the server does not advertise.
    #[error("Server does not advertise {0}")]
    MissingCapability(Capability),

    /// The command was cancelled while on the wire.
    #[error("Operation cancelled")]
    Cancelled,

    /// The server closed the connection with BYE.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// An earlier fatal error left the protocol state indeterminate.
    #[error("Connection state is indeterminate after an earlier failure; reconnect required")]
    Poisoned,

    /// The request is not valid for the engine's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a protocol error for the given parsing context.
    pub(crate) fn protocol(context: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            context,
            message: message.into(),
        }
    }

    /// Returns true if the connection must be discarded after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Protocol { .. } | Self::Cancelled | Self::Bye(_) | Self::Poisoned
        )
    }

    /// Returns the server response code carried by a command failure.
    #[must_use]
    pub const fn response_code(&self) -> Option<&ResponseCode> {
        match self {
            Self::Command { code, .. } => code.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::protocol("reading token", "bad byte").is_fatal());
        assert!(Error::Cancelled.is_fatal());
        assert!(Error::Io(std::io::ErrorKind::UnexpectedEof.into()).is_fatal());
        assert!(!Error::NotFound("BODY[1]".into()).is_fatal());
        assert!(!Error::MissingCapability(Capability::CondStore).is_fatal());

        let err = Error::Command {
            tag: Tag::new("A0001"),
            status: Status::No,
            code: Some(ResponseCode::TryCreate),
            text: "no such mailbox".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.response_code(), Some(&ResponseCode::TryCreate));
    }

    #[test]
    fn test_display_names_context() {
        let err = Error::protocol("reading quoted string", "unterminated");
        assert_eq!(
            err.to_string(),
            "Protocol error while reading quoted string: unterminated"
        );
    }
}
