//! Server quirks and workarounds.
//!
//! The parsers fail loudly on anything outside the grammar, except for a
//! short, explicitly named list of deviations that real servers are known to
//! produce. Each tolerance is a [`Quirks`] bit; the parsers consult
//! [`ServerQuirks::allows`] before accepting one and log when they do.

use bitflags::bitflags;

use crate::types::{Capabilities, Capability};

/// Known IMAP server families with specific quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    /// Unknown or generic IMAP server.
    #[default]
    Unknown,
    /// Gmail IMAP (imap.gmail.com).
    Gmail,
    /// Microsoft Exchange / Outlook / Office 365.
    Exchange,
    /// Yahoo Mail.
    Yahoo,
    /// Dovecot.
    Dovecot,
    /// Cyrus IMAP.
    Cyrus,
}

impl ServerType {
    /// Detects the server type from capabilities and, optionally, the
    /// greeting text.
    #[must_use]
    pub fn detect(capabilities: &Capabilities, greeting: Option<&str>) -> Self {
        if capabilities.has(&Capability::GmailExt) {
            return Self::Gmail;
        }
        let has = |name: &str| {
            capabilities
                .iter()
                .any(|c| matches!(c, Capability::Unknown(s) if s.eq_ignore_ascii_case(name)))
        };
        if has("XYMHIGHESTMODSEQ") {
            return Self::Yahoo;
        }

        let Some(greeting) = greeting else {
            return Self::Unknown;
        };
        let lower = greeting.to_ascii_lowercase();
        [
            ("gimap", Self::Gmail),
            ("exchange", Self::Exchange),
            ("outlook", Self::Exchange),
            ("yahoo", Self::Yahoo),
            ("dovecot", Self::Dovecot),
            ("cyrus", Self::Cyrus),
        ]
        .into_iter()
        .find(|(needle, _)| lower.contains(needle))
        .map_or(Self::Unknown, |(_, server)| server)
    }
}

bitflags! {
    /// Named deviations from the grammar that the parsers will accept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Quirks: u8 {
        /// A MODSEQ value that is not an unsigned integer (e.g. `-1`) is
        /// ignored instead of failing the FETCH.
        const INVALID_MODSEQ = 1 << 0;
        /// `* 1 FETCH ((UID 1 FLAGS ()))`: the item list wrapped in an extra
        /// pair of parentheses.
        const EXTRA_PARENS = 1 << 1;
        /// `BODY[TEXT])`: a section with no value at all, read as empty.
        const MISSING_BODY_VALUE = 1 << 2;
        /// `BODY NIL` / `BODYSTRUCTURE ()` where a body structure belongs.
        const MALFORMED_BODY = 1 << 3;
    }
}

/// Quirk tolerances in effect for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerQuirks {
    /// The server family the tolerances were chosen for.
    pub server_type: ServerType,
    /// Enabled tolerances.
    pub quirks: Quirks,
}

impl Default for ServerQuirks {
    fn default() -> Self {
        Self::for_server(ServerType::Unknown)
    }
}

impl ServerQuirks {
    /// Returns the tolerances for a server family.
    ///
    /// The MODSEQ, parenthesis and missing-value tolerances have been seen
    /// across many servers and are always on; malformed body structures are
    /// only accepted from the vendors known to send them.
    #[must_use]
    pub const fn for_server(server_type: ServerType) -> Self {
        let base = Quirks::INVALID_MODSEQ
            .union(Quirks::EXTRA_PARENS)
            .union(Quirks::MISSING_BODY_VALUE);
        let quirks = match server_type {
            ServerType::Exchange | ServerType::Yahoo => base.union(Quirks::MALFORMED_BODY),
            _ => base,
        };
        Self {
            server_type,
            quirks,
        }
    }

    /// Returns quirks with every tolerance disabled.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            server_type: ServerType::Unknown,
            quirks: Quirks::empty(),
        }
    }

    /// Returns true if the tolerance is enabled.
    #[must_use]
    pub const fn allows(&self, quirk: Quirks) -> bool {
        self.quirks.contains(quirk)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_gmail_from_capability() {
        let caps = Capabilities::parse_list("IMAP4rev1 X-GM-EXT-1 UIDPLUS");
        assert_eq!(ServerType::detect(&caps, None), ServerType::Gmail);
    }

    #[test]
    fn test_detect_from_greeting() {
        let caps = Capabilities::parse_list("IMAP4rev1");
        assert_eq!(
            ServerType::detect(&caps, Some("The Microsoft Exchange IMAP4 service is ready.")),
            ServerType::Exchange
        );
        assert_eq!(
            ServerType::detect(&caps, Some("Dovecot ready.")),
            ServerType::Dovecot
        );
        assert_eq!(ServerType::detect(&caps, None), ServerType::Unknown);
    }

    #[test]
    fn test_malformed_body_only_for_vendors() {
        assert!(ServerQuirks::for_server(ServerType::Exchange).allows(Quirks::MALFORMED_BODY));
        assert!(ServerQuirks::for_server(ServerType::Yahoo).allows(Quirks::MALFORMED_BODY));
        assert!(!ServerQuirks::for_server(ServerType::Dovecot).allows(Quirks::MALFORMED_BODY));
        assert!(!ServerQuirks::default().allows(Quirks::MALFORMED_BODY));
    }

    #[test]
    fn test_common_quirks_always_on() {
        let quirks = ServerQuirks::default();
        assert!(quirks.allows(Quirks::INVALID_MODSEQ));
        assert!(quirks.allows(Quirks::EXTRA_PARENS));
        assert!(quirks.allows(Quirks::MISSING_BODY_VALUE));
        assert!(!ServerQuirks::strict().allows(Quirks::INVALID_MODSEQ));
    }
}
