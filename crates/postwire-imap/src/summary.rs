//! Per-message FETCH summaries.
//!
//! A [`MessageSummary`] accumulates every non-streamed FETCH item the server
//! sent for one sequence number. [`MessageSummaryItems`] records which fields
//! are populated; servers may volunteer items that were never requested, so a
//! set bit is the only reliable signal that a field holds data.

use bitflags::bitflags;
use chrono::{DateTime, FixedOffset};

use crate::header::HeaderList;
use crate::types::{Flags, SeqNum, Uid};

bitflags! {
    /// Which fields of a [`MessageSummary`] carry data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageSummaryItems: u32 {
        /// `UID`
        const UNIQUE_ID = 1 << 0;
        /// `FLAGS`
        const FLAGS = 1 << 1;
        /// `INTERNALDATE`
        const INTERNAL_DATE = 1 << 2;
        /// `SAVEDATE`
        const SAVE_DATE = 1 << 3;
        /// `RFC822.SIZE`
        const SIZE = 1 << 4;
        /// `BODY` (non-extensible structure)
        const BODY = 1 << 5;
        /// `BODYSTRUCTURE`
        const BODY_STRUCTURE = 1 << 6;
        /// `ENVELOPE`
        const ENVELOPE = 1 << 7;
        /// `MODSEQ`
        const MOD_SEQ = 1 << 8;
        /// `EMAILID`
        const EMAIL_ID = 1 << 9;
        /// `THREADID`
        const THREAD_ID = 1 << 10;
        /// `X-GM-MSGID`
        const GMAIL_MESSAGE_ID = 1 << 11;
        /// `X-GM-THRID`
        const GMAIL_THREAD_ID = 1 << 12;
        /// `X-GM-LABELS`
        const GMAIL_LABELS = 1 << 13;
        /// `ANNOTATION`
        const ANNOTATIONS = 1 << 14;
        /// `PREVIEW`
        const PREVIEW_TEXT = 1 << 15;
        /// `BODY[HEADER]`, `BODY[HEADER.FIELDS (...)]` or `RFC822.HEADER`
        const HEADERS = 1 << 16;

        /// The `FAST` macro: flags, internal date and size.
        const FAST = Self::FLAGS.bits() | Self::INTERNAL_DATE.bits() | Self::SIZE.bits();
        /// The `ALL` macro: `FAST` plus the envelope.
        const ALL = Self::FAST.bits() | Self::ENVELOPE.bits();
        /// The `FULL` macro: `ALL` plus the body structure.
        const FULL = Self::ALL.bits() | Self::BODY.bits();
    }
}

/// Address from an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Local part, or the group name for a group start marker.
    pub mailbox: Option<String>,
    /// Domain; `None` marks an RFC 5322 group start or end.
    pub host: Option<String>,
}

impl Address {
    /// Returns `local@domain` if both parts are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    /// Returns true if this entry is a group start or end marker.
    #[must_use]
    pub const fn is_group_marker(&self) -> bool {
        self.host.is_none()
    }
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header, verbatim.
    pub date: Option<String>,
    /// Subject header, verbatim.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Fields shared by every single-part body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyFields {
    /// Content-Type parameters.
    pub params: Vec<(String, String)>,
    /// Content-ID.
    pub id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding.
    pub encoding: String,
    /// Encoded size in bytes.
    pub size: u32,
}

/// Content-Disposition from extension data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Disposition type (`inline`, `attachment`).
    pub kind: String,
    /// Disposition parameters.
    pub params: Vec<(String, String)>,
}

/// Extension data of a BODYSTRUCTURE part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyExtension {
    /// Content-MD5 (single-part only).
    pub md5: Option<String>,
    /// Content-Type parameters (multipart only).
    pub params: Vec<(String, String)>,
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language tags.
    pub language: Vec<String>,
    /// Content-Location.
    pub location: Option<String>,
}

/// MIME structure of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStructure {
    /// Any single part that is neither `text/*` nor `message/rfc822`.
    Basic {
        /// Media type.
        media_type: String,
        /// Media subtype.
        subtype: String,
        /// Common fields.
        fields: BodyFields,
        /// Extension data (BODYSTRUCTURE only).
        extension: Option<BodyExtension>,
    },
    /// A `text/*` part.
    Text {
        /// Text subtype.
        subtype: String,
        /// Common fields.
        fields: BodyFields,
        /// Size in lines.
        lines: u32,
        /// Extension data (BODYSTRUCTURE only).
        extension: Option<BodyExtension>,
    },
    /// A `message/rfc822` part.
    Message {
        /// Common fields.
        fields: BodyFields,
        /// Envelope of the nested message.
        envelope: Box<Envelope>,
        /// Structure of the nested message.
        body: Box<Self>,
        /// Size in lines.
        lines: u32,
        /// Extension data (BODYSTRUCTURE only).
        extension: Option<BodyExtension>,
    },
    /// A `multipart/*` container.
    Multipart {
        /// Child parts.
        parts: Vec<Self>,
        /// Multipart subtype.
        subtype: String,
        /// Extension data (BODYSTRUCTURE only).
        extension: Option<BodyExtension>,
    },
}

impl BodyStructure {
    /// Returns the `type/subtype` of this part, lower-cased.
    #[must_use]
    pub fn mime_type(&self) -> String {
        let (media_type, subtype) = match self {
            Self::Basic {
                media_type,
                subtype,
                ..
            } => (media_type.as_str(), subtype.as_str()),
            Self::Text { subtype, .. } => ("text", subtype.as_str()),
            Self::Message { .. } => ("message", "rfc822"),
            Self::Multipart { subtype, .. } => ("multipart", subtype.as_str()),
        };
        format!("{media_type}/{subtype}").to_ascii_lowercase()
    }

    /// Returns the part addressed by an IMAP part specifier such as `1.2`.
    #[must_use]
    pub fn part(&self, spec: &str) -> Option<&Self> {
        let mut current = self;
        for index in spec.split('.') {
            let index: usize = index.parse().ok()?;
            let child = index.checked_sub(1)?;
            current = match current {
                Self::Multipart { parts, .. } => parts.get(child)?,
                Self::Message { body, .. } => match body.as_ref() {
                    Self::Multipart { parts, .. } => parts.get(child)?,
                    single if child == 0 => single,
                    _ => return None,
                },
                single if child == 0 => single,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// One ANNOTATION entry (RFC 5257).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Entry name, e.g. `/comment`.
    pub entry: String,
    /// Attribute/value pairs, e.g. `value.priv`.
    pub attributes: Vec<(String, Option<String>)>,
}

/// Everything a server reported about one message outside of streamed
/// sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Sequence number.
    pub seq: SeqNum,
    /// Populated fields.
    pub items: MessageSummaryItems,
    /// UID.
    pub uid: Option<Uid>,
    /// Flags.
    pub flags: Option<Flags>,
    /// INTERNALDATE.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// SAVEDATE; servers report NIL when the date is unknown.
    pub save_date: Option<DateTime<FixedOffset>>,
    /// RFC822.SIZE.
    pub size: Option<u64>,
    /// BODY or BODYSTRUCTURE.
    pub body: Option<BodyStructure>,
    /// ENVELOPE.
    pub envelope: Option<Box<Envelope>>,
    /// MODSEQ.
    pub mod_seq: Option<u64>,
    /// EMAILID (OBJECTID).
    pub email_id: Option<String>,
    /// THREADID (OBJECTID); NIL when threads are unsupported.
    pub thread_id: Option<String>,
    /// X-GM-MSGID.
    pub gmail_message_id: Option<u64>,
    /// X-GM-THRID.
    pub gmail_thread_id: Option<u64>,
    /// X-GM-LABELS, decoded from modified UTF-7.
    pub gmail_labels: Vec<String>,
    /// ANNOTATION entries.
    pub annotations: Vec<Annotation>,
    /// PREVIEW text.
    pub preview_text: Option<String>,
    /// Parsed header block.
    pub headers: Option<HeaderList>,
}

impl MessageSummary {
    /// Creates an empty summary for a sequence number.
    #[must_use]
    pub const fn new(seq: SeqNum) -> Self {
        Self {
            seq,
            items: MessageSummaryItems::empty(),
            uid: None,
            flags: None,
            internal_date: None,
            save_date: None,
            size: None,
            body: None,
            envelope: None,
            mod_seq: None,
            email_id: None,
            thread_id: None,
            gmail_message_id: None,
            gmail_thread_id: None,
            gmail_labels: Vec::new(),
            annotations: Vec::new(),
            preview_text: None,
            headers: None,
        }
    }

    /// Merges a later FETCH line for the same message.
    ///
    /// Only fields whose bit is set in `other` are overwritten; everything
    /// else keeps its current value.
    pub fn merge(&mut self, other: Self) {
        use MessageSummaryItems as I;

        let present = other.items;
        if present.contains(I::UNIQUE_ID) {
            self.uid = other.uid;
        }
        if present.contains(I::FLAGS) {
            self.flags = other.flags;
        }
        if present.contains(I::INTERNAL_DATE) {
            self.internal_date = other.internal_date;
        }
        if present.contains(I::SAVE_DATE) {
            self.save_date = other.save_date;
        }
        if present.contains(I::SIZE) {
            self.size = other.size;
        }
        if present.intersects(I::BODY | I::BODY_STRUCTURE) {
            self.body = other.body;
        }
        if present.contains(I::ENVELOPE) {
            self.envelope = other.envelope;
        }
        if present.contains(I::MOD_SEQ) {
            self.mod_seq = other.mod_seq;
        }
        if present.contains(I::EMAIL_ID) {
            self.email_id = other.email_id;
        }
        if present.contains(I::THREAD_ID) {
            self.thread_id = other.thread_id;
        }
        if present.contains(I::GMAIL_MESSAGE_ID) {
            self.gmail_message_id = other.gmail_message_id;
        }
        if present.contains(I::GMAIL_THREAD_ID) {
            self.gmail_thread_id = other.gmail_thread_id;
        }
        if present.contains(I::GMAIL_LABELS) {
            self.gmail_labels = other.gmail_labels;
        }
        if present.contains(I::ANNOTATIONS) {
            self.annotations = other.annotations;
        }
        if present.contains(I::PREVIEW_TEXT) {
            self.preview_text = other.preview_text;
        }
        if present.contains(I::HEADERS) {
            self.headers = other.headers;
        }
        self.items |= present;
    }
}

/// Parses an IMAP `date-time` such as `17-Jul-1996 02:44:25 -0700`.
///
/// Single-digit days may be space padded.
#[must_use]
pub fn parse_date_time(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;
    use crate::types::Flag;

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    #[test]
    fn test_merge_unions_fields() {
        let mut first = MessageSummary::new(seq(3));
        first.items = MessageSummaryItems::UNIQUE_ID;
        first.uid = Uid::new(10);

        let mut second = MessageSummary::new(seq(3));
        second.items = MessageSummaryItems::FLAGS;
        second.flags = Some([Flag::Seen].into_iter().collect());

        first.merge(second);
        assert_eq!(
            first.items,
            MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::FLAGS
        );
        assert_eq!(first.uid, Uid::new(10));
        assert!(first.flags.unwrap().is_seen());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut first = MessageSummary::new(seq(1));
        first.items = MessageSummaryItems::SIZE;
        first.size = Some(2048);

        let mut second = MessageSummary::new(seq(1));
        second.items = MessageSummaryItems::MOD_SEQ;
        second.mod_seq = Some(99);

        first.merge(second);
        assert_eq!(first.size, Some(2048));
        assert_eq!(first.mod_seq, Some(99));
    }

    #[test]
    fn test_parse_date_time() {
        let date = parse_date_time("17-Jul-1996 02:44:25 -0700").unwrap();
        assert_eq!(date.year(), 1996);
        assert_eq!(date.month(), 7);
        assert_eq!(date.hour(), 2);
        assert_eq!(date.offset().local_minus_utc(), -7 * 3600);

        let padded = parse_date_time(" 1-Jan-2024 00:00:00 +0000").unwrap();
        assert_eq!(padded.day(), 1);

        assert!(parse_date_time("yesterday").is_none());
    }

    #[test]
    fn test_part_lookup() {
        let text = |subtype: &str| BodyStructure::Text {
            subtype: subtype.into(),
            fields: BodyFields::default(),
            lines: 1,
            extension: None,
        };
        let body = BodyStructure::Multipart {
            parts: vec![
                text("PLAIN"),
                BodyStructure::Multipart {
                    parts: vec![text("HTML")],
                    subtype: "ALTERNATIVE".into(),
                    extension: None,
                },
            ],
            subtype: "MIXED".into(),
            extension: None,
        };
        assert_eq!(body.part("1").unwrap().mime_type(), "text/plain");
        assert_eq!(body.part("2.1").unwrap().mime_type(), "text/html");
        assert!(body.part("3").is_none());
        assert!(body.part("0").is_none());
        assert_eq!(text("PLAIN").part("1").unwrap().mime_type(), "text/plain");
    }

    #[test]
    fn test_address_email() {
        let addr = Address {
            name: Some("John".into()),
            adl: None,
            mailbox: Some("john".into()),
            host: Some("example.com".into()),
        };
        assert_eq!(addr.email().as_deref(), Some("john@example.com"));
        assert!(!addr.is_group_marker());
        assert!(Address::default().is_group_marker());
    }
}
