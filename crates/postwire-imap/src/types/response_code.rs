//! Response codes.

use super::{Capabilities, Flags, SeqNum, Uid, UidSet, UidValidity};

/// Bracketed response code carried by a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY list announced inline.
    Capability(Capabilities),
    /// PARSE: Error parsing message.
    Parse,
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Flags),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(UidValidity),
    /// UNSEEN: First unseen message sequence number.
    Unseen(SeqNum),
    /// APPENDUID: UID assigned to appended message.
    AppendUid {
        /// UIDVALIDITY of the mailbox.
        uidvalidity: UidValidity,
        /// UID of the appended message.
        uid: Uid,
    },
    /// COPYUID: UIDs of copied messages.
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uidvalidity: UidValidity,
        /// Source UIDs.
        source: UidSet,
        /// Destination UIDs.
        dest: UidSet,
    },
    /// HIGHESTMODSEQ: Highest mod-sequence value (CONDSTORE).
    HighestModSeq(u64),
    /// NOMODSEQ: Server doesn't support mod-sequences for this mailbox.
    NoModSeq,
    /// MODIFIED: messages that failed a conditional STORE (CONDSTORE).
    Modified(UidSet),
    /// CLOSED: the previously selected mailbox was closed (QRESYNC).
    Closed,
    /// Any other code, with its raw argument text.
    Other {
        /// Code name as sent.
        name: String,
        /// Raw argument text, if any.
        data: Option<String>,
    },
}

impl ResponseCode {
    /// Returns the code name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Alert => "ALERT",
            Self::Capability(_) => "CAPABILITY",
            Self::Parse => "PARSE",
            Self::PermanentFlags(_) => "PERMANENTFLAGS",
            Self::ReadOnly => "READ-ONLY",
            Self::ReadWrite => "READ-WRITE",
            Self::TryCreate => "TRYCREATE",
            Self::UidNext(_) => "UIDNEXT",
            Self::UidValidity(_) => "UIDVALIDITY",
            Self::Unseen(_) => "UNSEEN",
            Self::AppendUid { .. } => "APPENDUID",
            Self::CopyUid { .. } => "COPYUID",
            Self::HighestModSeq(_) => "HIGHESTMODSEQ",
            Self::NoModSeq => "NOMODSEQ",
            Self::Modified(_) => "MODIFIED",
            Self::Closed => "CLOSED",
            Self::Other { name, .. } => name,
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ResponseCode::TryCreate.name(), "TRYCREATE");
        assert_eq!(ResponseCode::HighestModSeq(9).name(), "HIGHESTMODSEQ");
        let other = ResponseCode::Other {
            name: "WEBALERT".into(),
            data: Some("url=https://example.com".into()),
        };
        assert_eq!(other.name(), "WEBALERT");
        assert_eq!(other.to_string(), "[WEBALERT]");
    }
}
