//! Server capabilities and response status.

/// Status keyword of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses a status keyword, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            ("OK", Self::Ok),
            ("NO", Self::No),
            ("BAD", Self::Bad),
            ("PREAUTH", Self::PreAuth),
            ("BYE", Self::Bye),
        ]
        .into_iter()
        .find(|(text, _)| text.eq_ignore_ascii_case(s))
        .map(|(_, status)| status)
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }

    /// Returns the keyword as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// LITERAL- extension (RFC 7888)
    LiteralMinus,
    /// BINARY extension (RFC 3516)
    Binary,
    /// ENABLE command (RFC 5161)
    Enable,
    /// UTF8=ACCEPT (RFC 6855)
    Utf8Accept,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// OBJECTID (RFC 8474)
    ObjectId,
    /// SAVEDATE (RFC 8514)
    SaveDate,
    /// PREVIEW (RFC 8970)
    Preview,
    /// ANNOTATE-EXPERIMENT-1 (RFC 5257)
    Annotate,
    /// Gmail extensions (X-GM-EXT-1)
    GmailExt,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "LITERAL+" => Self::LiteralPlus,
            "LITERAL-" => Self::LiteralMinus,
            "BINARY" => Self::Binary,
            "ENABLE" => Self::Enable,
            "UTF8=ACCEPT" => Self::Utf8Accept,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "OBJECTID" => Self::ObjectId,
            "SAVEDATE" => Self::SaveDate,
            "PREVIEW" => Self::Preview,
            "ANNOTATE-EXPERIMENT-1" => Self::Annotate,
            "X-GM-EXT-1" => Self::GmailExt,
            _ if upper.starts_with("AUTH=") => Self::Auth(s[5..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Imap4Rev2 => f.write_str("IMAP4rev2"),
            Self::Idle => f.write_str("IDLE"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::LiteralMinus => f.write_str("LITERAL-"),
            Self::Binary => f.write_str("BINARY"),
            Self::Enable => f.write_str("ENABLE"),
            Self::Utf8Accept => f.write_str("UTF8=ACCEPT"),
            Self::CondStore => f.write_str("CONDSTORE"),
            Self::QResync => f.write_str("QRESYNC"),
            Self::ObjectId => f.write_str("OBJECTID"),
            Self::SaveDate => f.write_str("SAVEDATE"),
            Self::Preview => f.write_str("PREVIEW"),
            Self::Annotate => f.write_str("ANNOTATE-EXPERIMENT-1"),
            Self::GmailExt => f.write_str("X-GM-EXT-1"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// How literal payloads in commands are announced to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralMode {
    /// `{n}`: wait for a `+` continuation before sending the payload.
    Synchronizing,
    /// `{n+}` for every literal (LITERAL+).
    NonSynchronizing,
    /// `{n+}` for literals up to 4096 bytes, `{n}` above (LITERAL-).
    NonSynchronizingUpTo4k,
}

impl LiteralMode {
    /// Largest literal LITERAL- allows to be sent without waiting.
    pub const LITERAL_MINUS_LIMIT: usize = 4096;

    /// Returns true if a literal of `len` bytes may be sent eagerly.
    #[must_use]
    pub const fn is_eager(self, len: usize) -> bool {
        match self {
            Self::Synchronizing => false,
            Self::NonSynchronizing => true,
            Self::NonSynchronizingUpTo4k => len <= Self::LITERAL_MINUS_LIMIT,
        }
    }
}

/// The capability set advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    caps: Vec<Capability>,
}

impl Capabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub const fn new() -> Self {
        Self { caps: Vec::new() }
    }

    /// Parses a whitespace-separated capability list.
    #[must_use]
    pub fn parse_list(list: &str) -> Self {
        list.split_ascii_whitespace().map(Capability::parse).collect()
    }

    /// Returns true if the capability is advertised.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Returns an error naming `cap` if it is not advertised.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingCapability`].
    pub fn require(&self, cap: &Capability) -> crate::Result<()> {
        if self.has(cap) {
            Ok(())
        } else {
            Err(crate::Error::MissingCapability(cap.clone()))
        }
    }

    /// Returns the literal mode these capabilities allow.
    #[must_use]
    pub fn literal_mode(&self) -> LiteralMode {
        if self.has(&Capability::LiteralPlus) {
            LiteralMode::NonSynchronizing
        } else if self.has(&Capability::LiteralMinus) {
            LiteralMode::NonSynchronizingUpTo4k
        } else {
            LiteralMode::Synchronizing
        }
    }

    /// Iterates over the advertised capabilities.
    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        self.caps.iter()
    }

    /// Returns the capabilities as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Capability] {
        &self.caps
    }

    /// Returns true if nothing is advertised.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut caps = Vec::new();
        for cap in iter {
            if !caps.contains(&cap) {
                caps.push(cap);
            }
        }
        Self { caps }
    }
}
