//! Message flags and keywords.

/// A message flag as reported in FLAGS data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// `\*` in PERMANENTFLAGS: new keywords may be created.
    Wildcard,
    /// User keyword (`$Forwarded`, `NonJunk`, ...) or an unknown system flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag from its wire text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let Some(name) = s.strip_prefix('\\') else {
            return Self::Keyword(s.to_string());
        };
        if name == "*" {
            return Self::Wildcard;
        }
        [
            ("Seen", Self::Seen),
            ("Answered", Self::Answered),
            ("Flagged", Self::Flagged),
            ("Deleted", Self::Deleted),
            ("Draft", Self::Draft),
            ("Recent", Self::Recent),
        ]
        .into_iter()
        .find(|(text, _)| text.eq_ignore_ascii_case(name))
        .map_or_else(|| Self::Keyword(s.to_string()), |(_, flag)| flag)
    }

    /// Returns the flag as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Wildcard => "\\*",
            Self::Keyword(s) => s,
        }
    }

    /// Returns true for user keywords.
    #[must_use]
    pub const fn is_keyword(&self) -> bool {
        matches!(self, Self::Keyword(_))
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of message flags, in the order the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flag set.
    #[must_use]
    pub const fn new() -> Self {
        Self { flags: Vec::new() }
    }

    /// Adds a flag unless already present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns true if the message is flagged.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.contains(&Flag::Flagged)
    }

    /// Returns true if the message is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(&Flag::Deleted)
    }

    /// Iterates over the user keywords only.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|f| f.is_keyword())
            .map(Flag::as_str)
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> std::slice::Iter<'_, Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

impl<'a> IntoIterator for &'a Flags {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_flags_case_insensitively() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
        assert_eq!(Flag::parse("\\draft"), Flag::Draft);
        assert_eq!(Flag::parse("\\*"), Flag::Wildcard);
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            Flag::parse("$Forwarded"),
            Flag::Keyword("$Forwarded".to_string())
        );
        assert!(Flag::parse("$Forwarded").is_keyword());
        assert!(!Flag::parse("\\Seen").is_keyword());
        // Unknown backslash names stay verbatim.
        assert_eq!(
            Flag::parse("\\Important"),
            Flag::Keyword("\\Important".to_string())
        );
    }

    #[test]
    fn test_flags_dedup_and_keywords() {
        let flags: Flags = [
            Flag::Seen,
            Flag::Keyword("$Junk".into()),
            Flag::Seen,
            Flag::Flagged,
        ]
        .into_iter()
        .collect();

        assert_eq!(flags.len(), 3);
        assert!(flags.is_seen());
        assert!(flags.is_flagged());
        assert!(!flags.is_deleted());
        assert_eq!(flags.keywords().collect::<Vec<_>>(), vec!["$Junk"]);
    }

    #[test]
    fn test_round_trip_as_str() {
        for text in ["\\Seen", "\\Answered", "\\Deleted", "\\Recent", "\\*", "work"] {
            assert_eq!(Flag::parse(text).as_str(), text);
        }
    }
}
