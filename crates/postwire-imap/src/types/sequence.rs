//! Sequence sets for message ranges.

use super::{SeqNum, Uid};

/// Sequence-number set used to address messages in FETCH commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Range from start to end of mailbox.
    RangeFrom(SeqNum),
    /// All messages (`1:*`).
    All,
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub const fn single(n: u32) -> Option<Self> {
        match SeqNum::new(n) {
            Some(seq) => Some(Self::Single(seq)),
            None => None,
        }
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => f.write_str("1:*"),
            Self::Set(items) => write_joined(f, items),
        }
    }
}

/// UID set, as used by UID FETCH and reported by VANISHED and COPYUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Single UID.
    Single(Uid),
    /// Range of UIDs (inclusive, stored low to high).
    Range(Uid, Uid),
    /// Range from start to highest UID.
    RangeFrom(Uid),
    /// All messages.
    All,
    /// Multiple UID specifications.
    Set(Vec<Self>),
}

impl UidSet {
    /// Creates a UID set from a single UID.
    #[must_use]
    pub const fn single(uid: Uid) -> Self {
        Self::Single(uid)
    }

    /// Creates a UID set from a range.
    #[must_use]
    pub fn range(start: Uid, end: Uid) -> Self {
        if start <= end {
            Self::Range(start, end)
        } else {
            Self::Range(end, start)
        }
    }

    /// Parses a `sequence-set` as sent by the server (`41,43:116,200:*`).
    ///
    /// Returns `None` for empty input, zero values, or stray characters.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut items = s
            .split(',')
            .map(|item| match item.split_once(':') {
                None if item == "*" => Some(Self::All),
                None => Some(Self::Single(parse_uid(item)?)),
                Some((start, "*")) => Some(Self::RangeFrom(parse_uid(start)?)),
                Some((start, end)) => Some(Self::range(parse_uid(start)?, parse_uid(end)?)),
            })
            .collect::<Option<Vec<_>>>()?;

        if items.len() == 1 {
            items.pop()
        } else {
            Some(Self::Set(items))
        }
    }

    /// Returns true if `uid` is a member of this set.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        match self {
            Self::Single(u) => *u == uid,
            Self::Range(start, end) => (*start..=*end).contains(&uid),
            Self::RangeFrom(start) => uid >= *start,
            Self::All => true,
            Self::Set(items) => items.iter().any(|item| item.contains(uid)),
        }
    }
}

fn parse_uid(s: &str) -> Option<Uid> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Uid::new(s.parse().ok()?)
}

fn write_joined<T: std::fmt::Display>(f: &mut std::fmt::Formatter<'_>, items: &[T]) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => f.write_str("1:*"),
            Self::Set(items) => write_joined(f, items),
        }
    }
}

/// Messages addressed by a FETCH: sequence numbers or UIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSet {
    /// `FETCH <sequence-set>`.
    Seq(SequenceSet),
    /// `UID FETCH <uid-set>`.
    Uid(UidSet),
}

impl MessageSet {
    /// Returns true if this set is addressed by UID.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        matches!(self, Self::Uid(_))
    }
}

impl std::fmt::Display for MessageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seq(set) => write!(f, "{set}"),
            Self::Uid(set) => write!(f, "{set}"),
        }
    }
}
