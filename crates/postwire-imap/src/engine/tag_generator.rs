//! Command tag generator.
//!
//! Tags are used to match commands with their tagged completions.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Tag;

/// Generates sequential tags in the format `A0000`, `A0001`, ...
///
/// The counter wraps instead of failing; tags only need to be unique among
/// the commands in flight at one time.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Tag::new(format!("{}{n:04}", self.prefix))
    }

    /// Returns the number of tags handed out since the last wrap.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}
