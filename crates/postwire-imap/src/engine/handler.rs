//! Per-command handlers for untagged responses.

use std::any::Any;

use futures::future::BoxFuture;

use crate::Result;
use crate::parser::Tokenizer;
use crate::quirks::ServerQuirks;

/// Everything a handler needs to parse the rest of an untagged response.
///
/// The tokenizer is positioned just after the keyword. The engine skips
/// whatever the handler leaves on the line.
#[derive(Debug)]
pub struct Dispatch<'a> {
    /// Tokenizer over the connection.
    pub tokens: &'a mut Tokenizer,
    /// Grammar tolerances for this server.
    pub quirks: &'a ServerQuirks,
    /// Leading number (`* 3 FETCH`), if the response had one.
    pub number: Option<u32>,
    /// The keyword that selected the handler, as sent.
    pub keyword: &'a str,
}

/// Type-erasure helper so handlers can be recovered by concrete type after
/// the command completes.
pub trait AsAny: Any + Send {
    /// Borrows `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrows `self` as [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Converts a boxed `self` into a boxed [`Any`].
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Parses untagged responses on behalf of one command.
pub trait UntaggedHandler: AsAny {
    /// Parses one untagged response whose keyword this handler was
    /// registered for.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the connection.
    fn handle<'a>(&'a mut self, cx: Dispatch<'a>) -> BoxFuture<'a, Result<()>>;

    /// Called when the command is abandoned. Handlers release any storage
    /// they hold.
    fn abort(&mut self) {}
}

/// Handlers keyed by keyword, matched case-insensitively.
#[derive(Default)]
pub(crate) struct HandlerTable {
    entries: Vec<(String, Box<dyn UntaggedHandler>)>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(keyword, _)| keyword))
            .finish()
    }
}

impl HandlerTable {
    /// Registers `handler` for `keyword`, replacing any earlier one.
    pub fn insert(&mut self, keyword: &str, handler: Box<dyn UntaggedHandler>) {
        let keyword = keyword.to_ascii_uppercase();
        self.entries.retain(|(k, _)| *k != keyword);
        self.entries.push((keyword, handler));
    }

    pub fn get_mut(&mut self, keyword: &str) -> Option<&mut (dyn UntaggedHandler + 'static)> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
            .map(|(_, handler)| handler.as_mut())
    }

    pub fn get(&self, keyword: &str) -> Option<&(dyn UntaggedHandler + 'static)> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
            .map(|(_, handler)| handler.as_ref())
    }

    pub fn remove(&mut self, keyword: &str) -> Option<Box<dyn UntaggedHandler>> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(keyword))?;
        Some(self.entries.remove(index).1)
    }

    pub fn abort_all(&mut self) {
        for (_, handler) in &mut self.entries {
            handler.abort();
        }
    }
}
