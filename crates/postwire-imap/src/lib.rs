//! # postwire-imap
//!
//! The protocol core of an IMAP client (RFC 9051 `IMAP4rev2`, with RFC 3501
//! `IMAP4rev1` compatibility): a streaming tokenizer, a pipelined command
//! engine, FETCH summary and streaming section parsers, and the modified
//! UTF-7 mailbox-name codec.
//!
//! ## Features
//!
//! - **Streaming tokenizer**: literals are handed out in chunks and never
//!   buffered whole, so multi-megabyte bodies stream straight to storage
//! - **Pipelining**: independent commands are written back to back and
//!   completed in FIFO order
//! - **One implementation, two call styles**: every operation is async, and
//!   has a `*_blocking` twin that drives the same code over a `std::io` stream
//! - **Pluggable section storage**: memory or temp file by default, or any
//!   [`SinkFactory`] you provide
//! - **Server quirks**: a small, named list of tolerated deviations
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_imap::{Engine, EngineConfig, FetchRequest, MessageSet, UidSet};
//! use postwire_imap::summary::MessageSummaryItems;
//!
//! # async fn run(stream: tokio::net::TcpStream) -> postwire_imap::Result<()> {
//! let mut engine = Engine::new(stream, EngineConfig::default());
//!
//! let login = postwire_imap::Command::builder("LOGIN")
//!     .astring("user@example.com")
//!     .astring("secret")
//!     .build();
//! engine.execute(login).await?.check()?;
//!
//! let select = postwire_imap::Command::builder("SELECT").mailbox("INBOX").exclusive().build();
//! engine.execute(select).await?.check()?;
//!
//! let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::ENVELOPE);
//! let set = MessageSet::Uid(UidSet::parse("1:*").unwrap());
//! for summary in engine.fetch_summaries(&set, &request).await? {
//!     println!("{:?}", summary.envelope.as_ref().and_then(|e| e.subject.as_deref()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: command builder, pipeline and response dispatch
//! - [`parser`]: tokenizer and response parsers
//! - [`fetch`]: FETCH operations on the engine
//! - [`section`]: streamed section storage
//! - [`summary`]: per-message summary types
//! - [`unsolicited`]: callbacks for responses no command claimed
//! - [`utf7`]: modified UTF-7 mailbox names
//! - [`quirks`]: server-specific tolerances

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
mod error;
pub mod fetch;
pub mod header;
pub mod parser;
pub mod quirks;
pub mod section;
pub mod summary;
#[cfg(test)]
mod testing;
pub mod transport;
pub mod types;
pub mod unsolicited;
pub mod utf7;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{Command, CommandBuilder, Engine, SharedEngine, TagGenerator, UntaggedHandler};
pub use error::{Error, Result};
pub use fetch::{FetchOutcome, FetchRequest};
pub use header::{Header, HeaderList};
pub use parser::{StreamingHandler, SummaryHandler, Token, TokenKind, Tokenizer};
pub use quirks::{Quirks, ServerQuirks, ServerType};
pub use section::{
    DefaultSinkFactory, FetchContext, FetchEvent, Section, SectionKey, SectionStream, SinkFactory,
    TransferProgress,
};
pub use summary::{MessageSummary, MessageSummaryItems};
pub use transport::{Blocking, ImapStream};
pub use types::{
    Capabilities, Capability, Flag, Flags, LiteralMode, MessageId, MessageSet, ResponseCode,
    SeqNum, SequenceSet, Status, Tag, Uid, UidSet, UidValidity,
};
pub use unsolicited::{CollectingHandler, LoggingHandler, NoopHandler, UnsolicitedHandler};

/// IMAP protocol version spoken.
pub const IMAP_VERSION: &str = "IMAP4rev2";
