//! IMAP response parsing.
//!
//! Everything here reads from a [`Tokenizer`] that owns the connection, so
//! parsing and I/O interleave: a parser pulls tokens as it needs them and
//! streams literal payloads instead of waiting for a whole response.
//!
//! # Architecture
//!
//! - **Tokenizer** ([`lexer`]): classifies bytes into atoms, strings,
//!   numbers, literals and delimiters
//! - **Summary parser**: folds FETCH items into a
//!   [`MessageSummary`](crate::summary::MessageSummary)
//! - **Streaming handler**: writes `BODY[...]`/`BINARY[...]` payloads into a
//!   [`FetchContext`](crate::section::FetchContext) chunk by chunk
//!
//! # Example
//!
//! ```
//! use postwire_imap::parser::{Tokenizer, TokenKind};
//! use postwire_imap::transport::Blocking;
//!
//! let stream = Blocking::new(std::io::Cursor::new(b"* 3 EXISTS\r\n".to_vec()));
//! let mut tokens = Tokenizer::new(stream);
//! assert_eq!(tokens.read_token_blocking().unwrap().kind(), TokenKind::Asterisk);
//! assert_eq!(tokens.read_token_blocking().unwrap().text(), Some("3"));
//! assert!(tokens.read_token_blocking().unwrap().is_atom("EXISTS"));
//! ```

pub(crate) mod body;
pub(crate) mod helpers;
pub mod lexer;
pub mod section;
pub(crate) mod skip;
pub(crate) mod status;
mod streaming;
pub(crate) mod summary;

pub use lexer::{Token, TokenKind, TokenValue, Tokenizer};
pub use section::SectionSpec;
pub use streaming::StreamingHandler;
pub use summary::{SummaryCallback, SummaryHandler, read_fetch_items};
