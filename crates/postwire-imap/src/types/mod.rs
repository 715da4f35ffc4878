//! Core IMAP types.
//!
//! Value types shared by the tokenizer, the parsers and the engine, following
//! RFC 9051 (`IMAP4rev2`) and RFC 3501 (`IMAP4rev1`).

mod capability;
mod flags;
mod identifiers;
mod response_code;
mod sequence;

pub use capability::{Capabilities, Capability, LiteralMode, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{MessageId, SeqNum, Tag, Uid, UidValidity};
pub use response_code::ResponseCode;
pub use sequence::{MessageSet, SequenceSet, UidSet};
