//! In-memory server used by unit tests.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use crate::parser::Tokenizer;
use crate::transport::Blocking;

/// Scripted server: replays a fixed response buffer and records writes.
pub struct MockServer {
    input: Cursor<Vec<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl MockServer {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            output: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to everything the client writes.
    pub fn output(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.output)
    }

    pub const fn into_stream(self) -> Blocking<Self> {
        Blocking::new(self)
    }
}

impl Read for MockServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output
            .lock()
            .map_err(|_| io::Error::other("poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Tokenizer over a canned response.
pub fn tokens(input: &[u8]) -> Tokenizer {
    Tokenizer::new(MockServer::new(input).into_stream())
}
