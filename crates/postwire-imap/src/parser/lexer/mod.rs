//! Streaming IMAP tokenizer.
//!
//! [`Tokenizer`] owns the connection's transport and classifies the incoming
//! bytes into [`Token`]s on demand. Literal payloads are never buffered by the
//! tokenizer: after a [`TokenKind::Literal`] marker the caller streams the
//! payload with [`Tokenizer::read_literal_chunk`] or drops it with
//! [`Tokenizer::skip_literal`]; any payload left unread is drained before the
//! next token is scanned, so a literal of N bytes always consumes exactly N
//! bytes.

#![allow(clippy::missing_errors_doc)]

mod token;

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub use token::{Token, TokenKind, TokenValue};

use crate::config::{DEFAULT_MAX_LITERAL_SIZE, DEFAULT_READ_BUFFER};
use crate::transport::{BoxedStream, ImapStream, block_on};
use crate::{Error, Result};

/// Longest text line accepted by [`Tokenizer::read_text_line`].
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Tokenizer over the connection's byte stream.
pub struct Tokenizer {
    stream: BoxedStream,
    buf: BytesMut,
    read_size: usize,
    scratch: Vec<u8>,
    pushback: Option<Token>,
    literal_remaining: usize,
    max_literal: usize,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("buffered", &self.buf.len())
            .field("pushback", &self.pushback)
            .field("literal_remaining", &self.literal_remaining)
            .field("max_literal", &self.max_literal)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Creates a tokenizer over the given transport.
    pub fn new(stream: impl ImapStream + 'static) -> Self {
        Self::with_capacity(stream, DEFAULT_READ_BUFFER)
    }

    /// Creates a tokenizer with a specific read buffer size.
    pub fn with_capacity(stream: impl ImapStream + 'static, capacity: usize) -> Self {
        let read_size = capacity.max(64);
        Self {
            stream: Box::new(stream),
            buf: BytesMut::with_capacity(read_size),
            read_size,
            scratch: Vec::new(),
            pushback: None,
            literal_remaining: 0,
            max_literal: DEFAULT_MAX_LITERAL_SIZE,
            cancel: None,
        }
    }

    /// Installs the cancellation token sampled at every read and write.
    pub fn set_cancellation(&mut self, cancel: Option<CancellationToken>) {
        self.cancel = cancel;
    }

    /// Sets the largest literal [`Tokenizer::read_literal_to_end`] will buffer.
    pub fn set_max_literal_size(&mut self, bytes: usize) {
        self.max_literal = bytes;
    }

    /// Returns the number of payload bytes left in the current literal.
    #[must_use]
    pub const fn literal_remaining(&self) -> usize {
        self.literal_remaining
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Reads more bytes from the transport into the buffer.
    async fn fill(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.buf.reserve(self.read_size);
        let n = match self.cancel.clone() {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    read = self.stream.read_buf(&mut self.buf) => read?,
                }
            }
            None => self.stream.read_buf(&mut self.buf).await?,
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )
            .into());
        }
        tracing::trace!(bytes = n, "read from transport");
        Ok(())
    }

    async fn peek_byte(&mut self) -> Result<u8> {
        if self.buf.is_empty() {
            self.fill().await?;
        }
        Ok(self.buf[0])
    }

    async fn next_byte(&mut self) -> Result<u8> {
        let byte = self.peek_byte().await?;
        self.buf.advance(1);
        Ok(byte)
    }

    /// Returns the next token without consuming it.
    pub async fn peek_token(&mut self) -> Result<&Token> {
        let token = match self.pushback.take() {
            Some(token) => token,
            None => self.read_token().await?,
        };
        Ok(self.pushback.insert(token))
    }

    /// Pushes a token back so the next read returns it.
    ///
    /// Only one token of pushback exists; pushing back twice without an
    /// intervening read is a bug in the caller.
    pub fn unget(&mut self, token: Token) {
        debug_assert!(self.pushback.is_none(), "only one token of pushback");
        self.pushback = Some(token);
    }

    /// Reads and consumes the next token.
    pub async fn read_token(&mut self) -> Result<Token> {
        if let Some(token) = self.pushback.take() {
            return Ok(token);
        }
        if self.literal_remaining > 0 {
            tracing::trace!(
                bytes = self.literal_remaining,
                "draining unread literal payload"
            );
            self.skip_literal().await?;
        }

        let byte = loop {
            let byte = self.peek_byte().await?;
            if matches!(byte, b' ' | b'\t' | b'\r') {
                self.buf.advance(1);
            } else {
                break byte;
            }
        };

        let token = match byte {
            b'\n' => self.punct(Token::EOLN),
            b'(' => self.punct(Token::OPEN_PAREN),
            b')' => self.punct(Token::CLOSE_PAREN),
            b'[' => self.punct(Token::OPEN_BRACKET),
            b']' => self.punct(Token::CLOSE_BRACKET),
            b'"' => self.read_quoted().await?,
            b'{' => self.read_literal_marker().await?,
            b'\\' => self.read_flag().await?,
            b'~' => {
                // literal8 (`~{n}`) from BINARY fetches
                self.buf.advance(1);
                if self.peek_byte().await? == b'{' {
                    self.read_literal_marker().await?
                } else {
                    self.read_atom(byte).await?
                }
            }
            b'*' | b'+' => {
                self.buf.advance(1);
                if is_atom_char(self.peek_byte().await?) {
                    self.read_atom(byte).await?
                } else if byte == b'*' {
                    Token::ASTERISK
                } else {
                    Token::PLUS
                }
            }
            _ if is_atom_char(byte) => self.read_atom_from_buffer().await?,
            _ => {
                return Err(Error::protocol(
                    "reading token",
                    format!("unexpected byte {byte:#04x}"),
                ));
            }
        };
        tracing::trace!(token = %token, "token");
        Ok(token)
    }

    fn punct(&mut self, token: Token) -> Token {
        self.buf.advance(1);
        token
    }

    /// Collects atom characters into the scratch buffer.
    async fn collect_atom_chars(&mut self, scratch: &mut Vec<u8>) -> Result<()> {
        loop {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let n = self
                .buf
                .iter()
                .position(|&b| !is_atom_char(b))
                .unwrap_or(self.buf.len());
            scratch.extend_from_slice(&self.buf[..n]);
            self.buf.advance(n);
            if !self.buf.is_empty() {
                return Ok(());
            }
        }
    }

    async fn read_atom_from_buffer(&mut self) -> Result<Token> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let result = self.collect_atom_chars(&mut scratch).await;
        let token = result.map(|()| Token::from_atom_bytes(&scratch, || decode_text(&scratch)));
        self.scratch = scratch;
        token
    }

    async fn read_atom(&mut self, first: u8) -> Result<Token> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.push(first);
        let result = self.collect_atom_chars(&mut scratch).await;
        let token = result.map(|()| Token::from_atom_bytes(&scratch, || decode_text(&scratch)));
        self.scratch = scratch;
        token
    }

    async fn read_flag(&mut self) -> Result<Token> {
        self.buf.advance(1);
        if self.peek_byte().await? == b'*' {
            self.buf.advance(1);
            return Ok(Token::flag("\\*"));
        }
        let mut name = vec![b'\\'];
        self.collect_atom_chars(&mut name).await?;
        if name.len() == 1 {
            return Err(Error::protocol("reading flag", "empty flag name"));
        }
        Ok(Token::flag(&decode_text(&name)))
    }

    async fn read_quoted(&mut self) -> Result<Token> {
        const CONTEXT: &str = "reading quoted string";
        self.buf.advance(1);
        let mut bytes = Vec::new();
        loop {
            match self.next_byte().await? {
                b'"' => break,
                b'\\' => match self.next_byte().await? {
                    c @ (b'"' | b'\\') => bytes.push(c),
                    c => {
                        return Err(Error::protocol(
                            CONTEXT,
                            format!("invalid escape \\{}", char::from(c)),
                        ));
                    }
                },
                b'\r' | b'\n' => {
                    return Err(Error::protocol(CONTEXT, "unterminated quoted string"));
                }
                0 => return Err(Error::protocol(CONTEXT, "NUL byte in quoted string")),
                c => bytes.push(c),
            }
        }
        Ok(Token::qstring(decode_text(&bytes)))
    }

    async fn read_literal_marker(&mut self) -> Result<Token> {
        const CONTEXT: &str = "reading literal length";
        self.buf.advance(1);
        let mut len: usize = 0;
        let mut digits = 0;
        let terminator = loop {
            let byte = self.next_byte().await?;
            match byte {
                b'0'..=b'9' => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(byte - b'0')))
                        .ok_or_else(|| Error::protocol(CONTEXT, "literal length overflows"))?;
                    digits += 1;
                }
                b'+' | b'}' => break byte,
                _ => {
                    return Err(Error::protocol(
                        CONTEXT,
                        format!("unexpected byte {byte:#04x} in literal length"),
                    ));
                }
            }
        };
        if digits == 0 {
            return Err(Error::protocol(CONTEXT, "missing literal length"));
        }
        if terminator == b'+' && self.next_byte().await? != b'}' {
            return Err(Error::protocol(CONTEXT, "expected '}' after '+'"));
        }
        match self.next_byte().await? {
            b'\r' if self.next_byte().await? == b'\n' => {}
            b'\n' => {}
            _ => return Err(Error::protocol(CONTEXT, "expected CRLF after literal length")),
        }
        self.literal_remaining = len;
        Ok(Token::literal(len))
    }

    /// Reads up to `max` bytes of the current literal's payload.
    ///
    /// Returns an empty buffer once the literal is exhausted.
    pub async fn read_literal_chunk(&mut self, max: usize) -> Result<Bytes> {
        if self.literal_remaining == 0 || max == 0 {
            return Ok(Bytes::new());
        }
        if self.buf.is_empty() {
            self.fill().await?;
        }
        let n = max.min(self.literal_remaining).min(self.buf.len());
        self.literal_remaining -= n;
        Ok(self.buf.split_to(n).freeze())
    }

    /// Copies payload bytes of the current literal into `out`.
    ///
    /// Returns the number of bytes copied, zero once the literal is exhausted.
    pub async fn read_literal(&mut self, out: &mut [u8]) -> Result<usize> {
        let chunk = self.read_literal_chunk(out.len()).await?;
        out[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    /// Reads the remainder of the current literal into memory.
    ///
    /// Literals longer than the configured maximum are rejected before any
    /// payload is read; the tokenizer then drains them like any unread literal.
    pub async fn read_literal_to_end(&mut self) -> Result<Vec<u8>> {
        if self.literal_remaining > self.max_literal {
            return Err(Error::protocol(
                "reading literal",
                format!(
                    "literal of {} bytes exceeds the {} byte limit",
                    self.literal_remaining, self.max_literal
                ),
            ));
        }
        let step = self.literal_remaining.min(self.read_size);
        let mut data = Vec::with_capacity(step);
        let mut chunk = vec![0; step];
        loop {
            let n = self.read_literal(&mut chunk).await?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&chunk[..n]);
        }
    }

    /// Discards the remainder of the current literal.
    pub async fn skip_literal(&mut self) -> Result<()> {
        while self.literal_remaining > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let n = self.literal_remaining.min(self.buf.len());
            self.buf.advance(n);
            self.literal_remaining -= n;
        }
        Ok(())
    }

    /// Reads the rest of the current line as human-readable text.
    ///
    /// Leading spaces and the line terminator are stripped. A pushed-back
    /// token is rendered back into the text.
    pub async fn read_text_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        if let Some(token) = self.pushback.take() {
            if token.is(TokenKind::Eoln) {
                return Ok(String::new());
            }
            line.extend_from_slice(token.to_string().as_bytes());
        }
        if self.literal_remaining > 0 {
            self.skip_literal().await?;
        }
        loop {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&self.buf[..pos]);
                self.buf.advance(pos + 1);
                break;
            }
            line.extend_from_slice(&self.buf);
            self.buf.clear();
            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::protocol("reading response text", "line too long"));
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let start = line.iter().position(|&b| b != b' ').unwrap_or(line.len());
        Ok(decode_text(&line[start..]))
    }

    /// Skips spaces and reports whether a bracketed response code follows.
    ///
    /// Response text is free-form, so this inspects the raw byte instead of
    /// tokenizing it.
    pub async fn at_response_code(&mut self) -> Result<bool> {
        if let Some(token) = &self.pushback {
            return Ok(token.is(TokenKind::OpenBracket));
        }
        loop {
            match self.peek_byte().await? {
                b' ' => self.buf.advance(1),
                byte => return Ok(byte == b'['),
            }
        }
    }

    /// Consumes tokens up to and including the end of the current line.
    pub async fn skip_line(&mut self) -> Result<()> {
        loop {
            if self.read_token().await?.is(TokenKind::Eoln) {
                return Ok(());
            }
        }
    }

    /// Writes bytes to the transport.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.check_cancelled()?;
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Flushes the transport.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Blocking variant of [`Tokenizer::read_token`].
    pub fn read_token_blocking(&mut self) -> Result<Token> {
        block_on(self.read_token())
    }

    /// Blocking variant of [`Tokenizer::peek_token`].
    pub fn peek_token_blocking(&mut self) -> Result<Token> {
        block_on(self.peek_token()).cloned()
    }
}

/// Decodes wire text as UTF-8, falling back to Latin-1 byte-for-byte.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    std::str::from_utf8(bytes).map_or_else(
        |_| bytes.iter().copied().map(char::from).collect(),
        str::to_owned,
    )
}

/// Returns true if the byte may appear inside an atom.
///
/// Parentheses, braces, brackets, quotes, backslash, space and control
/// characters delimit atoms. `%` and `*` are accepted inside atoms, and so
/// are 8-bit bytes, which servers with UTF-8 support send unquoted.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    match b {
        b'(' | b')' | b'{' | b'"' | b'\\' | b'[' | b']' => false,
        0x21..=0x7E | 0x80..=0xFF => true,
        _ => false,
    }
}
