//! Byte transports the engine can drive.
//!
//! The engine is written once, against tokio's [`AsyncRead`]/[`AsyncWrite`].
//! Blocking callers wrap a `std::io` stream in [`Blocking`], whose reads and
//! writes complete synchronously, and use the `*_blocking` entry points; those
//! run the same future to completion on the calling thread. Either way,
//! control can only suspend inside a transport read or write.

use std::future::Future;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A duplex byte stream usable as an IMAP transport.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> ImapStream for T {}

/// Type-erased transport owned by the tokenizer.
pub type BoxedStream = Box<dyn ImapStream>;

/// Adapter exposing a blocking `std::io` stream through the async traits.
///
/// Every poll performs the blocking call and returns `Ready`, so the engine's
/// futures never suspend when driven over this adapter. Non-blocking sockets
/// are not supported: a `WouldBlock` error is reported as-is.
#[derive(Debug)]
pub struct Blocking<S> {
    inner: S,
}

impl<S> Blocking<S> {
    /// Wraps a blocking stream.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns a reference to the wrapped stream.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwraps the adapter.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

impl<S: Read + Unpin> AsyncRead for Blocking<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = retry_interrupted(|| this.inner.read(buf.initialize_unfilled()))?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl<S: Write + Unpin> AsyncWrite for Blocking<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        Poll::Ready(retry_interrupted(|| this.inner.write(buf)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Poll::Ready(retry_interrupted(|| this.inner.flush()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

/// Runs a future to completion on the current thread.
///
/// Used by the blocking entry points. Driving a future that waits on a
/// tokio-registered socket this way blocks forever, so these entry points are
/// only meant for engines built over [`Blocking`] transports.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}
