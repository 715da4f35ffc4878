//! An engine shared between tasks.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::{Command, Engine};
use crate::Result;
use crate::types::Tag;

/// Cloneable handle to one [`Engine`].
///
/// Enqueueing holds the lock briefly; running holds it across the I/O, so
/// tasks take turns driving the connection. A task that finds its command
/// already completed by another task's run gets it back without I/O.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    /// Wraps `engine`.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// See [`Engine::enqueue`].
    ///
    /// # Errors
    ///
    /// See [`Engine::enqueue`].
    pub async fn enqueue(&self, command: Command) -> Result<Tag> {
        self.inner.lock().await.enqueue(command)
    }

    /// See [`Engine::run`].
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub async fn run(&self, tag: &Tag) -> Result<Command> {
        self.inner.lock().await.run(tag).await
    }

    /// See [`Engine::execute`].
    ///
    /// # Errors
    ///
    /// See [`Engine::execute`].
    pub async fn execute(&self, command: Command) -> Result<Command> {
        self.inner.lock().await.execute(command).await
    }

    /// Locks the engine for a sequence of calls.
    pub async fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::MockServer;

    #[tokio::test]
    async fn test_tasks_share_one_connection() {
        let server = MockServer::new(b"A0000 OK first\r\nA0001 OK second\r\n");
        let output = server.output();
        let shared = SharedEngine::new(Engine::new(server.into_stream(), EngineConfig::default()));

        let first = shared.enqueue(Command::builder("NOOP").build()).await.unwrap();
        let second = shared.enqueue(Command::builder("CHECK").build()).await.unwrap();

        let other = shared.clone();
        let handle = tokio::spawn(async move { other.run(&second).await });
        let first = shared.run(&first).await.unwrap();
        let second = handle.await.unwrap().unwrap();

        assert_eq!(first.text(), "first");
        assert_eq!(second.text(), "second");
        assert_eq!(
            output.lock().unwrap().as_slice(),
            b"A0000 NOOP\r\nA0001 CHECK\r\n"
        );
    }
}
