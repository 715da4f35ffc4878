//! Command pipelining (RFC 9051 Section 5.5).
//!
//! Commands move through three stages: queued (tagged, not yet written),
//! in flight (written, at least partly) and completed (tagged response seen,
//! waiting to be claimed by the caller). Completion is expected in FIFO
//! order; a completion for a younger command is accepted with a warning.
//!
//! A queued command is written while another is in flight only when
//! pipelining is enabled, the depth limit leaves room, both commands are
//! pipeline-safe and the previous one has been written completely (a
//! synchronizing literal blocks everything behind it).

use std::collections::VecDeque;

use super::command::Command;
use crate::config::EngineConfig;
use crate::types::Tag;

/// Queued, in-flight and completed commands of one engine.
#[derive(Debug, Default)]
pub(crate) struct Pipeline {
    enabled: bool,
    max_depth: usize,
    queue: VecDeque<Command>,
    in_flight: VecDeque<Command>,
    completed: Vec<Command>,
}

impl Pipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enabled: config.pipelining,
            max_depth: config.max_pipeline_depth.max(1),
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true if the next queued command may be written now.
    pub fn can_send_next(&self) -> bool {
        let Some(next) = self.queue.front() else {
            return false;
        };
        let Some(last) = self.in_flight.back() else {
            return true;
        };
        self.enabled
            && self.in_flight.len() < self.max_depth
            && last.is_fully_sent()
            && last.is_pipeline_safe()
            && next.is_pipeline_safe()
    }

    /// Moves the next queued command in flight and returns it for writing.
    pub fn start_next(&mut self) -> Option<&mut Command> {
        let command = self.queue.pop_front()?;
        self.in_flight.push_back(command);
        self.in_flight.back_mut()
    }

    /// The command whose untagged responses are being received.
    pub fn oldest_mut(&mut self) -> Option<&mut Command> {
        self.in_flight.front_mut()
    }

    pub fn oldest(&self) -> Option<&Command> {
        self.in_flight.front()
    }

    /// The in-flight command that announced a synchronizing literal.
    pub fn awaiting_continuation_mut(&mut self) -> Option<&mut Command> {
        self.in_flight
            .iter_mut()
            .find(|command| command.is_awaiting_continuation())
    }

    /// Moves the in-flight command tagged `text` to the completed list.
    pub fn complete(&mut self, text: &str) -> Option<&mut Command> {
        let pos = self
            .in_flight
            .iter()
            .position(|command| command.tag().is_some_and(|tag| tag.matches(text)))?;
        if pos != 0 {
            tracing::warn!(
                tag = text,
                expected = ?self.in_flight.front().and_then(Command::tag),
                "response arrived out of order"
            );
        }
        let command = self.in_flight.remove(pos)?;
        self.completed.push(command);
        self.completed.last_mut()
    }

    /// Hands a completed command back to its caller.
    pub fn take_completed(&mut self, tag: &Tag) -> Option<Command> {
        let pos = self
            .completed
            .iter()
            .position(|command| command.tag() == Some(tag))?;
        Some(self.completed.remove(pos))
    }

    /// Returns true if `tag` belongs to a command the caller has not
    /// claimed yet.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.queue
            .iter()
            .chain(&self.in_flight)
            .chain(&self.completed)
            .any(|command| command.tag() == Some(tag))
    }

    /// Removes every command, oldest first.
    pub fn drain(&mut self) -> Vec<Command> {
        self.in_flight
            .drain(..)
            .chain(self.queue.drain(..))
            .chain(self.completed.drain(..))
            .collect()
    }
}
