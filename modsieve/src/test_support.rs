//! Test-only helpers for building prober streams and scripting prober runs.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use crate::core::codec::{
    ATTEMPT_END_MARKER, ATTEMPT_MARKER, BATCH_END_MARKER, STARTUP_MARKER,
};
use crate::io::prober::ProbeExecutor;

/// Builds well-formed (or deliberately truncated) prober streams.
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    buf: String,
}

impl StreamBuilder {
    /// Start a stream with the startup marker already emitted.
    pub fn new() -> Self {
        Self {
            buf: format!("{STARTUP_MARKER}\n"),
        }
    }

    /// Append a record for a module that loads cleanly.
    pub fn loadable(mut self, id: &str) -> Self {
        self.buf
            .push_str(&format!("{ATTEMPT_MARKER}\n{id}\n{ATTEMPT_END_MARKER}\n"));
        self
    }

    /// Append a record for a module the prober rejected while staying alive.
    pub fn forbidden(mut self, id: &str, error_text: &str) -> Self {
        self.buf.push_str(&format!(
            "{ATTEMPT_MARKER}\n{id}\n{error_text}\n{ATTEMPT_END_MARKER}\n"
        ));
        self
    }

    /// End the stream mid-record, as a prober death during `id` would.
    /// `partial_text` is appended verbatim with no terminator.
    pub fn crash(mut self, id: &str, partial_text: &str) -> String {
        self.buf
            .push_str(&format!("{ATTEMPT_MARKER}\n{id}\n{partial_text}"));
        self.buf
    }

    /// Terminate the batch cleanly.
    pub fn finish(mut self) -> String {
        self.buf.push_str(&format!("{BATCH_END_MARKER}\n"));
        self.buf
    }

    /// Return the stream without any terminator (death at a record boundary).
    pub fn truncate(self) -> String {
        self.buf
    }
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prober that replays canned streams and records the batches it was given.
///
/// Each `run` pops the next stream; running out of streams is an error so a
/// test fails loudly if the engine probes more often than scripted.
pub struct ScriptedProber {
    streams: RefCell<VecDeque<String>>,
    batches: RefCell<Vec<Vec<String>>>,
}

impl ScriptedProber {
    pub fn new(streams: Vec<String>) -> Self {
        Self {
            streams: RefCell::new(streams.into()),
            batches: RefCell::new(Vec::new()),
        }
    }

    /// Number of times the engine invoked the prober.
    pub fn invocations(&self) -> usize {
        self.batches.borrow().len()
    }

    /// Module ids of each submitted batch, in submission order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.borrow().clone()
    }
}

impl ProbeExecutor for ScriptedProber {
    fn run(&self, batch: &[(String, PathBuf)]) -> Result<String> {
        self.batches
            .borrow_mut()
            .push(batch.iter().map(|(id, _)| id.clone()).collect());
        self.streams
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted prober exhausted after {} runs", self.invocations()))
    }
}
