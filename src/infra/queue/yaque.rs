//! File-backed job queue inspired by Yaque.
//!
//! Undeleted messages are persisted as JSON lines in `<path>/<stream>.jsonl` after
//! every change. Messages that were in flight when the process stopped are
//! visible again on reopen, as if their visibility timeout had expired.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::memory::{Entry, QueueState};
use super::{AckSummary, JobQueue};
use crate::core::{GateError, QueueMessage};
use crate::runtime::api::BatchResponse;

fn backend(e: impl std::fmt::Display) -> GateError {
    GateError::Queue(e.to_string())
}

/// File-backed queue using JSON lines for durability.
pub struct YaqueJobQueue {
    path: PathBuf,
    stream: String,
    state: QueueState,
}

impl YaqueJobQueue {
    /// Open (or create) the queue `stream` under `path`.
    pub fn new(
        path: impl AsRef<Path>,
        stream: impl Into<String>,
        max_depth: usize,
        max_receive_count: Option<u32>,
    ) -> Result<Self, GateError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path).map_err(backend)?;
        let mut queue = Self {
            path,
            stream: stream.into(),
            state: QueueState::new(max_depth, max_receive_count),
        };
        queue.load_from_disk()?;
        Ok(queue)
    }

    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn dead_letter_path(&self) -> PathBuf {
        self.path.join(format!("{}.dlq.jsonl", self.stream))
    }

    fn load_from_disk(&mut self) -> Result<(), GateError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).open(&file_path).map_err(backend)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(backend)?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Entry = serde_json::from_str(&line).map_err(backend)?;
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.seq);
        self.state.next_seq = entries.last().map_or(0, |e| e.seq + 1);
        self.state.visible = entries.into();
        Ok(())
    }

    fn rewrite_disk(&self) -> Result<(), GateError> {
        let mut entries: Vec<&Entry> = self
            .state
            .visible
            .iter()
            .chain(self.state.in_flight.values())
            .collect();
        entries.sort_by_key(|e| e.seq);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path())
            .map_err(backend)?;
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(backend)?;
            writeln!(file, "{line}").map_err(backend)?;
        }
        Ok(())
    }

    fn append_dead_letters(&self, from: usize) -> Result<(), GateError> {
        let fresh = &self.state.dead_letters[from..];
        if fresh.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dead_letter_path())
            .map_err(backend)?;
        for message in fresh {
            let line = serde_json::to_string(message).map_err(backend)?;
            writeln!(file, "{line}").map_err(backend)?;
        }
        Ok(())
    }

    fn settle(&mut self, summary: AckSummary, dead_before: usize) -> Result<AckSummary, GateError> {
        self.append_dead_letters(dead_before)?;
        self.rewrite_disk()?;
        Ok(summary)
    }
}

impl JobQueue for YaqueJobQueue {
    fn send(&mut self, body: String, group_id: Option<String>) -> Result<QueueMessage, GateError> {
        let message = self.state.send(body, group_id)?;
        self.rewrite_disk()?;
        Ok(message)
    }

    fn receive(&mut self, max: usize) -> Result<Vec<QueueMessage>, GateError> {
        let batch = self.state.receive(max);
        if !batch.is_empty() {
            // Receive counts must survive a restart for dead-lettering to work.
            self.rewrite_disk()?;
        }
        Ok(batch)
    }

    fn acknowledge(
        &mut self,
        batch: &[QueueMessage],
        response: &BatchResponse,
    ) -> Result<AckSummary, GateError> {
        let dead_before = self.state.dead_letters.len();
        let summary = self.state.acknowledge(batch, response);
        self.settle(summary, dead_before)
    }

    fn abandon(&mut self, batch: &[QueueMessage]) -> Result<AckSummary, GateError> {
        let dead_before = self.state.dead_letters.len();
        let summary = self.state.abandon(batch);
        self.settle(summary, dead_before)
    }

    fn len(&self) -> usize {
        self.state.len()
    }
}
