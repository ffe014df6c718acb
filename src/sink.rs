//! Consumers of published snapshots.

use std::io::Write;
use std::sync::Mutex;

use tracing::info;

use crate::snapshot::{fields, Snapshot};

/// Reads each fresh snapshot once. Must not hold on to it mutably; it is shared.
pub trait SnapshotSink: Send + Sync {
    fn consume(&self, snapshot: &Snapshot);
}

/// Logs every exposed field at `info`.
pub struct TracingSink {
    keys: Vec<&'static str>,
}

impl TracingSink {
    pub fn new(keys: Vec<&'static str>) -> Self {
        Self { keys }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(fields::ALL.to_vec())
    }
}

impl SnapshotSink for TracingSink {
    fn consume(&self, snapshot: &Snapshot) {
        for (key, value) in snapshot.exposed(&self.keys) {
            info!(target: "automower_ble_poll::snapshot", "{key} = {value}");
        }
    }
}

/// Writes each snapshot as one line of JSON.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> SnapshotSink for JsonLinesSink<W> {
    fn consume(&self, snapshot: &Snapshot) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let written = serde_json::to_writer(&mut *writer, snapshot)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(err) = written {
            tracing::warn!("failed to write snapshot: {err}");
        }
    }
}
