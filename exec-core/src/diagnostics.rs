//! JSON snapshot format shared between the demo binaries (which write it)
//! and the operator CLI (which reads it).
//!
//! A snapshot is a point-in-time dump of one execution service's metrics and
//! one portfolio's full position book. It is not a persistence format for
//! the running engine — just a handoff artifact so an operator tool can
//! inspect a process's state without attaching to it directly.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionMetricsSnapshot;
use crate::portfolio::Portfolio;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub taken_at: i64,
    pub execution: ExecutionMetricsSnapshot,
    pub portfolio: Portfolio,
}

impl EngineSnapshot {
    pub fn new(taken_at: i64, execution: ExecutionMetricsSnapshot, portfolio: Portfolio) -> Self {
        Self { taken_at, execution, portfolio }
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating snapshot file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).context("serializing engine snapshot")?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening snapshot file {}", path.display()))?;
        let snapshot = serde_json::from_reader(BufReader::new(file)).context("deserializing engine snapshot")?;
        Ok(snapshot)
    }
}
