//! Named summary scalars for monitoring a training session.
//!
//! Every loss-construction call and every training step records scalars such
//! as `Loss_aba`, `Loss_Visit` or `Loss_Total` under the current global step.
//! Records are kept in memory, mirrored to `tracing` at debug level, and can be
//! exported as JSON for plotting. Long runs should periodically
//! [`flush_jsonl`](SummaryWriter::flush_jsonl) (or [`drain`](SummaryWriter::drain))
//! so the in-memory buffer stays bounded.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::Result;

/// One recorded scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    /// Global step at which the value was recorded
    pub step: u64,
    /// Summary name, e.g. `Loss_Logit_3`
    pub name: String,
    /// Recorded value
    pub value: f64,
}

/// In-memory summary writer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryWriter {
    records: Vec<ScalarRecord>,
}

impl SummaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a named scalar at `step`
    pub fn scalar(&mut self, step: u64, name: impl Into<String>, value: f64) {
        let name = name.into();
        debug!(step, name = %name, value, "summary");
        self.records.push(ScalarRecord { step, name, value });
    }

    /// All records in insertion order
    pub fn records(&self) -> &[ScalarRecord] {
        &self.records
    }

    /// Most recent value recorded under `name`
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.records
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map(|r| r.value)
    }

    /// All `(step, value)` pairs recorded under `name`
    pub fn series(&self, name: &str) -> Vec<(u64, f64)> {
        self.records
            .iter()
            .filter(|r| r.name == name)
            .map(|r| (r.step, r.value))
            .collect()
    }

    /// Latest value of every scalar recorded at `step`
    pub fn at_step(&self, step: u64) -> BTreeMap<String, f64> {
        self.records
            .iter()
            .filter(|r| r.step == step)
            .map(|r| (r.name.clone(), r.value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record of `step`, returning how many were removed
    pub fn discard_step(&mut self, step: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.step != step);
        before - self.records.len()
    }

    /// Take all buffered records, leaving the writer empty
    pub fn drain(&mut self) -> Vec<ScalarRecord> {
        std::mem::take(&mut self.records)
    }

    /// Append the buffered records to a JSON Lines file and clear the buffer.
    ///
    /// Returns the number of records written.
    pub fn flush_jsonl(&mut self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let written = self.records.len();
        self.records.clear();
        debug!(records = written, path = %path.display(), "summaries flushed");
        Ok(written)
    }

    /// Write all records to a JSON file
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
