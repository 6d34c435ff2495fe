//! Append-only JSONL journal of committed store writes.
//!
//! Every committed transaction appends its writes here after the SQLite commit.
//! The journal is used to rebuild an empty database (e.g. after the `.db` file
//! was removed) and doubles as an audit trail of station activity.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of write recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalOp {
    Upsert,
    Delete,
}

/// One committed write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub table: String,
    pub op: JournalOp,
    pub key: String,
    #[serde(default)]
    pub record: serde_json::Value,
}

impl JournalEntry {
    pub fn upsert(table: &str, key: &str, record: serde_json::Value) -> Self {
        Self {
            table: table.to_string(),
            op: JournalOp::Upsert,
            key: key.to_string(),
            record,
        }
    }

    pub fn delete(table: &str, key: &str) -> Self {
        Self {
            table: table.to_string(),
            op: JournalOp::Delete,
            key: key.to_string(),
            record: serde_json::Value::Null,
        }
    }
}

/// JSONL journal file
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append committed entries, one JSON object per line
    pub fn append(&self, entries: &[JournalEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for entry in entries {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        Ok(())
    }

    /// Read every entry in order
    pub fn read_all(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}
