//! Labelled question sets.
//!
//! A dataset is a two-column CSV with a header row: the question, then the
//! expected answer. Column names are free; position decides.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MimirError, Result};

/// One labelled question. `id` is its 0-based position in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: usize,
    pub question: String,
    pub label: String,
}

/// Ordered, immutable question set replayed by every sweep configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Build from `(question, label)` pairs, numbering rows in order.
    pub fn from_pairs<I, Q, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Q, L)>,
        Q: Into<String>,
        L: Into<String>,
    {
        let rows = pairs
            .into_iter()
            .enumerate()
            .map(|(id, (question, label))| Row {
                id,
                question: question.into(),
                label: label.into(),
            })
            .collect();
        Self { rows }
    }

    /// Read a CSV file, keeping at most `limit` rows.
    pub fn from_csv_path(path: impl AsRef<Path>, limit: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MimirError::Dataset(format!("failed to open dataset {}: {e}", path.display()))
        })?;
        Self::from_reader(file, limit)
    }

    /// Read CSV from any reader, keeping at most `limit` rows.
    pub fn from_reader<R: Read>(reader: R, limit: Option<usize>) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?;
        if headers.len() != 2 {
            return Err(MimirError::Dataset(format!(
                "expected a header with 2 columns (question, label), found {}",
                headers.len()
            )));
        }

        let mut rows = Vec::new();
        for (id, record) in csv.records().enumerate() {
            if limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let record = record?;
            let (Some(question), Some(label)) = (record.get(0), record.get(1)) else {
                return Err(MimirError::Dataset(format!("row {id}: expected 2 columns")));
            };
            if question.is_empty() || label.is_empty() {
                return Err(MimirError::Dataset(format!(
                    "row {id}: question and label must be non-empty"
                )));
            }
            rows.push(Row {
                id,
                question: question.to_string(),
                label: label.to_string(),
            });
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
