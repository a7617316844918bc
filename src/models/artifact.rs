//! Tabular result extracted from a successful code run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Structural problems that disqualify a table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArtifactError {
    #[error("table has no columns")]
    NoColumns,

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// A rectangular table of JSON scalars with a header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableArtifact {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TableArtifact {
    /// Build a table, rejecting anything that is not rectangular
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, ArtifactError> {
        if columns.is_empty() {
            return Err(ArtifactError::NoColumns);
        }
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(ArtifactError::RaggedRow {
                row,
                found: cells.len(),
                expected: columns.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// One-line description used as execution output
    pub fn summary(&self) -> String {
        format!(
            "DataFrame with {} rows x {} columns: {}",
            self.rows.len(),
            self.columns.len(),
            self.columns.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rectangular_tables_are_accepted() {
        let table = TableArtifact::new(
            vec!["name".into(), "qty".into()],
            vec![vec![json!("bolt"), json!(5)], vec![json!("nut"), json!(null)]],
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.summary(), "DataFrame with 2 rows x 2 columns: name, qty");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = TableArtifact::new(vec!["a".into(), "b".into()], vec![vec![json!(1)]])
            .unwrap_err();
        assert_eq!(
            err,
            ArtifactError::RaggedRow {
                row: 0,
                found: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn headerless_tables_are_rejected() {
        assert_eq!(
            TableArtifact::new(vec![], vec![]).unwrap_err(),
            ArtifactError::NoColumns
        );
    }
}
