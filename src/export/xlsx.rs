//! Excel workbook writer backed by `rust_xlsxwriter`.

use async_trait::async_trait;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::writer::SpreadsheetWriter;
use crate::error::ExportError;
use crate::models::TableArtifact;

/// Writes one worksheet: a bold header row followed by typed cells
#[derive(Debug, Clone, Default)]
pub struct XlsxSheetWriter;

impl XlsxSheetWriter {
    pub fn new() -> Self {
        Self
    }

    fn write_blocking(artifact: &TableArtifact, destination: &Path) -> Result<(), ExportError> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let header = Format::new().set_bold();

        for (col, name) in artifact.columns().iter().enumerate() {
            worksheet
                .write_string_with_format(0, column_index(col)?, name, &header)
                .map_err(writer_error)?;
        }

        for (row, cells) in artifact.rows().iter().enumerate() {
            let row = u32::try_from(row + 1)
                .map_err(|_| ExportError::Writer(format!("row {row} out of range")))?;
            for (col, cell) in cells.iter().enumerate() {
                write_cell(worksheet, row, column_index(col)?, cell)?;
            }
        }

        workbook.save(destination).map_err(writer_error)
    }
}

fn column_index(col: usize) -> Result<u16, ExportError> {
    u16::try_from(col).map_err(|_| ExportError::Writer(format!("column {col} out of range")))
}

fn writer_error(err: XlsxError) -> ExportError {
    ExportError::Writer(err.to_string())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Value) -> Result<(), ExportError> {
    let result = match cell {
        Value::Null => return Ok(()),
        Value::Bool(flag) => worksheet.write_boolean(row, col, *flag),
        Value::Number(number) => match number.as_f64() {
            Some(n) => worksheet.write_number(row, col, n),
            None => worksheet.write_string(row, col, number.to_string()),
        },
        Value::String(text) => worksheet.write_string(row, col, text),
        other => worksheet.write_string(row, col, other.to_string()),
    };
    result.map(|_| ()).map_err(writer_error)
}

#[async_trait]
impl SpreadsheetWriter for XlsxSheetWriter {
    #[instrument(skip_all, fields(destination = %destination.display(), rows = artifact.row_count()))]
    async fn write(
        &self,
        artifact: &TableArtifact,
        destination: &Path,
    ) -> Result<PathBuf, ExportError> {
        let artifact = artifact.clone();
        let path = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            Self::write_blocking(&artifact, &path)?;
            debug!(path = %path.display(), "Workbook written");
            Ok(path)
        })
        .await
        .map_err(|e| ExportError::Writer(format!("writer task failed: {e}")))?
    }
}
