//! # Spreadsheet Export
//!
//! Writes a [`TableArtifact`](crate::models::TableArtifact) to a file. Export is
//! the last step of a successful iteration and is never retried.

pub mod writer;
pub mod xlsx;

pub use writer::SpreadsheetWriter;
pub use xlsx::XlsxSheetWriter;
