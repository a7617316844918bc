use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::models::TableArtifact;

/// Persists a table and returns a reference to the written file
#[async_trait]
pub trait SpreadsheetWriter: Send + Sync {
    async fn write(
        &self,
        artifact: &TableArtifact,
        destination: &Path,
    ) -> Result<PathBuf, ExportError>;
}
