use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::error::{AcquireError, BatchError};
use crate::models::{CombinedDataset, ParsedFile};
use crate::normalize::normalize_file;
use crate::sheet::decode_sheet;

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads, decodes and normalizes every file, one at a time and in the given
/// order. The first file that cannot be read or decoded aborts the batch.
pub async fn load_files(paths: &[PathBuf]) -> Result<Vec<ParsedFile>, BatchError> {
    let mut parsed: Vec<ParsedFile> = Vec::with_capacity(paths.len());

    for path in paths {
        let file_name = file_name_of(path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AcquireError::Read {
                path: path.clone(),
                source,
            })?;
        info!(file = %file_name, bytes = bytes.len(), "read grade report");

        let sheet = decode_sheet(&file_name, bytes)?;
        let model = normalize_file(&file_name, &sheet);
        keep_latest(&mut parsed, model);
    }

    Ok(parsed)
}

/// One model per file name: a repeated name replaces the earlier model in
/// its original position.
fn keep_latest(parsed: &mut Vec<ParsedFile>, model: ParsedFile) {
    match parsed.iter_mut().find(|f| f.file_name == model.file_name) {
        Some(existing) => {
            warn!(file = %model.file_name, "file name seen twice, keeping the later file");
            *existing = model;
        }
        None => parsed.push(model),
    }
}

pub async fn analyze_files(paths: &[PathBuf]) -> Result<CombinedDataset, BatchError> {
    let parsed = load_files(paths).await?;
    Ok(aggregate(&parsed))
}
