use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning one input file into a decoded sheet.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file} is not a readable spreadsheet: {source}")]
    Decode {
        file: String,
        #[source]
        source: calamine::Error,
    },
    #[error("{file} contains no worksheet")]
    NoWorksheet { file: String },
}

/// The single failure surfaced for a batch; the first acquisition error
/// stops the remaining files.
#[derive(Debug, Error)]
#[error("failed to analyze grade reports: {0}")]
pub struct BatchError(#[from] pub AcquireError);
