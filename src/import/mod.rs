//! Bulk data entry: territory names from CSV and photos from a directory or
//! an upload.

pub mod names;
pub mod photos;

use crate::core::TerritoryError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub use names::{NameRecord, decode_csv, import_names, import_names_file, parse_names};
pub use photos::{PHOTO_URL_PREFIX, PhotoStore, photo_extension};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV header is missing the '{0}' column")]
    MissingColumn(&'static str),

    #[error("CSV file is empty")]
    EmptyFile,

    #[error("Unsupported photo type '{0}' (expected .jpg, .jpeg or .png)")]
    UnsupportedFormat(String),

    #[error("Uploaded photo is empty")]
    EmptyUpload,

    #[error(transparent)]
    Territory(#[from] TerritoryError),
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A row or file that was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: Vec<Skipped>,
}

impl ImportSummary {
    pub(crate) fn skip(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(Skipped {
            source: source.into(),
            reason: reason.into(),
        });
    }
}
