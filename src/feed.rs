//! Remote feed reader: fetch, validate and normalize the registry dataset.
//!
//! The feed is a JSON array of `{name, description}` objects, several
//! megabytes at full size, so it goes through the fetch layer's disk-backed
//! mode. A copy of the last successfully parsed payload can be kept on disk;
//! when the remote is unreachable the reader serves that snapshot instead,
//! trading staleness for availability.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::fetch::{FetchError, Fetcher};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed unreachable: {0}")]
    Unreachable(#[from] FetchError),
    #[error("Feed returned no content")]
    Empty,
    #[error("Feed payload is not a JSON array of records: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("IO error reading feed snapshot: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// One record of the remote dataset, as published by the feed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reads the remote dataset through the fetch layer.
pub struct FeedReader {
    url: String,
    fetcher: Fetcher,
    snapshot_path: Option<PathBuf>,
}

impl FeedReader {
    pub fn new(url: String, fetcher: Fetcher, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            url,
            fetcher,
            snapshot_path,
        }
    }

    /// Fetch and parse the current record set.
    ///
    /// On a successful remote fetch the raw payload is persisted to the
    /// snapshot path (when configured). When the remote fetch fails, the
    /// snapshot is parsed instead and the staleness is logged; only when both
    /// fail does this return an error.
    pub fn fetch_records(&self) -> Result<Vec<RemoteRecord>, FeedError> {
        match self.fetch_remote() {
            Ok(records) => Ok(records),
            Err(e) => match &self.snapshot_path {
                Some(path) if path.exists() => {
                    tracing::warn!(
                        url = %self.url,
                        error = %e,
                        snapshot = %path.display(),
                        "Remote feed fetch failed, serving local snapshot (results may be stale)"
                    );
                    let bytes = std::fs::read(path)?;
                    parse_records(&bytes)
                }
                _ => Err(e),
            },
        }
    }

    fn fetch_remote(&self) -> Result<Vec<RemoteRecord>, FeedError> {
        let bytes = self.fetcher.fetch_via_disk(&self.url)?;
        let records = parse_records(&bytes)?;

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = write_snapshot(path, &bytes) {
                // A failed snapshot write only costs us the next fallback
                tracing::warn!(path = %path.display(), error = %e, "Failed to write feed snapshot");
            }
        }

        tracing::info!(url = %self.url, records = records.len(), "Fetched remote feed");
        Ok(records)
    }
}

/// Parse and validate a raw payload into the normalized record list.
///
/// Anything other than a JSON array is invalid; records without a name are
/// dropped before reconciliation ever sees them.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<RemoteRecord>, FeedError> {
    if bytes.is_empty() {
        return Err(FeedError::Empty);
    }
    let records: Vec<RemoteRecord> = serde_json::from_slice(bytes)?;
    Ok(records
        .into_iter()
        .filter(|r| !r.name.is_empty())
        .collect())
}

/// Write the snapshot via a sibling temp file and rename, so a crash mid-write
/// never leaves a truncated snapshot behind.
fn write_snapshot(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_feed() {
        let body = br#"[
            {"name": "serde", "description": "serialization framework"},
            {"name": "left-pad", "description": null},
            {"name": "tokio"}
        ]"#;
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "serde");
        assert_eq!(
            records[0].description.as_deref(),
            Some("serialization framework")
        );
        assert_eq!(records[1].description, None);
        assert_eq!(records[2].description, None);
    }

    #[test]
    fn test_parse_drops_nameless_records() {
        let body = br#"[{"name": "", "description": "x"}, {"description": "y"}, {"name": "ok"}]"#;
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_records(br#"{"name": "not-an-array"}"#),
            Err(FeedError::Invalid(_))
        ));
        assert!(matches!(
            parse_records(b"definitely not json"),
            Err(FeedError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(parse_records(b""), Err(FeedError::Empty)));
    }

    #[test]
    fn test_snapshot_write_is_atomic_rename() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache").join("feed.json");
        write_snapshot(&path, br#"[{"name":"a"}]"#).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
