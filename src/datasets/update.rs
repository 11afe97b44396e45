//! Dataset refresh
//!
//! Downloads the upstream dataset, validates it with the loader and only then
//! replaces the local copy, so a failed or truncated download never clobbers a
//! working dataset.

use crate::config::MaxlonConfig;
use crate::datasets::networks::{load_networks, LoadedNetworks};
use crate::error::{MaxlonError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of a successful update
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    /// Where the dataset was written
    pub path: PathBuf,
    /// Number of records the new dataset yields
    pub records: usize,
    /// Bytes written to disk
    pub bytes: u64,
}

/// Refreshes the on-disk dataset from its configured source
pub struct DatasetUpdater {
    source: String,
    target: PathBuf,
}

impl DatasetUpdater {
    /// Create an updater for the configured source and dataset path
    pub fn new(config: &MaxlonConfig) -> Self {
        Self {
            source: config.dataset_source(),
            target: config.dataset_path.clone(),
        }
    }

    /// Create an updater for an explicit source (URL or local path)
    pub fn with_source(source: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Download, validate and install the dataset.
    ///
    /// Compressed sources are decompressed on the fly, the local copy is always
    /// plain CSV.
    pub fn update(&self) -> Result<UpdateSummary> {
        if let Some(parent) = self.target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let staging = staging_path(&self.target);
        info!("downloading dataset to {}", staging.display());

        let bytes = match self.download(&staging) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                return Err(e);
            }
        };

        let LoadedNetworks { records, .. } = match load_networks(&staging) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("downloaded dataset failed validation: {}", e);
                let _ = std::fs::remove_file(&staging);
                return Err(MaxlonError::DatasetUpdateFailed(format!(
                    "downloaded dataset is not usable: {e}"
                )));
            }
        };

        std::fs::rename(&staging, &self.target)?;
        info!(
            "dataset updated: {} records, {} bytes at {}",
            records.len(),
            bytes,
            self.target.display()
        );

        Ok(UpdateSummary {
            path: self.target.clone(),
            records: records.len(),
            bytes,
        })
    }

    fn download(&self, staging: &Path) -> Result<u64> {
        let mut reader = oneio::get_reader(&self.source).map_err(|e| {
            let source = redact(&self.source);
            MaxlonError::DatasetUpdateFailed(format!("unable to fetch {source}: {e}"))
        })?;

        let mut writer = BufWriter::new(File::create(staging)?);
        let bytes = std::io::copy(&mut reader, &mut writer).map_err(|e| {
            MaxlonError::DatasetUpdateFailed(format!("download interrupted: {e}"))
        })?;
        writer.flush()?;
        Ok(bytes)
    }
}

/// Temporary sibling of the target so the final rename stays on one filesystem
fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "networks.csv".into());
    name.push(".download");
    target.with_file_name(name)
}

/// Strip the query string so tokens never end up in logs
fn redact(source: &str) -> &str {
    source.split('?').next().unwrap_or(source)
}

/// Load the dataset, updating it once if the file is missing.
///
/// Malformed or empty datasets are returned unchanged; only a missing file
/// triggers the single update-and-retry.
pub fn load_with_update(config: &MaxlonConfig) -> Result<LoadedNetworks> {
    match load_networks(&config.dataset_path) {
        Err(e) if e.is_dataset_missing() => {
            warn!(
                "dataset {} not found, attempting update",
                config.dataset_path.display()
            );
            DatasetUpdater::new(config).update()?;
            load_networks(&config.dataset_path)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "network,asn\n8.8.8.0/24,15169\n";

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/data/networks.csv")),
            PathBuf::from("/data/networks.csv.download")
        );
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("https://example.com/a.csv?token=secret"),
            "https://example.com/a.csv"
        );
        assert_eq!(redact("/local/a.csv"), "/local/a.csv");
    }

    #[test]
    fn test_update_from_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upstream.csv");
        std::fs::write(&source, VALID).unwrap();
        let target = dir.path().join("data").join("networks.csv");

        let updater = DatasetUpdater::with_source(source.to_str().unwrap(), &target);
        let summary = updater.update().unwrap();

        assert_eq!(summary.records, 1);
        assert_eq!(summary.bytes, VALID.len() as u64);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), VALID);
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_invalid_download_keeps_existing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upstream.csv");
        std::fs::write(&source, "garbage without header\n").unwrap();
        let target = dir.path().join("networks.csv");
        std::fs::write(&target, VALID).unwrap();

        let updater = DatasetUpdater::with_source(source.to_str().unwrap(), &target);
        let err = updater.update().unwrap_err();

        assert!(matches!(err, MaxlonError::DatasetUpdateFailed(_)));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), VALID);
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_load_with_update_fetches_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upstream.csv");
        std::fs::write(&source, VALID).unwrap();

        let mut config = MaxlonConfig::with_data_dir(dir.path());
        config.dataset_url = source.to_str().unwrap().to_string();

        let loaded = load_with_update(&config).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(config.dataset_path.exists());
    }

    #[test]
    fn test_load_with_update_fails_when_update_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MaxlonConfig::with_data_dir(dir.path());
        config.dataset_url = dir.path().join("missing.csv").to_str().unwrap().to_string();

        let err = load_with_update(&config).unwrap_err();
        assert!(matches!(err, MaxlonError::DatasetUpdateFailed(_)));
    }

    #[test]
    fn test_load_with_update_does_not_retry_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MaxlonConfig::with_data_dir(dir.path());
        std::fs::write(&config.dataset_path, "network,asn\n").unwrap();
        // an update would fail loudly if attempted
        config.dataset_url = dir.path().join("missing.csv").to_str().unwrap().to_string();

        let err = load_with_update(&config).unwrap_err();
        assert!(matches!(err, MaxlonError::DatasetMalformed { .. }));
    }
}
