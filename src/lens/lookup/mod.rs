//! IP lookup lens
//!
//! [`LookupService`] owns the current [`LookupEngine`] behind an [`ArcSwap`].
//! Readers grab a snapshot without locking; a reload builds a complete new
//! engine off to the side and publishes it with a single pointer swap, so any
//! given lookup sees either the old dataset or the new one in full.
//!
//! # Example
//!
//! ```rust,ignore
//! use maxlon::lens::lookup::LookupService;
//!
//! let service = LookupService::initialize("networks.csv".as_ref())?;
//! let result = service.lookup("8.8.8.8".parse()?);
//! if let Some(record) = &result.record {
//!     println!("{} AS{} ({} CIDRs)", record.network, record.asn, result.asn_cidrs.len());
//! }
//! ```

use crate::config::MaxlonConfig;
use crate::datasets::{load_networks, load_with_update, LoadReport, LoadedNetworks, NetworkRecord};
use crate::engine::{EngineCounts, LookupEngine};
use crate::error::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// =============================================================================
// Types
// =============================================================================

/// One built engine plus the metadata of the load that produced it
#[derive(Debug)]
pub struct LoadedDataset {
    engine: LookupEngine,
    path: PathBuf,
    loaded_at: DateTime<Utc>,
    load_time: Duration,
    report: LoadReport,
}

impl LoadedDataset {
    fn build(path: &Path, loaded: LoadedNetworks, started: Instant) -> Result<Self> {
        let LoadedNetworks { records, report } = loaded;
        let engine = LookupEngine::build(records)?;
        Ok(Self {
            engine,
            path: path.to_path_buf(),
            loaded_at: Utc::now(),
            load_time: started.elapsed(),
            report,
        })
    }

    pub fn engine(&self) -> &LookupEngine {
        &self.engine
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    pub fn info(&self) -> LoadInfo {
        LoadInfo {
            path: self.path.clone(),
            loaded_at: self.loaded_at,
            load_time: self.load_time.as_secs_f64(),
            counts: self.engine.counts(),
            report: self.report,
        }
    }
}

/// Metadata about the dataset currently served
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadInfo {
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    /// Seconds spent reading and indexing the dataset
    pub load_time: f64,
    pub counts: EngineCounts,
    pub report: LoadReport,
}

/// Answer to a single address lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupResult {
    /// Address as queried
    pub ip: IpAddr,
    /// Most specific covering network, `None` when nothing matches
    pub record: Option<NetworkRecord>,
    /// Every network announced by the matched record's ASN
    pub asn_cidrs: Vec<IpNet>,
    /// Seconds spent answering
    pub query_time: f64,
}

impl LookupResult {
    pub fn is_match(&self) -> bool {
        self.record.is_some()
    }
}

// =============================================================================
// Lens
// =============================================================================

/// Shared lookup entry point for the daemon front ends and standalone mode
#[derive(Debug)]
pub struct LookupService {
    current: ArcSwap<LoadedDataset>,
    dataset_path: PathBuf,
    reload_lock: Mutex<()>,
}

impl LookupService {
    /// Load the dataset at `path` and build the engine.
    ///
    /// Dataset errors are returned unchanged so the caller decides whether an
    /// update is worth trying.
    pub fn initialize(path: &Path) -> Result<Self> {
        let started = Instant::now();
        let loaded = load_networks(path)?;
        let dataset = LoadedDataset::build(path, loaded, started)?;
        Ok(Self::from_dataset(dataset))
    }

    /// Load the configured dataset, fetching it once if it is missing
    pub fn from_config(config: &MaxlonConfig) -> Result<Self> {
        let started = Instant::now();
        let loaded = load_with_update(config)?;
        let dataset = LoadedDataset::build(&config.dataset_path, loaded, started)?;
        Ok(Self::from_dataset(dataset))
    }

    /// Build a service over records already in memory
    pub fn from_records(records: Vec<NetworkRecord>) -> Result<Self> {
        let started = Instant::now();
        let report = LoadReport {
            rows: records.len(),
            ..Default::default()
        };
        let loaded = LoadedNetworks { records, report };
        let dataset = LoadedDataset::build(Path::new(""), loaded, started)?;
        Ok(Self::from_dataset(dataset))
    }

    fn from_dataset(dataset: LoadedDataset) -> Self {
        info!(
            "lookup service ready: {} networks loaded in {:.2}s",
            dataset.engine.counts().total_networks,
            dataset.load_time.as_secs_f64()
        );
        Self {
            dataset_path: dataset.path.clone(),
            current: ArcSwap::from_pointee(dataset),
            reload_lock: Mutex::new(()),
        }
    }

    /// Current dataset; hold on to it to run several queries against one view
    pub fn snapshot(&self) -> Arc<LoadedDataset> {
        self.current.load_full()
    }

    /// Most specific record covering `ip`
    pub fn find_matching_record(&self, ip: IpAddr) -> Option<NetworkRecord> {
        self.current.load().engine.resolve(ip).cloned()
    }

    /// Every record announced by `asn`; empty for unknown ASNs and ASN 0
    pub fn get_asn_cidrs(&self, asn: u32) -> Vec<NetworkRecord> {
        self.current
            .load()
            .engine
            .cidrs_for_asn(asn)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Resolve `ip` and collect its ASN's networks from the same dataset
    pub fn lookup(&self, ip: IpAddr) -> LookupResult {
        let started = Instant::now();
        let dataset = self.current.load();

        let record = dataset.engine.resolve(ip).cloned();
        let asn_cidrs = match &record {
            Some(r) => dataset
                .engine
                .cidrs_for_asn(r.asn)
                .iter()
                .map(|c| c.network)
                .collect(),
            None => Vec::new(),
        };

        let elapsed = started.elapsed();
        debug!(
            "lookup {} -> {:?} in {}µs",
            ip,
            record.as_ref().map(|r| r.network),
            elapsed.as_micros()
        );

        LookupResult {
            ip,
            record,
            asn_cidrs,
            query_time: elapsed.as_secs_f64(),
        }
    }

    pub fn load_info(&self) -> LoadInfo {
        self.current.load().info()
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Rebuild from the dataset path the service was created with
    pub fn reload(&self) -> Result<LoadInfo> {
        let path = self.dataset_path.clone();
        self.reload_from(&path)
    }

    /// Rebuild from `path` and swap the new engine in.
    ///
    /// On failure the current dataset keeps serving untouched.
    pub fn reload_from(&self, path: &Path) -> Result<LoadInfo> {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let started = Instant::now();
        let loaded = load_networks(path)?;
        let dataset = LoadedDataset::build(path, loaded, started)?;
        let info = dataset.info();

        self.current.store(Arc::new(dataset));
        info!(
            "dataset reloaded from {}: {} networks in {:.2}s",
            path.display(),
            info.counts.total_networks,
            info.load_time
        );
        Ok(info)
    }
}
