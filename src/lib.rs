#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Maxlon - resident IP-to-network lookup
//!
//! Maxlon maps IPv4 and IPv6 addresses to their most specific network block,
//! with country and AS metadata, and lists every CIDR announced by the
//! matched ASN. The dataset is parsed once and kept in memory by a daemon;
//! short-lived clients ask the daemon over a Unix socket or HTTP.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (always) | Dataset loading, engine, lookup service | `ipnet`, `csv`, `oneio`, `arc-swap` |
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `daemon` | Daemon session, IPC and HTTP front ends, client | `tokio`, `axum`, `libc` |
//! | `cli` | `maxlon` binary | All above + `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only: load a dataset and query it in-process
//! maxlon = { version = "0.1", default-features = false }
//!
//! # Embed the daemon without the CLI
//! maxlon = { version = "0.1", default-features = false, features = ["daemon"] }
//! ```
//!
//! # Architecture
//!
//! - **[`datasets`]**: CSV loader and dataset updater
//! - **[`engine`]**: longest-prefix table (one tree per family) plus the ASN index
//! - **[`lens`]**: `LookupService`, the engine behind an atomic swap
//! - **`server`**: daemon session, front ends and client (`daemon`, Unix only)
//! - **[`config`]**: configuration management
//! - **[`error`]**: the shared error type
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use maxlon::lens::lookup::LookupService;
//!
//! let service = LookupService::initialize("networks.csv".as_ref())?;
//! let result = service.lookup("8.8.8.8".parse()?);
//! if let Some(record) = result.record {
//!     println!("{} -> AS{} {}", record.network, record.asn, record.as_name);
//! }
//! for cidr in &result.asn_cidrs {
//!     println!("  {}", cidr);
//! }
//! ```

pub mod config;
pub mod datasets;
pub mod engine;
pub mod error;
pub mod lens;

// Daemon module - Unix sockets and signals
#[cfg(all(feature = "daemon", unix))]
pub mod server;

// =============================================================================
// Core re-exports (always available)
// =============================================================================

pub use config::{format_size, get_dataset_info, DatasetFileInfo, MaxlonConfig};
pub use datasets::{
    load_networks, load_with_update, DatasetUpdater, LoadReport, NetworkRecord, UpdateSummary,
};
pub use engine::{EngineCounts, LookupEngine};
pub use error::{MaxlonError, Result};
pub use lens::lookup::{LoadInfo, LookupResult, LookupService};
pub use lens::utils::OutputFormat;

// =============================================================================
// Daemon Module - requires "daemon" feature
// =============================================================================

#[cfg(all(feature = "daemon", unix))]
pub use server::{
    Daemon, DaemonClient, DaemonMarker, DaemonSession, DaemonState, ErrorCode, ErrorData,
    Request, Response, StatsSnapshot,
};
