//! Dataset acquisition and parsing
//!
//! - `networks`: CSV loader producing [`NetworkRecord`]s
//! - `update`: download-validate-install refresh of the local dataset

pub mod networks;
pub mod update;

pub use networks::{
    load_networks, parse_asn, parse_network, parse_networks, LoadReport, LoadedNetworks,
    NetworkRecord,
};
pub use update::{load_with_update, DatasetUpdater, UpdateSummary};
