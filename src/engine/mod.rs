//! Longest-prefix-match engine
//!
//! [`LookupEngine`] is built once from a record set and is immutable
//! afterwards, so it can be shared between threads without locking. Prefixes
//! live in an [`IpNetworkTable`], which keeps one tree per address family; an
//! IPv4 address never matches an IPv6 network and vice versa.
//!
//! Alongside the table the engine keeps an ASN index mapping every known ASN
//! to the records it announces. ASN 0 means "unknown" and is never indexed.

use crate::datasets::NetworkRecord;
use crate::error::{MaxlonError, Result};
use ip_network::{IpNetwork, Ipv4Network, Ipv6Network};
use ip_network_table::IpNetworkTable;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

/// Record counts for a built engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounts {
    /// Records held by the engine
    pub total_networks: usize,
    pub ipv4_networks: usize,
    pub ipv6_networks: usize,
    /// Distinct non-zero ASNs
    pub total_asn: usize,
    /// Records shadowed by an earlier record with the same prefix
    pub duplicates: usize,
}

/// Immutable prefix table plus ASN index
pub struct LookupEngine {
    records: Vec<NetworkRecord>,
    table: IpNetworkTable<u32>,
    asn_index: HashMap<u32, Vec<u32>>,
    counts: EngineCounts,
}

impl fmt::Debug for LookupEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupEngine")
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

fn to_table_network(network: IpNet) -> Result<IpNetwork> {
    let converted = match network {
        IpNet::V4(net) => {
            Ipv4Network::new_truncate(net.network(), net.prefix_len()).map(IpNetwork::from)
        }
        IpNet::V6(net) => {
            Ipv6Network::new_truncate(net.network(), net.prefix_len()).map(IpNetwork::from)
        }
    };
    converted.map_err(|e| MaxlonError::DatasetMalformed {
        path: Default::default(),
        reason: format!("invalid network {network}: {e}"),
    })
}

impl LookupEngine {
    /// Build the engine from a record set.
    ///
    /// When two records share the same prefix the one that appears first wins
    /// resolution. Both still show up in the ASN index for their own ASN.
    pub fn build(records: Vec<NetworkRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(MaxlonError::EmptyDataset);
        }
        if records.len() >= u32::MAX as usize {
            return Err(MaxlonError::DatasetMalformed {
                path: Default::default(),
                reason: format!("too many records: {}", records.len()),
            });
        }

        let mut table = IpNetworkTable::new();
        let mut asn_index: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut counts = EngineCounts::default();

        let mut records = records;
        for (idx, record) in records.iter_mut().enumerate() {
            record.network = record.network.trunc();
            let handle = idx as u32;

            match record.network {
                IpNet::V4(_) => counts.ipv4_networks += 1,
                IpNet::V6(_) => counts.ipv6_networks += 1,
            }

            // insert() replaces, so check first to keep the earliest record
            let network = to_table_network(record.network)?;
            if table.exact_match(network).is_some() {
                counts.duplicates += 1;
                debug!("duplicate prefix {} ignored for resolution", record.network);
            } else {
                table.insert(network, handle);
            }

            if record.asn != 0 {
                asn_index.entry(record.asn).or_default().push(handle);
            }
        }

        counts.total_networks = records.len();
        counts.total_asn = asn_index.len();

        info!(
            "engine built: {} networks ({} IPv4, {} IPv6), {} ASNs, {} duplicates",
            counts.total_networks,
            counts.ipv4_networks,
            counts.ipv6_networks,
            counts.total_asn,
            counts.duplicates
        );

        Ok(Self {
            records,
            table,
            asn_index,
            counts,
        })
    }

    /// Most specific record covering `addr`, if any
    pub fn resolve(&self, addr: IpAddr) -> Option<&NetworkRecord> {
        self.table
            .longest_match(addr)
            .map(|(_, handle)| &self.records[*handle as usize])
    }

    /// Record stored for exactly `network` (host bits are ignored)
    pub fn lookup_exact(&self, network: IpNet) -> Option<&NetworkRecord> {
        let network = to_table_network(network.trunc()).ok()?;
        self.table
            .exact_match(network)
            .map(|handle| &self.records[*handle as usize])
    }

    /// All records announced by `asn`, in dataset order.
    ///
    /// Empty for unknown ASNs and always empty for ASN 0.
    pub fn cidrs_for_asn(&self, asn: u32) -> Vec<&NetworkRecord> {
        match self.asn_index.get(&asn) {
            Some(handles) => handles
                .iter()
                .map(|handle| &self.records[*handle as usize])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether `asn` announces at least one network
    pub fn has_asn(&self, asn: u32) -> bool {
        self.asn_index.contains_key(&asn)
    }

    pub fn counts(&self) -> EngineCounts {
        self.counts
    }

    /// All records, in dataset order
    pub fn records(&self) -> &[NetworkRecord] {
        &self.records
    }
}
