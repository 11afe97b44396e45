//! Network dataset loader
//!
//! Parses a tabular (CSV) network registry file into [`NetworkRecord`]s. The
//! file must carry a header row; columns are located by name so the common
//! registry exports (`network,country,country_code,continent,continent_code,
//! asn,as_name,as_domain` and friends) load without configuration.
//!
//! Individual malformed rows are skipped with a warning. The load only fails
//! when the file is missing, has no usable header, or yields no record at all.

use crate::error::{MaxlonError, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

/// Number of skipped rows reported individually before summarizing
const MAX_ROW_WARNINGS: usize = 10;

/// One row of the network dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct NetworkRecord {
    /// Network prefix, host bits always zero
    pub network: IpNet,
    /// Owning autonomous system, 0 when unknown
    pub asn: u32,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub continent_code: String,
    #[serde(default)]
    pub continent_name: String,
    #[serde(default)]
    pub as_name: String,
    #[serde(default)]
    pub as_domain: String,
}

impl NetworkRecord {
    /// Create a record with only the network and ASN set
    pub fn new(network: IpNet, asn: u32) -> Self {
        Self {
            network: network.trunc(),
            asn,
            country_code: String::new(),
            country_name: String::new(),
            continent_code: String::new(),
            continent_name: String::new(),
            as_name: String::new(),
            as_domain: String::new(),
        }
    }

    /// Set the country code and name
    pub fn with_country(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.country_code = code.into();
        self.country_name = name.into();
        self
    }

    pub fn prefix(&self) -> IpAddr {
        self.network.network()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.network, IpNet::V4(_))
    }

    /// Whether the record carries a known ASN
    pub fn has_asn(&self) -> bool {
        self.asn != 0
    }
}

/// Summary of a dataset load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Data rows seen (header excluded)
    pub rows: usize,
    /// Rows dropped because they could not be parsed
    pub skipped: usize,
    /// Rows whose prefix had host bits set and was truncated
    pub normalized: usize,
}

/// Records parsed from a dataset plus the load summary
#[derive(Debug, Clone)]
pub struct LoadedNetworks {
    pub records: Vec<NetworkRecord>,
    pub report: LoadReport,
}

/// Load the dataset at `path`.
///
/// Gzip-compressed files (`.gz`) are decompressed transparently.
pub fn load_networks(path: &Path) -> Result<LoadedNetworks> {
    if !path.exists() {
        return Err(MaxlonError::DatasetNotFound(path.to_path_buf()));
    }

    let path_str = path.to_str().ok_or_else(|| MaxlonError::DatasetMalformed {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })?;
    let reader = oneio::get_reader(path_str).map_err(|e| MaxlonError::DatasetMalformed {
        path: path.to_path_buf(),
        reason: format!("unable to open: {e}"),
    })?;

    let loaded = parse_networks(reader, path)?;
    info!(
        "loaded {} networks from {} ({} rows, {} skipped, {} normalized)",
        loaded.records.len(),
        path.display(),
        loaded.report.rows,
        loaded.report.skipped,
        loaded.report.normalized
    );
    Ok(loaded)
}

/// Parse dataset content from any reader; `source` is only used for messages.
pub fn parse_networks<R: Read>(reader: R, source: &Path) -> Result<LoadedNetworks> {
    let malformed = |reason: String| MaxlonError::DatasetMalformed {
        path: source.to_path_buf(),
        reason,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| malformed(format!("unreadable header: {e}")))?
        .clone();
    let columns = ColumnMap::from_headers(&headers)
        .ok_or_else(|| malformed("header has no network/cidr/prefix column".to_string()))?;

    let mut records = Vec::new();
    let mut report = LoadReport::default();

    for (i, row) in csv_reader.records().enumerate() {
        report.rows += 1;
        // header is line 1
        let line = i + 2;

        let parsed = row
            .map_err(|e| e.to_string())
            .and_then(|row| columns.parse_row(&row));

        match parsed {
            Ok((record, normalized)) => {
                if normalized {
                    report.normalized += 1;
                }
                records.push(record);
            }
            Err(reason) => {
                report.skipped += 1;
                if report.skipped <= MAX_ROW_WARNINGS {
                    warn!("skipping line {} of {}: {}", line, source.display(), reason);
                }
            }
        }
    }

    if report.skipped > MAX_ROW_WARNINGS {
        warn!(
            "skipped {} malformed rows in {} ({} not shown)",
            report.skipped,
            source.display(),
            report.skipped - MAX_ROW_WARNINGS
        );
    }

    if report.rows == 0 {
        return Err(malformed("file contains no data rows".to_string()));
    }
    if records.is_empty() {
        return Err(malformed(format!(
            "none of the {} rows could be parsed",
            report.rows
        )));
    }

    Ok(LoadedNetworks { records, report })
}

/// Column positions resolved from the header row
#[derive(Debug, Default)]
struct ColumnMap {
    network: usize,
    asn: Option<usize>,
    country_code: Option<usize>,
    country_name: Option<usize>,
    continent_code: Option<usize>,
    continent_name: Option<usize>,
    as_name: Option<usize>,
    as_domain: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Option<Self> {
        let find = |aliases: &[&str]| {
            headers.iter().position(|h| {
                let h = h.trim().to_lowercase();
                aliases.iter().any(|a| *a == h)
            })
        };

        Some(ColumnMap {
            network: find(&["network", "cidr", "prefix"])?,
            asn: find(&["asn", "as_number"]),
            country_code: find(&["country_code", "country_iso"]),
            country_name: find(&["country", "country_name"]),
            continent_code: find(&["continent_code"]),
            continent_name: find(&["continent", "continent_name"]),
            as_name: find(&["as_name", "as_organization", "org"]),
            as_domain: find(&["as_domain"]),
        })
    }

    /// Parse one row, returning the record and whether it had to be normalized
    fn parse_row(
        &self,
        row: &csv::StringRecord,
    ) -> std::result::Result<(NetworkRecord, bool), String> {
        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or_default().to_string();

        let raw_network = row
            .get(self.network)
            .ok_or_else(|| "missing network column".to_string())?;
        let (network, normalized) = parse_network(raw_network)?;

        let asn = match self.asn.and_then(|i| row.get(i)) {
            Some(raw) => parse_asn(raw)?,
            None => 0,
        };

        let record = NetworkRecord {
            network,
            asn,
            country_code: field(self.country_code),
            country_name: field(self.country_name),
            continent_code: field(self.continent_code),
            continent_name: field(self.continent_name),
            as_name: field(self.as_name),
            as_domain: field(self.as_domain),
        };
        Ok((record, normalized))
    }
}

/// Parse a CIDR or bare address; returns the masked network and whether
/// host bits had to be cleared.
pub fn parse_network(raw: &str) -> std::result::Result<(IpNet, bool), String> {
    let raw = raw.trim();
    let net = match raw.parse::<IpNet>() {
        Ok(net) => net,
        Err(_) => raw
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|_| format!("invalid CIDR '{raw}'"))?,
    };
    let truncated = net.trunc();
    Ok((truncated, truncated != net))
}

/// Parse an ASN in `15169` or `AS15169` form; empty means unknown (0)
pub fn parse_asn(raw: &str) -> std::result::Result<u32, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    let digits = match raw.get(..2) {
        Some(p) if p.eq_ignore_ascii_case("as") => &raw[2..],
        _ => raw,
    };
    digits
        .parse::<u32>()
        .map_err(|_| format!("invalid ASN '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = "\
network,country,country_code,continent,continent_code,asn,as_name,as_domain
8.8.8.0/24,United States,US,North America,NA,AS15169,Google LLC,google.com
8.0.0.0/8,United States,US,North America,NA,AS3356,Level 3,lumen.com
2001:4860::/32,United States,US,North America,NA,AS15169,Google LLC,google.com
";

    fn parse(content: &str) -> Result<LoadedNetworks> {
        parse_networks(content.as_bytes(), &PathBuf::from("test.csv"))
    }

    #[test]
    fn test_parse_sample() {
        let loaded = parse(SAMPLE).unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.report.rows, 3);
        assert_eq!(loaded.report.skipped, 0);

        let first = &loaded.records[0];
        assert_eq!(first.network, "8.8.8.0/24".parse::<IpNet>().unwrap());
        assert_eq!(first.asn, 15169);
        assert_eq!(first.country_code, "US");
        assert_eq!(first.country_name, "United States");
        assert_eq!(first.continent_code, "NA");
        assert_eq!(first.as_name, "Google LLC");
        assert_eq!(first.as_domain, "google.com");
        assert!(first.is_ipv4());
        assert!(!loaded.records[2].is_ipv4());
    }

    #[test]
    fn test_file_order_preserved() {
        let loaded = parse(SAMPLE).unwrap();
        let nets: Vec<String> = loaded
            .records
            .iter()
            .map(|r| r.network.to_string())
            .collect();
        assert_eq!(nets, vec!["8.8.8.0/24", "8.0.0.0/8", "2001:4860::/32"]);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let content = "\
cidr,asn
1.0.0.0/24,13335
not-a-cidr,1
1.1.1.0/24,ASX
10.0.0.0/33,5
";
        let loaded = parse(content).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.report.rows, 4);
        assert_eq!(loaded.report.skipped, 3);
    }

    #[test]
    fn test_host_bits_normalized() {
        let loaded = parse("network,asn\n10.1.2.3/8,64500\n").unwrap();
        assert_eq!(loaded.records[0].network.to_string(), "10.0.0.0/8");
        assert_eq!(loaded.report.normalized, 1);
    }

    #[test]
    fn test_bare_address_is_host_route() {
        let loaded = parse("network,asn\n192.0.2.7,64500\n2001:db8::1,64501\n").unwrap();
        assert_eq!(loaded.records[0].network.to_string(), "192.0.2.7/32");
        assert_eq!(loaded.records[1].network.to_string(), "2001:db8::1/128");
    }

    #[test]
    fn test_missing_asn_column_means_unknown() {
        let loaded = parse("prefix,country_code\n203.0.113.0/24,AU\n").unwrap();
        assert_eq!(loaded.records[0].asn, 0);
        assert!(!loaded.records[0].has_asn());
        assert_eq!(loaded.records[0].country_code, "AU");
    }

    #[test]
    fn test_empty_file_is_malformed() {
        assert!(matches!(
            parse(""),
            Err(MaxlonError::DatasetMalformed { .. })
        ));
        assert!(matches!(
            parse("network,asn\n"),
            Err(MaxlonError::DatasetMalformed { .. })
        ));
    }

    #[test]
    fn test_all_rows_bad_is_malformed() {
        let err = parse("network,asn\nfoo,1\nbar,2\n").unwrap_err();
        assert!(matches!(err, MaxlonError::DatasetMalformed { .. }));
    }

    #[test]
    fn test_missing_network_column() {
        let err = parse("start_ip,end_ip\n1.0.0.0,1.0.0.255\n").unwrap_err();
        assert!(err.to_string().contains("network"));
    }

    #[test]
    fn test_parse_asn_forms() {
        assert_eq!(parse_asn("15169"), Ok(15169));
        assert_eq!(parse_asn("AS15169"), Ok(15169));
        assert_eq!(parse_asn("as3356"), Ok(3356));
        assert_eq!(parse_asn(""), Ok(0));
        assert!(parse_asn("AS").is_err());
        assert!(parse_asn("abc").is_err());
        assert!(parse_asn("-1").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_networks(Path::new("/nonexistent/networks.csv")).unwrap_err();
        assert!(err.is_dataset_missing());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networks.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let loaded = load_networks(&path).unwrap();
        assert_eq!(loaded.records.len(), 3);
    }
}
