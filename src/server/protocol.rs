//! Protocol types shared by the IPC and HTTP front ends
//!
//! Requests and responses are tagged JSON objects. The IPC front end reads
//! one request per line; the HTTP front end builds the same requests from the
//! URL and returns the same response bodies.

use crate::lens::lookup::{LoadInfo, LookupResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

// =============================================================================
// Request Types
// =============================================================================

/// Request sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Resolve one address
    Lookup { ip: String },
    /// Daemon statistics snapshot
    Stats,
    /// Re-read the dataset from disk
    Reload,
}

impl Request {
    pub fn lookup(ip: impl Into<String>) -> Self {
        Request::Lookup { ip: ip.into() }
    }

    /// Parse one request line.
    ///
    /// Anything that does not look like a JSON object is taken as an address
    /// to look up, so `echo 8.8.8.8 | nc -U maxlon.sock` works.
    pub fn parse(line: &str) -> Result<Self, ErrorData> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ErrorData::invalid_request("empty request"));
        }
        if line.starts_with('{') {
            return serde_json::from_str(line)
                .map_err(|e| ErrorData::invalid_request(format!("invalid request: {e}")));
        }
        if line.contains(char::is_whitespace) {
            return Err(ErrorData::invalid_request(format!(
                "expected a JSON request or a single address, got '{line}'"
            )));
        }
        Ok(Request::lookup(line))
    }
}

/// Parse a client-supplied address.
///
/// Surrounding whitespace and IPv6 brackets are tolerated.
pub fn parse_address(raw: &str) -> Result<IpAddr, ErrorData> {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    unbracketed
        .parse::<IpAddr>()
        .map_err(|_| ErrorData::invalid_address(trimmed))
}

// =============================================================================
// Response Types
// =============================================================================

/// Response returned to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Response {
    Lookup(LookupResult),
    Stats(StatsSnapshot),
    /// Dataset was reloaded; carries the new load metadata
    Reloaded(LoadInfo),
    Error(ErrorData),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Response as a single JSON line (no trailing newline)
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","data":{{"code":"INTERNAL_ERROR","message":"unable to encode response: {}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// Daemon statistics as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pid: u32,
    pub state: String,
    pub started_at: DateTime<Utc>,
    /// Seconds since the daemon started
    pub uptime: f64,
    pub total_networks: usize,
    pub ipv4_networks: usize,
    pub ipv6_networks: usize,
    pub total_asn: usize,
    /// Resolve calls served, failed ones included
    pub total_queries: u64,
    pub queries_per_second: f64,
    /// Seconds spent building the current dataset
    pub load_time: f64,
    pub loaded_at: DateTime<Utc>,
    pub dataset_path: PathBuf,
}

// =============================================================================
// Error Types
// =============================================================================

/// Structured failure returned instead of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorData {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn invalid_address(raw: &str) -> Self {
        Self::new(
            ErrorCode::InvalidAddress,
            format!("'{raw}' is not a valid IPv4 or IPv6 address"),
        )
    }

    pub fn too_large(limit: usize) -> Self {
        Self::new(
            ErrorCode::RequestTooLarge,
            format!("request exceeds {limit} bytes"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Error codes carried in [`ErrorData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request could not be parsed
    InvalidRequest,
    /// Lookup target is not an IP address
    InvalidAddress,
    /// Request line longer than the configured limit
    RequestTooLarge,
    /// Unexpected daemon-side failure
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidAddress => "INVALID_ADDRESS",
            ErrorCode::RequestTooLarge => "REQUEST_TOO_LARGE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::NetworkRecord;

    #[test]
    fn test_request_parse_json() {
        assert_eq!(
            Request::parse(r#"{"type":"lookup","ip":"8.8.8.8"}"#).unwrap(),
            Request::lookup("8.8.8.8")
        );
        assert_eq!(Request::parse(r#"{"type":"stats"}"#).unwrap(), Request::Stats);
        assert_eq!(
            Request::parse("  {\"type\":\"reload\"}\n").unwrap(),
            Request::Reload
        );
    }

    #[test]
    fn test_request_parse_bare_address() {
        assert_eq!(
            Request::parse("2001:db8::1\n").unwrap(),
            Request::lookup("2001:db8::1")
        );
        // validated later, when resolving
        assert_eq!(
            Request::parse("not-an-ip").unwrap(),
            Request::lookup("not-an-ip")
        );
    }

    #[test]
    fn test_request_parse_errors() {
        assert_eq!(
            Request::parse("").unwrap_err().code,
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            Request::parse(r#"{"type":"explode"}"#).unwrap_err().code,
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            Request::parse(r#"{"type":"lookup"}"#).unwrap_err().code,
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            Request::parse("8.8.8.8 1.1.1.1").unwrap_err().code,
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(" 8.8.8.8 ").unwrap().to_string(), "8.8.8.8");
        assert_eq!(
            parse_address("[2001:db8::1]").unwrap().to_string(),
            "2001:db8::1"
        );
        let err = parse_address("999.1.1.1").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAddress);
        assert!(err.message.contains("999.1.1.1"));
    }

    #[test]
    fn test_lookup_response_shape() {
        let record = NetworkRecord::new("8.8.8.0/24".parse().unwrap(), 15169)
            .with_country("US", "United States");
        let response = Response::Lookup(LookupResult {
            ip: "8.8.8.8".parse().unwrap(),
            record: Some(record),
            asn_cidrs: vec!["8.8.8.0/24".parse().unwrap()],
            query_time: 0.00001,
        });

        let value: serde_json::Value = serde_json::from_str(&response.to_line()).unwrap();
        assert_eq!(value["type"], "lookup");
        assert_eq!(value["data"]["ip"], "8.8.8.8");
        assert_eq!(value["data"]["record"]["network"], "8.8.8.0/24");
        assert_eq!(value["data"]["record"]["asn"], 15169);
        assert_eq!(value["data"]["asn_cidrs"][0], "8.8.8.0/24");
    }

    #[test]
    fn test_no_match_response_has_null_record() {
        let response = Response::Lookup(LookupResult {
            ip: "192.0.2.1".parse().unwrap(),
            record: None,
            asn_cidrs: vec![],
            query_time: 0.0,
        });
        let value: serde_json::Value = serde_json::from_str(&response.to_line()).unwrap();
        assert!(value["data"]["record"].is_null());
        assert!(!response.is_error());
    }

    #[test]
    fn test_error_response_shape() {
        let response = Response::Error(ErrorData::too_large(4096));
        let line = response.to_line();
        assert!(line.contains(r#""type":"error""#));
        assert!(line.contains(r#""code":"REQUEST_TOO_LARGE""#));
        assert!(response.is_error());

        let parsed: Response = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_error_code_display_matches_wire() {
        for code in [
            ErrorCode::InvalidRequest,
            ErrorCode::InvalidAddress,
            ErrorCode::RequestTooLarge,
            ErrorCode::InternalError,
        ] {
            let wire = serde_json::to_string(&code).unwrap();
            assert_eq!(wire, format!("\"{code}\""));
        }
    }
}
