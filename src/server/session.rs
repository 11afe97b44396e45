//! Daemon session
//!
//! One [`DaemonSession`] is shared by every front end. It owns the lookup
//! service, the query counters and the lifecycle state, and hands out the
//! cancellation token the listeners watch for shutdown.

use crate::lens::lookup::LookupService;
use crate::server::protocol::{parse_address, ErrorData, Request, Response, StatsSnapshot};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a daemon, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DaemonState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
            DaemonState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters that live for the whole daemon process
#[derive(Debug)]
pub struct DaemonStats {
    total_queries: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl DaemonStats {
    fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    /// Seconds since the session was created
    pub fn uptime(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn queries_per_second(&self) -> f64 {
        let uptime = self.uptime();
        if uptime > 0.0 {
            self.total_queries() as f64 / uptime
        } else {
            0.0
        }
    }
}

/// Shared state of a running daemon
pub struct DaemonSession {
    service: Arc<LookupService>,
    stats: DaemonStats,
    state: Mutex<DaemonState>,
    shutdown: CancellationToken,
}

impl DaemonSession {
    /// New session in the `Starting` state
    pub fn new(service: Arc<LookupService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            stats: DaemonStats::new(),
            state: Mutex::new(DaemonState::Starting),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn service(&self) -> &Arc<LookupService> {
        &self.service
    }

    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Move to `next` if it comes later in the lifecycle.
    ///
    /// Returns `false` (and changes nothing) for backward or repeated moves.
    fn advance(&self, next: DaemonState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if next <= *state {
            return false;
        }
        debug!("daemon state {} -> {}", *state, next);
        *state = next;
        true
    }

    /// Front ends are up and serving
    pub fn mark_running(&self) -> bool {
        self.advance(DaemonState::Running)
    }

    /// Enter `Stopping` and tell every listener to wind down
    pub fn begin_stop(&self) -> bool {
        let changed = self.advance(DaemonState::Stopping);
        if changed {
            info!("daemon stopping");
        }
        self.shutdown.cancel();
        changed
    }

    pub fn mark_stopped(&self) -> bool {
        self.advance(DaemonState::Stopped)
    }

    /// Token cancelled once the session starts stopping
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolve a client-supplied address.
    ///
    /// Every call counts as a query, whether or not the address parses.
    pub fn resolve(&self, raw_ip: &str) -> Response {
        self.stats.record_query();
        match parse_address(raw_ip) {
            Ok(ip) => Response::Lookup(self.service.lookup(ip)),
            Err(e) => {
                debug!("rejected lookup: {}", e);
                Response::Error(e)
            }
        }
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let info = self.service.load_info();
        StatsSnapshot {
            pid: std::process::id(),
            state: self.state().to_string(),
            started_at: self.stats.started_at,
            uptime: self.stats.uptime(),
            total_networks: info.counts.total_networks,
            ipv4_networks: info.counts.ipv4_networks,
            ipv6_networks: info.counts.ipv6_networks,
            total_asn: info.counts.total_asn,
            total_queries: self.stats.total_queries(),
            queries_per_second: self.stats.queries_per_second(),
            load_time: info.load_time,
            loaded_at: info.loaded_at,
            dataset_path: info.path,
        }
    }

    /// Reload the dataset on a blocking thread and report the outcome
    pub async fn reload(&self) -> Response {
        let service = self.service.clone();
        match tokio::task::spawn_blocking(move || service.reload()).await {
            Ok(Ok(info)) => Response::Reloaded(info),
            Ok(Err(e)) => {
                warn!("reload failed: {}", e);
                Response::Error(ErrorData::internal(format!("reload failed: {e}")))
            }
            Err(e) => Response::Error(ErrorData::internal(format!("reload task failed: {e}"))),
        }
    }

    /// Dispatch one request
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Lookup { ip } => self.resolve(&ip),
            Request::Stats => Response::Stats(self.stats_snapshot()),
            Request::Reload => self.reload().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::NetworkRecord;
    use crate::server::protocol::ErrorCode;

    fn session() -> Arc<DaemonSession> {
        let service = LookupService::from_records(vec![
            NetworkRecord::new("8.0.0.0/8".parse().unwrap(), 3356),
            NetworkRecord::new("8.8.8.0/24".parse().unwrap(), 15169),
            NetworkRecord::new("2001:4860::/32".parse().unwrap(), 15169),
        ])
        .unwrap();
        DaemonSession::new(Arc::new(service))
    }

    #[test]
    fn test_state_machine_moves_forward_only() {
        let session = session();
        assert_eq!(session.state(), DaemonState::Starting);

        assert!(session.mark_running());
        assert!(!session.mark_running());
        assert_eq!(session.state(), DaemonState::Running);

        assert!(session.begin_stop());
        assert!(session.shutdown_token().is_cancelled());
        assert_eq!(session.state(), DaemonState::Stopping);
        assert!(!session.mark_running());

        assert!(session.mark_stopped());
        assert_eq!(session.state(), DaemonState::Stopped);
        assert!(!session.begin_stop());
    }

    #[test]
    fn test_resolve_counts_every_call() {
        let session = session();

        match session.resolve("8.8.8.8") {
            Response::Lookup(result) => {
                assert_eq!(result.record.unwrap().asn, 15169);
                assert_eq!(result.asn_cidrs.len(), 2);
            }
            other => panic!("unexpected response {other:?}"),
        }
        match session.resolve("bogus") {
            Response::Error(e) => assert_eq!(e.code, ErrorCode::InvalidAddress),
            other => panic!("unexpected response {other:?}"),
        }
        match session.resolve("203.0.113.9") {
            Response::Lookup(result) => assert!(result.record.is_none()),
            other => panic!("unexpected response {other:?}"),
        }

        assert_eq!(session.stats().total_queries(), 3);
    }

    #[test]
    fn test_concurrent_queries_are_counted_exactly() {
        let session = session();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for n in 0..500 {
                        // mix of hits, misses and invalid input
                        let ip = match (i + n) % 3 {
                            0 => "8.8.8.8",
                            1 => "1.1.1.1",
                            _ => "nope",
                        };
                        session.resolve(ip);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(session.stats().total_queries(), 8 * 500);
    }

    #[tokio::test]
    async fn test_handle_stats() {
        let session = session();
        session.mark_running();
        session.resolve("8.8.8.8");

        match session.handle(Request::Stats).await {
            Response::Stats(stats) => {
                assert_eq!(stats.state, "running");
                assert_eq!(stats.total_networks, 3);
                assert_eq!(stats.ipv4_networks, 2);
                assert_eq!(stats.ipv6_networks, 1);
                assert_eq!(stats.total_asn, 2);
                assert_eq!(stats.total_queries, 1);
                assert_eq!(stats.pid, std::process::id());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_reload_reports_failure() {
        // in-memory service has no dataset file to reload from
        let session = session();
        match session.handle(Request::Reload).await {
            Response::Error(e) => assert_eq!(e.code, ErrorCode::InternalError),
            other => panic!("unexpected response {other:?}"),
        }
        // still serving the original data
        assert!(matches!(session.resolve("8.8.8.8"), Response::Lookup(_)));
    }

    #[tokio::test]
    async fn test_handle_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networks.csv");
        std::fs::write(&path, "network,asn\n8.8.8.0/24,15169\n").unwrap();
        let service = LookupService::initialize(&path).unwrap();
        let session = DaemonSession::new(Arc::new(service));

        std::fs::write(&path, "network,asn\n1.1.1.0/24,13335\n9.9.9.0/24,19281\n").unwrap();
        match session.handle(Request::Reload).await {
            Response::Reloaded(info) => assert_eq!(info.counts.total_networks, 2),
            other => panic!("unexpected response {other:?}"),
        }
        match session.resolve("1.1.1.1") {
            Response::Lookup(result) => assert_eq!(result.record.unwrap().asn, 13335),
            other => panic!("unexpected response {other:?}"),
        }
    }
}
