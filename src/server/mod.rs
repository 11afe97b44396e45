//! Daemon module
//!
//! Keeps one [`LookupService`] resident and serves it to local and remote
//! clients.
//!
//! # Architecture
//!
//! - `protocol` - request/response types and error codes
//! - `session` - shared daemon state: lifecycle, counters, shutdown token
//! - `marker` - PID file used for single-instance checks and `stop`
//! - `ipc` - newline-delimited JSON over a Unix socket
//! - `http` - axum routes mirroring the IPC responses
//! - `client` - IPC client used by the CLI
//!
//! # Lifecycle
//!
//! [`Daemon::start`] claims the marker, loads the dataset (fetching it once if
//! missing), binds both listeners and moves the session to `Running`.
//! [`Daemon::shutdown`] cancels the listeners, waits for in-flight requests,
//! removes the marker and ends in `Stopped`. The HTTP front end can also be
//! stopped and started on its own with [`Daemon::stop_http`] and
//! [`Daemon::start_http`].
//!
//! ```rust,ignore
//! use maxlon::config::MaxlonConfig;
//! use maxlon::server::Daemon;
//!
//! let config = MaxlonConfig::new(&None)?;
//! let daemon = Daemon::start(&config).await?;
//! daemon.run_until_signal().await?;
//! ```

pub mod client;
pub mod http;
pub mod ipc;
pub mod marker;
pub mod protocol;
pub mod session;

pub use client::DaemonClient;
pub use http::HttpConfig;
pub use ipc::IpcServer;
pub use marker::DaemonMarker;
pub use protocol::{ErrorCode, ErrorData, Request, Response, StatsSnapshot};
pub use session::{DaemonSession, DaemonState, DaemonStats};

use crate::config::MaxlonConfig;
use crate::error::{MaxlonError, Result};
use crate::lens::lookup::LookupService;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A started daemon with its listeners running
pub struct Daemon {
    session: Arc<DaemonSession>,
    marker: DaemonMarker,
    ipc_task: JoinHandle<()>,
    ipc_socket: PathBuf,
    http: Option<HttpFrontEnd>,
}

/// Running HTTP listener; its token is a child of the session token so it
/// can be stopped on its own
struct HttpFrontEnd {
    addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HttpFrontEnd {
    async fn start(session: &Arc<DaemonSession>, config: &HttpConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let token = session.shutdown_token().child_token();
        let task = {
            let session = session.clone();
            let token = token.clone();
            tokio::spawn(async move {
                if let Err(e) = http::serve(listener, session, token).await {
                    error!("HTTP front end failed: {}", e);
                }
            })
        };
        Ok(Self { addr, token, task })
    }

    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!("HTTP listener task failed: {}", e);
        }
    }
}

impl Daemon {
    /// Claim the marker, load the dataset and start both front ends.
    ///
    /// Fails with [`MaxlonError::DaemonAlreadyRunning`] without touching the
    /// live daemon, or with the dataset error when no dataset can be obtained.
    pub async fn start(config: &MaxlonConfig) -> Result<Self> {
        let marker = DaemonMarker::new(&config.pid_file);
        marker.acquire()?;

        match Self::start_listeners(config, marker.clone()).await {
            Ok(daemon) => Ok(daemon),
            Err(e) => {
                if let Err(release_err) = marker.release() {
                    warn!("unable to release daemon marker: {}", release_err);
                }
                Err(e)
            }
        }
    }

    async fn start_listeners(config: &MaxlonConfig, marker: DaemonMarker) -> Result<Self> {
        let owned = config.clone();
        let service = tokio::task::spawn_blocking(move || LookupService::from_config(&owned))
            .await
            .map_err(|e| MaxlonError::Io(std::io::Error::other(e)))??;
        let session = DaemonSession::new(Arc::new(service));

        let ipc = IpcServer::bind(&config.ipc_socket, session.clone(), config.max_request_size)?;
        let ipc_task = tokio::spawn(ipc.serve(session.shutdown_token()));

        let http_config = HttpConfig::from(config);
        let http = if http_config.enabled {
            match HttpFrontEnd::start(&session, &http_config).await {
                Ok(http) => Some(http),
                Err(e) => {
                    // the IPC task is already running
                    session.begin_stop();
                    if let Err(join_err) = ipc_task.await {
                        error!("IPC listener task failed: {}", join_err);
                    }
                    return Err(e);
                }
            }
        } else {
            info!("HTTP front end disabled");
            None
        };

        session.mark_running();
        info!("daemon running (pid {})", std::process::id());

        Ok(Self {
            session,
            marker,
            ipc_task,
            ipc_socket: config.ipc_socket.clone(),
            http,
        })
    }

    pub fn session(&self) -> &Arc<DaemonSession> {
        &self.session
    }

    pub fn ipc_socket(&self) -> &Path {
        &self.ipc_socket
    }

    /// Bound HTTP address, `None` when the HTTP front end is not running
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|http| http.addr)
    }

    /// Start the HTTP front end if it is not already running.
    ///
    /// It serves the same session as the IPC listener.
    pub async fn start_http(&mut self, config: &HttpConfig) -> Result<SocketAddr> {
        if let Some(http) = &self.http {
            return Ok(http.addr);
        }
        let http = HttpFrontEnd::start(&self.session, config).await?;
        let addr = http.addr;
        self.http = Some(http);
        Ok(addr)
    }

    /// Stop only the HTTP front end; the IPC listener keeps serving
    pub async fn stop_http(&mut self) {
        if let Some(http) = self.http.take() {
            http.stop().await;
        }
    }

    /// Stop accepting work, drain in-flight requests and remove the marker
    pub async fn shutdown(self) -> Result<()> {
        let Daemon {
            session,
            marker,
            ipc_task,
            http,
            ..
        } = self;
        session.begin_stop();

        let http = async move {
            if let Some(http) = http {
                http.stop().await;
            }
        };
        let ipc = async move {
            if let Err(e) = ipc_task.await {
                error!("IPC listener task failed: {}", e);
            }
        };
        futures::future::join(ipc, http).await;

        marker.release()?;
        session.mark_stopped();
        info!(
            "daemon stopped after {} queries",
            session.stats().total_queries()
        );
        Ok(())
    }

    /// Serve until Ctrl-C, SIGTERM or an internal stop, then shut down
    pub async fn run_until_signal(self) -> Result<()> {
        wait_for_shutdown(self.session.shutdown_token()).await;
        self.shutdown().await
    }
}

/// Resolve once a stop signal arrives or `token` is cancelled
pub async fn wait_for_shutdown(token: CancellationToken) {
    let mut terminate =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!("unable to listen for SIGTERM: {}", e);
                None
            }
        };

    let sigterm = async {
        match terminate.as_mut() {
            Some(signal) => {
                signal.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl-C"),
        _ = sigterm => info!("received SIGTERM"),
        _ = token.cancelled() => {}
    }
}
