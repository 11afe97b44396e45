//! Client side of the IPC protocol

use crate::error::{MaxlonError, Result};
use crate::lens::lookup::{LoadInfo, LookupResult};
use crate::server::protocol::{Request, Response, StatsSnapshot};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a running daemon over its Unix socket
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send one request and wait for its response
    pub async fn request(&self, request: &Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                MaxlonError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("no answer from daemon within {:?}", self.timeout),
                ))
            })?
    }

    async fn exchange(&self, request: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::ConnectionRefused => MaxlonError::DaemonNotRunning,
                _ => MaxlonError::Io(e),
            })?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(request)
            .map_err(|e| MaxlonError::MalformedRequest(e.to_string()))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        BufReader::new(reader).read_line(&mut reply).await?;
        if reply.trim().is_empty() {
            return Err(MaxlonError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "daemon closed the connection without answering",
            )));
        }
        serde_json::from_str(reply.trim()).map_err(|e| {
            MaxlonError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("unreadable daemon response: {e}"),
            ))
        })
    }

    pub async fn lookup(&self, ip: &str) -> Result<LookupResult> {
        match self.request(&Request::lookup(ip)).await? {
            Response::Lookup(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Lookup plus the client-side round trip, connect and decode included
    pub async fn lookup_timed(&self, ip: &str) -> Result<(LookupResult, Duration)> {
        let started = Instant::now();
        let result = self.lookup(ip).await?;
        Ok((result, started.elapsed()))
    }

    pub async fn stats(&self) -> Result<StatsSnapshot> {
        match self.request(&Request::Stats).await? {
            Response::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    pub async fn reload(&self) -> Result<LoadInfo> {
        match self.request(&Request::Reload).await? {
            Response::Reloaded(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    /// Run one of the async calls to completion from synchronous code
    pub fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(call)
    }
}

fn unexpected(response: Response) -> MaxlonError {
    match response {
        Response::Error(e) => MaxlonError::DaemonResponse {
            code: e.code.to_string(),
            message: e.message,
        },
        other => MaxlonError::DaemonResponse {
            code: "UNEXPECTED_RESPONSE".to_string(),
            message: format!("{other:?}"),
        },
    }
}
