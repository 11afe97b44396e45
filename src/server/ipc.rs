//! IPC front end: newline-delimited JSON over a Unix domain socket
//!
//! Each connection carries exactly one exchange: the client writes one
//! request line, the daemon answers with one response line and closes.
//! Connections that have not sent a full line are dropped on shutdown or after
//! [`REQUEST_TIMEOUT`].

use crate::server::protocol::{ErrorData, Request, Response};
use crate::server::session::DaemonSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a client may take to send its request line
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of an oversized request read and thrown away before answering
const DISCARD_LIMIT: u64 = 1024 * 1024;
const DISCARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Listener for local clients
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    session: Arc<DaemonSession>,
    max_request_size: usize,
}

impl IpcServer {
    /// Bind the socket at `path`, replacing a leftover socket file.
    ///
    /// Only call this while holding the daemon marker.
    pub fn bind(
        path: &Path,
        session: Arc<DaemonSession>,
        max_request_size: usize,
    ) -> std::io::Result<Self> {
        if path.exists() {
            debug!("removing leftover socket {}", path.display());
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        info!("IPC listening on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            session,
            max_request_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires, then drain in-flight ones
    pub async fn serve(self, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let session = self.session.clone();
                        let limit = self.max_request_size;
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, session, limit, shutdown).await {
                                debug!("IPC connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("IPC accept failed: {}", e);
                    }
                },
                // reap finished connections so the set does not grow unbounded
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(self.listener);
        while connections.join_next().await.is_some() {}

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("unable to remove socket {}: {}", self.path.display(), e);
        }
        info!("IPC listener stopped");
    }
}

async fn handle_connection(
    stream: UnixStream,
    session: Arc<DaemonSession>,
    max_request_size: usize,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    // room for a CRLF terminator after a request of exactly the limit
    let mut reader = BufReader::new(reader.take(max_request_size as u64 + 2));

    let mut buf = Vec::new();
    let read = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("closing idle IPC connection on shutdown");
            return Ok(());
        }
        read = tokio::time::timeout(REQUEST_TIMEOUT, reader.read_until(b'\n', &mut buf)) => read,
    };
    let Ok(read) = read else {
        debug!("no IPC request within {:?}, closing", REQUEST_TIMEOUT);
        return Ok(());
    };
    read?;

    let complete = buf.ends_with(b"\n");
    let body = trim_line_end(&buf);
    let response = if body.len() > max_request_size {
        warn!("IPC request over {} bytes rejected", max_request_size);
        if !complete {
            // unread input makes close() reset the connection before the reply lands
            reader.get_mut().set_limit(DISCARD_LIMIT);
            match tokio::time::timeout(DISCARD_TIMEOUT, discard_line(&mut reader)).await {
                Ok(Err(e)) => return Err(e),
                Ok(Ok(())) | Err(_) => {}
            }
        }
        Response::Error(ErrorData::too_large(max_request_size))
    } else {
        match std::str::from_utf8(body) {
            Ok(line) => handle_line(&session, line).await,
            Err(_) => Response::Error(ErrorData::invalid_request("request is not valid UTF-8")),
        }
    };

    let mut out = response.to_line();
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    writer.shutdown().await
}

fn trim_line_end(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &buf[..end]
}

/// Consume input up to and including the next newline, or until EOF
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        let (len, done) = match chunk.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (chunk.len(), false),
        };
        reader.consume(len);
        if done {
            return Ok(());
        }
    }
}

/// Answer one request line
pub async fn handle_line(session: &DaemonSession, line: &str) -> Response {
    match Request::parse(line) {
        Ok(request) => session.handle(request).await,
        Err(e) => {
            warn!("malformed IPC request: {}", e.message);
            Response::Error(e)
        }
    }
}
