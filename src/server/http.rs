//! HTTP front end
//!
//! `GET /{ip}` answers with the same JSON body the IPC front end returns.
//! The handlers only hold the shared [`DaemonSession`], never a dataset of
//! their own.

use crate::config::MaxlonConfig;
use crate::server::protocol::{ErrorCode, Response};
use crate::server::session::DaemonSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl HttpConfig {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl From<&MaxlonConfig> for HttpConfig {
    fn from(config: &MaxlonConfig) -> Self {
        Self {
            enabled: config.http_enabled,
            address: config.http_address.clone(),
            port: config.http_port,
        }
    }
}

/// Routes served by the HTTP front end
pub fn create_router(session: Arc<DaemonSession>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/:ip", get(lookup_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(session)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(session): State<Arc<DaemonSession>>) -> Json<Response> {
    Json(Response::Stats(session.stats_snapshot()))
}

async fn lookup_handler(
    State(session): State<Arc<DaemonSession>>,
    Path(ip): Path<String>,
) -> impl IntoResponse {
    let response = session.resolve(&ip);
    (status_for(&response), Json(response))
}

fn status_for(response: &Response) -> StatusCode {
    match response {
        Response::Error(e) => match e.code {
            ErrorCode::InvalidAddress | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::OK,
    }
}

/// Serve on an already-bound listener until `shutdown` fires.
///
/// In-flight requests are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    session: Arc<DaemonSession>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP listening on {}", addr);
    }
    let app = create_router(session);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::NetworkRecord;
    use crate::lens::lookup::LookupService;
    use crate::server::protocol::ErrorData;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn session() -> Arc<DaemonSession> {
        let service = LookupService::from_records(vec![
            NetworkRecord::new("8.0.0.0/8".parse().unwrap(), 3356),
            NetworkRecord::new("8.8.8.0/24".parse().unwrap(), 15169),
            NetworkRecord::new("2001:4860::/32".parse().unwrap(), 15169),
        ])
        .unwrap();
        DaemonSession::new(Arc::new(service))
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap();
        (status, body)
    }

    #[test]
    fn test_http_config() {
        let config = HttpConfig::default().with_address("127.0.0.1").with_port(9000);
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert!(config.enabled);

        let mut maxlon = MaxlonConfig::with_data_dir("/tmp/maxlon-test");
        maxlon.http_port = 8181;
        maxlon.http_enabled = false;
        let config = HttpConfig::from(&maxlon);
        assert_eq!(config.port, 8181);
        assert!(!config.enabled);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&Response::Error(ErrorData::invalid_address("x"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Response::Error(ErrorData::internal("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_http_endpoints() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let session = session();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, session.clone(), token.clone()));

        let (status, body) = get(addr, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body, "OK");

        let (status, body) = get(addr, "/8.8.8.8").await;
        assert_eq!(status, 200);
        match serde_json::from_str::<Response>(&body).unwrap() {
            Response::Lookup(result) => {
                assert_eq!(result.record.unwrap().network.to_string(), "8.8.8.0/24");
                assert_eq!(result.asn_cidrs.len(), 2);
            }
            other => panic!("unexpected response {other:?}"),
        }

        let (status, body) = get(addr, "/2001:4860::1").await;
        assert_eq!(status, 200);
        assert!(body.contains("2001:4860::/32"));

        let (status, body) = get(addr, "/192.0.2.1").await;
        assert_eq!(status, 200);
        assert!(body.contains(r#""record":null"#));

        let (status, body) = get(addr, "/not-an-ip").await;
        assert_eq!(status, 400);
        assert!(body.contains("INVALID_ADDRESS"));

        let (status, body) = get(addr, "/stats").await;
        assert_eq!(status, 200);
        match serde_json::from_str::<Response>(&body).unwrap() {
            Response::Stats(stats) => assert_eq!(stats.total_queries, 4),
            other => panic!("unexpected response {other:?}"),
        }

        token.cancel();
        server.await.unwrap().unwrap();
    }
}
