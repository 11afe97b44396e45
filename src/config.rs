use crate::error::{MaxlonError, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default upstream dataset (ipinfo lite CSV, gzip-compressed)
pub const DEFAULT_DATASET_URL: &str = "https://ipinfo.io/data/ipinfo_lite.csv.gz";

#[derive(Debug, Clone, Serialize)]
pub struct MaxlonConfig {
    /// Path to the directory holding the dataset, PID file and socket
    pub data_dir: PathBuf,

    /// Path to the network dataset (CSV, optionally gzip-compressed)
    pub dataset_path: PathBuf,

    /// Remote location of the dataset used by `update`
    pub dataset_url: String,

    /// Optional access token appended to `dataset_url`
    #[serde(skip_serializing)]
    pub dataset_token: Option<String>,

    /// Process marker recording the live daemon's PID
    pub pid_file: PathBuf,

    /// Unix socket path for the IPC front end
    pub ipc_socket: PathBuf,

    /// Whether the daemon starts the HTTP front end
    pub http_enabled: bool,

    /// HTTP bind address
    pub http_address: String,

    /// HTTP port
    pub http_port: u16,

    /// Maximum size in bytes of a single IPC request line
    pub max_request_size: usize,
}

const EMPTY_CONFIG: &str = r#"### maxlon configuration file

### directory for the dataset, pid file and ipc socket
# data_dir = "~/.maxlon"

### dataset location and source
# dataset_path = "~/.maxlon/networks.csv"
# dataset_url = "https://ipinfo.io/data/ipinfo_lite.csv.gz"
# dataset_token = ""

### daemon process marker and front ends
# pid_file = "~/.maxlon/maxlon.pid"
# ipc_socket = "~/.maxlon/maxlon.sock"
# max_request_size = 4096
# http_enabled = true
# http_address = "0.0.0.0"
# http_port = 8080
"#;

impl Default for MaxlonConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_data_dir(home_dir.join(".maxlon"))
    }
}

impl MaxlonConfig {
    /// Build a configuration with every path derived from `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            dataset_path: data_dir.join("networks.csv"),
            pid_file: data_dir.join("maxlon.pid"),
            ipc_socket: data_dir.join("maxlon.sock"),
            data_dir,
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            dataset_token: None,
            http_enabled: true,
            http_address: "0.0.0.0".to_string(),
            http_port: 8080,
            max_request_size: 4096,
        }
    }

    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<MaxlonConfig> {
        // Values from a local .env file behave like real environment variables
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();

        let home_dir =
            dirs::home_dir().ok_or_else(|| MaxlonError::Config("no home directory".into()))?;
        let maxlon_dir = home_dir.join(".maxlon");

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    builder = builder.add_source(config::File::from(path));
                } else {
                    std::fs::write(path, EMPTY_CONFIG)?;
                }
            }
            None => {
                std::fs::create_dir_all(&maxlon_dir)?;
                let p = maxlon_dir.join("maxlon.toml");
                if p.exists() {
                    builder = builder.add_source(config::File::from(p.as_path()));
                } else {
                    std::fs::write(&p, EMPTY_CONFIG)?;
                }
            }
        }

        // E.g., `MAXLON_HTTP_PORT=9000 maxlon daemon` overrides the HTTP port
        builder = builder.add_source(config::Environment::with_prefix("MAXLON"));

        let settings = builder
            .build()
            .map_err(|e| MaxlonError::Config(format!("failed to build configuration: {e}")))?;

        let values = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| MaxlonError::Config(format!("failed to deserialize configuration: {e}")))?;

        let data_dir = values
            .get("data_dir")
            .map(|p| expand_home(p, &home_dir))
            .unwrap_or(maxlon_dir);
        std::fs::create_dir_all(&data_dir)?;

        let mut config = MaxlonConfig::with_data_dir(data_dir);
        config.apply(&values, &home_dir)?;

        // Honor the historical PID file variable when no explicit setting exists
        if !values.contains_key("pid_file") {
            if let Ok(pid_file) = std::env::var("DAEMON_PIDFILE") {
                config.pid_file = expand_home(&pid_file, &home_dir);
            }
        }

        Ok(config)
    }

    fn apply(&mut self, values: &HashMap<String, String>, home_dir: &Path) -> Result<()> {
        if let Some(p) = values.get("dataset_path") {
            self.dataset_path = expand_home(p, home_dir);
        }
        if let Some(url) = values.get("dataset_url") {
            self.dataset_url = url.clone();
        }
        self.dataset_token = values
            .get("dataset_token")
            .filter(|t| !t.trim().is_empty())
            .cloned();
        if let Some(p) = values.get("pid_file") {
            self.pid_file = expand_home(p, home_dir);
        }
        if let Some(p) = values.get("ipc_socket") {
            self.ipc_socket = expand_home(p, home_dir);
        }
        if let Some(v) = values.get("http_enabled") {
            self.http_enabled = parse_value("http_enabled", v)?;
        }
        if let Some(v) = values.get("http_address") {
            self.http_address = v.clone();
        }
        if let Some(v) = values.get("http_port") {
            self.http_port = parse_value("http_port", v)?;
        }
        if let Some(v) = values.get("max_request_size") {
            self.max_request_size = parse_value("max_request_size", v)?;
        }
        Ok(())
    }

    /// Full dataset URL including the access token, if one is configured
    pub fn dataset_source(&self) -> String {
        match &self.dataset_token {
            Some(token) if self.dataset_url.contains('?') => {
                format!("{}&token={}", self.dataset_url, token)
            }
            Some(token) => format!("{}?token={}", self.dataset_url, token),
            None => self.dataset_url.clone(),
        }
    }

    /// HTTP bind address in `host:port` form
    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.http_address, self.http_port)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Data Directory:     {}", self.data_dir.display()),
            format!("Dataset Path:       {}", self.dataset_path.display()),
            format!("Dataset URL:        {}", self.dataset_url),
            format!("PID File:           {}", self.pid_file.display()),
            format!("IPC Socket:         {}", self.ipc_socket.display()),
        ];
        if self.http_enabled {
            lines.push(format!("HTTP Listener:      {}", self.http_bind_address()));
        } else {
            lines.push("HTTP Listener:      disabled".to_string());
        }
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.maxlon/maxlon.toml", home_dir)
    }
}

fn expand_home(p: &str, home_dir: &Path) -> PathBuf {
    match p.strip_prefix("~/") {
        Some(rest) => home_dir.join(rest),
        None if p == "~" => home_dir.to_path_buf(),
        None => PathBuf::from(p),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MaxlonError::Config(format!("invalid value for {key}: {value}")))
}

// =============================================================================
// Dataset file information (used by the config command)
// =============================================================================

/// Information about the dataset file on disk
#[derive(Debug, Serialize, Clone)]
pub struct DatasetFileInfo {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// Get dataset file information
pub fn get_dataset_info(config: &MaxlonConfig) -> DatasetFileInfo {
    let metadata = std::fs::metadata(&config.dataset_path).ok();
    let modified = metadata.as_ref().and_then(|m| m.modified().ok()).map(|t| {
        let datetime: chrono::DateTime<chrono::Utc> = t.into();
        datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    });

    DatasetFileInfo {
        path: config.dataset_path.display().to_string(),
        exists: metadata.is_some(),
        size_bytes: metadata.as_ref().map(|m| m.len()),
        modified,
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
