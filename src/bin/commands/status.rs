use anyhow::anyhow;
use maxlon::lens::utils::{format_count, OutputFormat};
use maxlon::{DaemonClient, DaemonMarker, MaxlonConfig, MaxlonError, StatsSnapshot};
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Tabled)]
struct StatusRow {
    field: &'static str,
    value: String,
}

pub fn run(config: &MaxlonConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = DaemonClient::new(&config.ipc_socket).with_timeout(STATUS_TIMEOUT);
    let stats = match client.blocking(client.stats()) {
        Ok(stats) => stats,
        Err(MaxlonError::DaemonNotRunning) => {
            let marker = DaemonMarker::new(&config.pid_file);
            return Err(match marker.is_live() {
                Some(pid) => anyhow!(
                    "daemon process {pid} is alive but not answering on {}",
                    config.ipc_socket.display()
                ),
                None => anyhow!("daemon not running"),
            });
        }
        Err(e) => return Err(e.into()),
    };

    match output_format {
        OutputFormat::Json | OutputFormat::JsonPretty | OutputFormat::JsonLine => {
            super::print_json(&stats, output_format)?;
        }
        OutputFormat::Psv => {
            println!("field|value");
            for row in status_rows(&stats) {
                println!("{}|{}", row.field, row.value);
            }
        }
        OutputFormat::Markdown => {
            println!("{}", Table::new(status_rows(&stats)).with(Style::markdown()));
        }
        OutputFormat::Table => {
            println!("{}", Table::new(status_rows(&stats)).with(Style::rounded()));
        }
    }
    Ok(())
}

fn status_rows(stats: &StatsSnapshot) -> Vec<StatusRow> {
    let uptime = Duration::from_secs(stats.uptime.max(0.0) as u64);
    vec![
        StatusRow {
            field: "state",
            value: format!("{} (pid {})", stats.state, stats.pid),
        },
        StatusRow {
            field: "uptime",
            value: humantime::format_duration(uptime).to_string(),
        },
        StatusRow {
            field: "networks",
            value: format_count(stats.total_networks as u64),
        },
        StatusRow {
            field: "ipv4 networks",
            value: format_count(stats.ipv4_networks as u64),
        },
        StatusRow {
            field: "ipv6 networks",
            value: format_count(stats.ipv6_networks as u64),
        },
        StatusRow {
            field: "asns",
            value: format_count(stats.total_asn as u64),
        },
        StatusRow {
            field: "queries",
            value: format_count(stats.total_queries),
        },
        StatusRow {
            field: "queries/sec",
            value: format!("{:.1}", stats.queries_per_second),
        },
        StatusRow {
            field: "load time",
            value: format!("{:.2}s", stats.load_time),
        },
        StatusRow {
            field: "loaded at",
            value: stats.loaded_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        },
        StatusRow {
            field: "dataset",
            value: stats.dataset_path.display().to_string(),
        },
    ]
}
