use anyhow::anyhow;
use maxlon::lens::utils::OutputFormat;
use maxlon::{DaemonClient, MaxlonConfig, MaxlonError};

pub fn run(config: &MaxlonConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = DaemonClient::new(&config.ipc_socket);
    let info = match client.blocking(client.reload()) {
        Ok(info) => info,
        Err(MaxlonError::DaemonNotRunning) => return Err(anyhow!("daemon not running")),
        Err(e) => return Err(e.into()),
    };

    if output_format.is_json() {
        super::print_json(&info, output_format)?;
    } else {
        println!(
            "daemon reloaded {}: {} networks ({} IPv4, {} IPv6), {} ASNs in {:.2}s",
            info.path.display(),
            info.counts.total_networks,
            info.counts.ipv4_networks,
            info.counts.ipv6_networks,
            info.counts.total_asn,
            info.load_time
        );
    }
    Ok(())
}
