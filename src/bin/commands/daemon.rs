use clap::Args;
use maxlon::{Daemon, MaxlonConfig};
use tracing::info;

/// Arguments for the Daemon command
#[derive(Args, Default)]
pub struct DaemonArgs {
    /// Address for the HTTP front end (overrides configuration)
    #[clap(long)]
    pub http_address: Option<String>,

    /// Port for the HTTP front end (overrides configuration)
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Serve only the local IPC socket
    #[clap(long)]
    pub no_http: bool,
}

pub fn run(config: &MaxlonConfig, args: DaemonArgs) -> anyhow::Result<()> {
    let DaemonArgs {
        http_address,
        port,
        no_http,
    } = args;

    let mut config = config.clone();
    if let Some(address) = http_address {
        config.http_address = address;
    }
    if let Some(port) = port {
        config.http_port = port;
    }
    if no_http {
        config.http_enabled = false;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let daemon = Daemon::start(&config).await?;
        info!("IPC socket: {}", daemon.ipc_socket().display());
        if let Some(addr) = daemon.http_addr() {
            info!("HTTP: http://{}/<ip>", addr);
        }
        daemon.run_until_signal().await?;
        Ok::<(), anyhow::Error>(())
    })
}
