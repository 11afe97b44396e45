use anyhow::anyhow;
use clap::Args;
use maxlon::lens::utils::OutputFormat;
use maxlon::{DaemonClient, MaxlonConfig, MaxlonError};

/// Arguments for the Query command
#[derive(Args)]
pub struct QueryArgs {
    /// IP address to look up
    #[clap(value_name = "IP")]
    pub ip: String,
}

pub fn run(config: &MaxlonConfig, args: QueryArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let QueryArgs { ip } = args;

    let client = DaemonClient::new(&config.ipc_socket);
    let (result, round_trip) = match client.blocking(client.lookup_timed(&ip)) {
        Ok(timed) => timed,
        Err(MaxlonError::DaemonNotRunning) => {
            return Err(anyhow!(
                "daemon not running; start it with `maxlon daemon` or use `maxlon standalone {ip}`"
            ));
        }
        Err(e) => return Err(e.into()),
    };

    super::lookup_format::print_lookup(&result, output_format, "daemon", Some(round_trip))
}
