use anyhow::anyhow;
use clap::Args;
use maxlon::lens::lookup::LookupService;
use maxlon::lens::utils::OutputFormat;
use maxlon::server::protocol::parse_address;
use maxlon::MaxlonConfig;

/// Arguments for the Standalone command
#[derive(Args)]
pub struct StandaloneArgs {
    /// IP address to look up
    #[clap(value_name = "IP")]
    pub ip: String,
}

pub fn run(
    config: &MaxlonConfig,
    args: StandaloneArgs,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let StandaloneArgs { ip } = args;
    let addr = parse_address(&ip).map_err(|e| anyhow!(e.message))?;

    let pb = super::spinner("loading dataset...", output_format);
    let loaded = LookupService::from_config(config);
    pb.finish_and_clear();
    let service = loaded?;

    let info = service.load_info();
    if !output_format.is_json() {
        eprintln!(
            "loaded {} networks in {:.2}s",
            info.counts.total_networks, info.load_time
        );
    }

    let result = service.lookup(addr);
    super::lookup_format::print_lookup(&result, output_format, "standalone", None)
}
