use anyhow::anyhow;
use clap::Args;
use maxlon::lens::utils::OutputFormat;
use maxlon::{format_size, DaemonMarker, DatasetUpdater, MaxlonConfig};

/// Arguments for the Update command
#[derive(Args)]
pub struct UpdateArgs {
    /// Fetch from this URL or local file instead of the configured source
    #[clap(short, long)]
    pub source: Option<String>,
}

pub fn run(config: &MaxlonConfig, args: UpdateArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let UpdateArgs { source } = args;

    if let Some(pid) = DaemonMarker::new(&config.pid_file).is_live() {
        return Err(anyhow!(
            "daemon is running (pid {pid}); stop it with `maxlon stop` before updating"
        ));
    }

    let updater = match source {
        Some(source) => DatasetUpdater::with_source(source, &config.dataset_path),
        None => DatasetUpdater::new(config),
    };

    let pb = super::spinner("downloading dataset...", output_format);
    let outcome = updater.update();
    pb.finish_and_clear();
    let summary = outcome?;

    if output_format.is_json() {
        super::print_json(
            &serde_json::json!({
                "path": summary.path,
                "records": summary.records,
                "bytes": summary.bytes,
            }),
            output_format,
        )?;
    } else {
        println!(
            "dataset updated: {} networks, {} written to {}",
            summary.records,
            format_size(summary.bytes),
            summary.path.display()
        );
    }
    Ok(())
}
