pub mod config;
pub mod daemon;
pub mod lookup_format;
pub mod query;
pub mod reload;
pub mod standalone;
pub mod status;
pub mod stop;
pub mod update;

use maxlon::lens::utils::OutputFormat;
use serde::Serialize;

/// Print a serializable value in one of the JSON flavors
pub(crate) fn print_json<T: Serialize>(value: &T, output_format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", output_format.to_json(value)?);
    Ok(())
}

/// Spinner on stderr for slow dataset work; hidden when output is JSON
pub(crate) fn spinner(message: &str, output_format: OutputFormat) -> indicatif::ProgressBar {
    let pb = if output_format.is_json() {
        indicatif::ProgressBar::hidden()
    } else {
        indicatif::ProgressBar::new_spinner()
    };
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
