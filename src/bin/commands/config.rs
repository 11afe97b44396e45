use clap::Args;
use maxlon::lens::utils::OutputFormat;
use maxlon::{format_size, get_dataset_info, DaemonMarker, DatasetFileInfo, MaxlonConfig};
use serde::Serialize;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also show daemon marker and socket state
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: String,
    config: &'a MaxlonConfig,
    dataset: DatasetFileInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    daemon: Option<DaemonInfo>,
}

#[derive(Debug, Serialize)]
struct DaemonInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    socket_exists: bool,
}

pub fn run(config: &MaxlonConfig, args: ConfigArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let ConfigArgs { verbose } = args;

    let daemon = verbose.then(|| DaemonInfo {
        pid: DaemonMarker::new(&config.pid_file).is_live(),
        socket_exists: config.ipc_socket.exists(),
    });

    let info = ConfigInfo {
        config_file: MaxlonConfig::config_file_path(),
        config,
        dataset: get_dataset_info(config),
        daemon,
    };

    if output_format.is_json() {
        return super::print_json(&info, output_format);
    }

    print_config_table(&info);
    Ok(())
}

fn print_config_table(info: &ConfigInfo) {
    println!("Maxlon Configuration");
    println!("====================\n");

    println!("General:");
    println!("  Config file:        {}", info.config_file);
    println!("{}", indent(&info.config.summary()));
    println!();

    println!("Dataset:");
    println!("  Path:               {}", info.dataset.path);
    println!(
        "  Status:             {}",
        if info.dataset.exists {
            "present"
        } else {
            "missing (run `maxlon update`)"
        }
    );
    if let Some(size) = info.dataset.size_bytes {
        println!("  Size:               {}", format_size(size));
    }
    if let Some(modified) = &info.dataset.modified {
        println!("  Modified:           {}", modified);
    }

    if let Some(daemon) = &info.daemon {
        println!();
        println!("Daemon:");
        match daemon.pid {
            Some(pid) => println!("  Status:             running (pid {pid})"),
            None => println!("  Status:             not running"),
        }
        println!(
            "  Socket:             {}",
            if daemon.socket_exists {
                "present"
            } else {
                "absent"
            }
        );
    }

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --verbose (-v) to see daemon state");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Edit ~/.maxlon/maxlon.toml or set MAXLON_* variables to customize settings");
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
