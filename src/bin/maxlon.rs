#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Parser, Subcommand};
use maxlon::lens::utils::OutputFormat;
use maxlon::MaxlonConfig;
use tracing::Level;

mod commands;

use commands::config::ConfigArgs;
use commands::daemon::DaemonArgs;
use commands::query::QueryArgs;
use commands::standalone::StandaloneArgs;
use commands::stop::StopArgs;
use commands::update::UpdateArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true, args_conflicts_with_subcommands = true)]
struct Cli {
    /// configuration file path, by default $HOME/.maxlon/maxlon.toml is used
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, json-line, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// IP address to look up through the running daemon (shortcut for `query`)
    #[clap(value_name = "IP")]
    ip: Option<String>,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lookup daemon in the foreground (default when no command is given)
    Daemon(DaemonArgs),

    /// Look up an IP address through the running daemon
    Query(QueryArgs),

    /// Look up an IP address by loading the dataset directly, without a daemon
    Standalone(StandaloneArgs),

    /// Show statistics of the running daemon
    Status,

    /// Stop the running daemon
    Stop(StopArgs),

    /// Download a fresh copy of the dataset
    Update(UpdateArgs),

    /// Ask the running daemon to re-read its dataset
    Reload,

    /// Show configuration and dataset file information
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let command = match (cli.command, cli.ip) {
        (Some(command), _) => command,
        (None, Some(ip)) => Commands::Query(QueryArgs { ip }),
        (None, None) => Commands::Daemon(DaemonArgs::default()),
    };

    let level = if cli.debug {
        Level::DEBUG
    } else if matches!(command, Commands::Daemon(_)) {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match MaxlonConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let output_format = cli.format;
    let result = match command {
        Commands::Daemon(args) => commands::daemon::run(&config, args),
        Commands::Query(args) => commands::query::run(&config, args, output_format),
        Commands::Standalone(args) => commands::standalone::run(&config, args, output_format),
        Commands::Status => commands::status::run(&config, output_format),
        Commands::Stop(args) => commands::stop::run(&config, args),
        Commands::Update(args) => commands::update::run(&config, args, output_format),
        Commands::Reload => commands::reload::run(&config, output_format),
        Commands::Config(args) => commands::config::run(&config, args, output_format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}
