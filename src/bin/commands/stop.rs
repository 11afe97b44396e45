use anyhow::anyhow;
use clap::Args;
use maxlon::{DaemonMarker, MaxlonConfig, MaxlonError};
use std::time::{Duration, Instant};

/// Arguments for the Stop command
#[derive(Args)]
pub struct StopArgs {
    /// Seconds to wait for the daemon to exit (0 returns right after signaling)
    #[clap(short, long, default_value_t = 10)]
    pub wait: u64,
}

pub fn run(config: &MaxlonConfig, args: StopArgs) -> anyhow::Result<()> {
    let StopArgs { wait } = args;
    let marker = DaemonMarker::new(&config.pid_file);

    let pid = match marker.signal_stop() {
        Ok(pid) => pid,
        Err(MaxlonError::DaemonNotRunning) => return Err(anyhow!("daemon not running")),
        Err(e) => return Err(e.into()),
    };
    println!("stop signal sent to daemon (pid {pid})");

    if wait == 0 {
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(wait);
    while Instant::now() < deadline {
        if marker.is_live() != Some(pid) {
            println!("daemon stopped");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Err(anyhow!(
        "daemon (pid {pid}) still running after {wait}s"
    ))
}
