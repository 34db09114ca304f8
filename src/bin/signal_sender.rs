/// シグナル送信ツール
///
/// 実行中の team-sort プロセスに任意のシグナルを送る。
/// 振り分けと分類は受信側のルーターが行うので、ここでは送るだけ。

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use team_signal_sort::{SignalAssignmentTable, RECOGNIZED_SIGNALS, TEAM_COUNT};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "signal-sender",
    version,
    about = "Send a signal to a running team-sort process",
    after_help = signal_table()
)]
struct Cli {
    /// Target process id
    #[arg(allow_negative_numbers = true)]
    pid: i32,

    /// Signal number (1-31)
    #[arg(allow_negative_numbers = true)]
    signal: i32,
}

/// Help text listing which team owns each recognized signal
fn signal_table() -> String {
    let table = SignalAssignmentTable::standard();
    let mut lines = vec!["Recognized signals:".to_string()];
    for signal in RECOGNIZED_SIGNALS {
        let owners: Vec<String> = table.owners_of(signal).iter().map(|t| t.to_string()).collect();
        lines.push(format!(
            "  {:>2} {:<8} teams {}",
            signal as i32,
            signal.as_str(),
            owners.join(", ")
        ));
    }
    for team in 0..TEAM_COUNT {
        let names: Vec<&str> = table.signals_of(team).iter().map(|s| s.as_str()).collect();
        lines.push(format!("  Team {}: {}", team, names.join(", ")));
    }
    lines.join("\n")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.pid <= 0 {
        bail!("Invalid PID: {}", cli.pid);
    }
    if !(1..=31).contains(&cli.signal) {
        bail!("Invalid signal number: {} (must be 1-31)", cli.signal);
    }

    let signal = Signal::try_from(cli.signal)
        .with_context(|| format!("Unknown signal number: {}", cli.signal))?;
    kill(Pid::from_raw(cli.pid), signal)
        .with_context(|| format!("Failed to send {} to process {}", signal.as_str(), cli.pid))?;

    info!("Sent signal {} ({}) to process {}", cli.signal, signal.as_str(), cli.pid);
    Ok(())
}
