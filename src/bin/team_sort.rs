/// チーム並列ソートの実行バイナリ
///
/// 配列サイズとチームあたりのスレッド数を受け取り、4チームで
/// ソートを実行して結果を表示する。
///
/// 例: team-sort 100000 8 --mode bitonic --linger 30

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use team_signal_sort::{Orchestrator, RunConfig, SortMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "team-sort",
    version,
    about = "Sort with four signal-routed thread teams"
)]
struct Cli {
    /// Total number of elements to sort
    array_size: Option<usize>,

    /// Worker threads in each team
    threads_per_team: Option<usize>,

    /// Sort engine: quicksort (per team) or bitonic (cooperative)
    #[arg(long, short = 'm', value_name = "MODE")]
    mode: Option<SortMode>,

    /// Keep workers alive this many seconds after sorting to receive signals
    #[arg(long, short = 'l', value_name = "SECS")]
    linger: Option<u64>,

    /// Seed for the generated workload
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Path to a JSON configuration file
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// File values first, then command-line overrides
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("設定ファイルの読み込みに失敗: {}", path.display()))?,
            None => RunConfig::default(),
        };
        if let Some(size) = self.array_size {
            config.array_size = size;
        }
        if let Some(threads) = self.threads_per_team {
            config.threads_per_team = threads;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(secs) = self.linger {
            config.linger = std::time::Duration::from_secs(secs);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.run_config()?;

    info!("PID: {}", std::process::id());
    let orchestrator = Orchestrator::new(config).context("設定が不正です")?;
    let report = orchestrator.run().context("ソートの実行に失敗")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if !report.all_verified() {
        tracing::warn!("[VERIFY] At least one verification failed");
    }
    info!("[CLEANUP] Done");
    Ok(())
}
