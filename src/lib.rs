//! team-signal-sort ライブラリのルートモジュール
//!
//! スレッドをチームに分け、チームごとに割り当てたシグナルを
//! 受信スレッドへ振り分けながら並列ソートを実行する。
//!
//! ```no_run
//! use team_signal_sort::{Orchestrator, RunConfig, SortMode};
//!
//! let config = RunConfig::new(10_000, 4, SortMode::Quicksort);
//! let report = Orchestrator::new(config)?.run()?;
//! println!("{}", report);
//! # Ok::<(), team_signal_sort::SortError>(())
//! ```

pub mod completion;
pub mod config;
pub mod drain;
pub mod errors;
pub mod events;
pub mod mask;
pub mod orchestrator;
pub mod partition;
pub mod registry;
pub mod report;
pub mod router;
pub mod signals;
pub mod sort;
pub mod team;
pub mod worker;

pub use config::{RunConfig, SortMode, TEAM_COUNT};
pub use errors::{ErrorContext, Result, SortError};
pub use orchestrator::Orchestrator;
pub use report::RunReport;
pub use signals::{SignalAssignmentTable, TeamId, RECOGNIZED_SIGNALS};
