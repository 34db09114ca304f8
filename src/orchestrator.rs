//! Run orchestration
//!
//! Builds the run context, installs the router, spawns every worker behind
//! the start gate, joins them and tears signal handling down in the order
//! that keeps late deliveries harmless:
//!
//! 1. restore the orchestrator's signal mask (pending signals are routed as
//!    unowned while the handlers are still in place)
//! 2. restore the displaced handlers
//! 3. stop the drain after a final pass

use crate::completion::{CompletionLedger, StartGate};
use crate::config::{RunConfig, SortMode, HIGH_THREAD_COUNT, TEAM_COUNT, VALUE_RANGE};
use crate::drain::{DrainSummary, EventDrain};
use crate::errors::{Result, SortError};
use crate::mask::{MaskGuard, SignalMaskCoordinator};
use crate::partition::contiguous_copy;
use crate::registry::Placement;
use crate::report::{RunReport, SignalSummary, SortOutput, TeamReport};
use crate::router::{RouterShared, SignalRouter};
use crate::signals::SignalAssignmentTable;
use crate::team::{Team, TeamWork};
use crate::worker::{run_worker, CooperativeSort, RunContext, WorkerOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the linger monitor reports the running signal total
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const MONITOR_TICK: Duration = Duration::from_millis(50);

type WorkerHandle = (Placement, JoinHandle<WorkerOutcome>);
type JoinedWorker = (Placement, Option<WorkerOutcome>);

/// Worker thread body handed to a [`Spawner`]
pub type WorkerBody = Box<dyn FnOnce() -> WorkerOutcome + Send + 'static>;

/// Creates worker threads
pub trait Spawner {
    fn spawn(&mut self, name: String, body: WorkerBody) -> io::Result<JoinHandle<WorkerOutcome>>;
}

/// Named OS threads via [`thread::Builder`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&mut self, name: String, body: WorkerBody) -> io::Result<JoinHandle<WorkerOutcome>> {
        thread::Builder::new().name(name).spawn(body)
    }
}

/// Startup failed part-way; the workers already started have been joined
struct AbortedStartup {
    error: SortError,
    joined: Vec<JoinedWorker>,
}

/// Signal handling state held for the duration of one run.
///
/// Teardown follows the numbered order above on every exit path.
struct SignalSession {
    mask: Option<MaskGuard>,
    router: Option<SignalRouter>,
    drain: Option<EventDrain>,
}

impl SignalSession {
    fn open(masks: &SignalMaskCoordinator, config: &RunConfig) -> Result<Self> {
        let mut session = Self {
            mask: Some(masks.block_recognized()?),
            router: None,
            drain: None,
        };
        info!("[SETUP] Recognized signals blocked in the orchestrator thread");

        let router = SignalRouter::install(
            *masks.table(),
            config.total_threads(),
            config.event_capacity,
        )?;
        let shared = router.shared().clone();
        session.router = Some(router);
        session.drain = Some(EventDrain::spawn(shared, config.drain_interval)?);
        Ok(session)
    }

    fn received(&self) -> u64 {
        self.router.as_ref().map_or(0, SignalRouter::received)
    }

    /// Tear down and return the final total plus everything drained.
    ///
    /// The total is taken once no more deliveries can be routed, and never
    /// trails the running total of the last drained record.
    fn close(mut self) -> (u64, DrainSummary) {
        self.restore_mask();
        let shared = self.router.as_ref().map(|router| router.shared().clone());
        if let Some(router) = self.router.take() {
            router.uninstall();
        }
        let summary = self.drain.take().map(EventDrain::finish).unwrap_or_default();

        let received = shared.map_or(0, |shared| shared.received());
        let last = summary.records.last().map_or(0, |record| record.total);
        (received.max(last), summary)
    }

    fn restore_mask(&mut self) {
        if let Some(mask) = self.mask.take() {
            info!("[CLEANUP] Restoring original signal mask...");
            if let Err(e) = mask.restore() {
                warn!("[CLEANUP] {}", e);
            }
        }
    }
}

impl Drop for SignalSession {
    fn drop(&mut self) {
        self.restore_mask();
        drop(self.router.take());
        drop(self.drain.take());
    }
}

/// Entry point for one run
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: RunConfig,
    table: SignalAssignmentTable,
}

impl Orchestrator {
    /// Validate `config` and use the standard signal assignments
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            table: SignalAssignmentTable::standard(),
        })
    }

    pub fn with_table(mut self, table: SignalAssignmentTable) -> Self {
        self.table = table;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn table(&self) -> &SignalAssignmentTable {
        &self.table
    }

    /// Uniform values in `0..VALUE_RANGE`, reproducible when a seed is set
    pub fn generate_values(&self) -> Vec<i32> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..self.config.array_size)
            .map(|_| rng.gen_range(0..VALUE_RANGE))
            .collect()
    }

    /// Run on a generated workload
    pub fn run(&self) -> Result<RunReport> {
        let values = self.generate_values();
        info!("[INIT] Generated {} random values", values.len());
        self.run_with_values(values)
    }

    /// Run on the given workload; its length must equal the configured size
    pub fn run_with_values(&self, values: Vec<i32>) -> Result<RunReport> {
        self.run_with_spawner(values, &mut ThreadSpawner)
    }

    /// Like [`run_with_values`](Self::run_with_values), creating workers
    /// through `spawner`
    pub fn run_with_spawner<S: Spawner>(
        &self,
        values: Vec<i32>,
        spawner: &mut S,
    ) -> Result<RunReport> {
        if values.len() != self.config.array_size {
            return Err(SortError::InvalidConfig(format!(
                "workload has {} values, configuration expects {}",
                values.len(),
                self.config.array_size
            )));
        }
        let total_threads = self.config.total_threads();
        if self.config.mode == SortMode::Bitonic && total_threads == 0 {
            return Err(SortError::Barrier("cooperative sort needs at least one thread".into()));
        }
        self.log_setup();

        let masks = SignalMaskCoordinator::new(self.table);
        let session = SignalSession::open(&masks, &self.config)?;
        let router = match session.router.as_ref() {
            Some(router) => router.shared().clone(),
            None => return Err(SortError::InvalidConfig("signal router missing".into())),
        };

        let ctx = Arc::new(self.build_context(&values, router));
        drop(values);

        let started = Instant::now();
        let handles = match spawn_roster(&ctx, spawner) {
            Ok(handles) => handles,
            Err(aborted) => {
                for outcome in aborted.joined.iter().filter_map(|(_, outcome)| outcome.as_ref()) {
                    ctx.router.registry().unregister(outcome.tid);
                }
                return Err(aborted.error);
            }
        };
        ctx.gate.open();
        info!("[READY] All {} threads released", handles.len());
        info!(
            "[INFO] Send signals with: kill -<signal> {}",
            std::process::id()
        );

        if !self.config.linger.is_zero() {
            monitor(&handles, &session);
        }

        let joined = join_roster(handles);
        let total_elapsed = started.elapsed();

        let mut workers = Vec::with_capacity(joined.len());
        let mut panicked = None;
        for (placement, outcome) in joined {
            match outcome {
                Some(outcome) => {
                    ctx.router.registry().unregister(outcome.tid);
                    workers.push(outcome);
                }
                None => {
                    panicked.get_or_insert(placement);
                }
            }
        }

        let (received, drained) = session.close();
        if let Some(placement) = panicked {
            return Err(SortError::WorkerPanicked {
                team: placement.team,
                index: placement.index,
            });
        }

        Ok(build_report(&ctx, workers, total_elapsed, SignalSummary::new(received, drained)))
    }

    fn log_setup(&self) {
        let config = &self.config;
        info!(
            "[INIT] Configuration: {} elements, {} teams x {} threads ({} total), mode {}",
            config.array_size,
            TEAM_COUNT,
            config.threads_per_team,
            config.total_threads(),
            config.mode
        );
        if config.total_threads() > HIGH_THREAD_COUNT {
            warn!(
                "[INIT] {} threads requested; this may exhaust system resources",
                config.total_threads()
            );
        }
        for team in 0..TEAM_COUNT {
            let names: Vec<&str> = self.table.signals_of(team).iter().map(|s| s.as_str()).collect();
            info!("[INIT] Team {} signals: {}", team, names.join(", "));
        }
    }

    fn build_context(&self, values: &[i32], router: Arc<RouterShared>) -> RunContext {
        RunContext {
            config: self.config.clone(),
            router,
            masks: SignalMaskCoordinator::new(self.table),
            teams: self.build_teams(values),
            ledger: CompletionLedger::with_capacity(TEAM_COUNT),
            gate: StartGate::new(),
            cooperative: match self.config.mode {
                SortMode::Bitonic => {
                    Some(CooperativeSort::new(values, self.config.total_threads()))
                }
                SortMode::Quicksort => None,
            },
        }
    }

    fn build_teams(&self, values: &[i32]) -> Vec<Team> {
        let threads = self.config.threads_per_team;
        match self.config.mode {
            SortMode::Quicksort => contiguous_copy(values, TEAM_COUNT)
                .into_iter()
                .map(|slice| {
                    debug!("[INIT] Team {} owns {:?}", slice.team, slice.range());
                    Team::new(slice.team, &self.table, threads, TeamWork::Owned(Mutex::new(slice)))
                })
                .collect(),
            SortMode::Bitonic => (0..TEAM_COUNT)
                .map(|team| Team::new(team, &self.table, threads, TeamWork::Shared))
                .collect(),
        }
    }
}

/// Spawn every worker. On failure the gate is aborted and the threads
/// already started are joined before the error is returned.
fn spawn_roster<S: Spawner>(
    ctx: &Arc<RunContext>,
    spawner: &mut S,
) -> std::result::Result<Vec<WorkerHandle>, AbortedStartup> {
    let mut handles = Vec::with_capacity(ctx.config.total_threads());
    for team in 0..TEAM_COUNT {
        for index in 0..ctx.config.threads_per_team {
            let placement = Placement::new(team, index);
            let worker_ctx = Arc::clone(ctx);
            let spawned = spawner.spawn(
                format!("team{}-{}", team, index),
                Box::new(move || run_worker(&worker_ctx, placement)),
            );

            match spawned {
                Ok(handle) => handles.push((placement, handle)),
                Err(source) => {
                    error!(
                        "[ERROR] Failed to create thread {} for team {}: {}",
                        index, team, source
                    );
                    ctx.gate.abort();
                    let joined = join_roster(handles);
                    debug!("[CLEANUP] Joined {} threads after aborted startup", joined.len());
                    return Err(AbortedStartup {
                        error: SortError::Spawn { team, index, source },
                        joined,
                    });
                }
            }
        }
        info!("[INIT] Team {} spawned", team);
    }
    Ok(handles)
}

/// Join every handle; a panicked worker yields `None`
fn join_roster(handles: Vec<WorkerHandle>) -> Vec<JoinedWorker> {
    handles
        .into_iter()
        .map(|(placement, handle)| match handle.join() {
            Ok(outcome) => {
                debug!(
                    "[JOINED] Team {} thread {} (tid {})",
                    placement.team, placement.index, outcome.tid
                );
                (placement, Some(outcome))
            }
            Err(_) => {
                error!("[JOINED] Team {} thread {} panicked", placement.team, placement.index);
                (placement, None)
            }
        })
        .collect()
}

/// Report the running signal total while workers linger
fn monitor(handles: &[WorkerHandle], session: &SignalSession) {
    info!("[SIGNAL_TEST] Monitoring signals until every worker exits");
    let mut last_report = Instant::now();
    while !handles.iter().all(|(_, handle)| handle.is_finished()) {
        thread::sleep(MONITOR_TICK);
        if last_report.elapsed() >= MONITOR_INTERVAL {
            info!("[MONITOR] Signals received so far: {}", session.received());
            last_report = Instant::now();
        }
    }
}

fn build_report(
    ctx: &RunContext,
    workers: Vec<WorkerOutcome>,
    total_elapsed: Duration,
    signals: SignalSummary,
) -> RunReport {
    let config = &ctx.config;
    let teams = ctx
        .teams
        .iter()
        .map(|team| TeamReport {
            team: team.id,
            signals: team.signals.iter().map(|s| s.as_str().to_string()).collect(),
            members: team.members(),
            elements: team.elements(),
            completed: team.is_completed(),
            elapsed: team.elapsed(),
            verification: team.verification(),
            mask_failures: workers
                .iter()
                .filter(|w| w.placement.team == team.id)
                .map(|w| w.mask_failures)
                .sum(),
        })
        .collect();

    let output = match &ctx.cooperative {
        Some(coop) => SortOutput::Padded {
            values: coop.array.to_vec(),
            logical_len: coop.array.logical_len(),
        },
        None => {
            SortOutput::Partitioned(ctx.teams.iter().filter_map(Team::slice_snapshot).collect())
        }
    };

    RunReport {
        pid: std::process::id(),
        mode: config.mode,
        array_size: config.array_size,
        threads_per_team: config.threads_per_team,
        total_threads: config.total_threads(),
        total_elapsed,
        ledger: ctx.ledger.slots(),
        ledger_dropped: ctx.ledger.dropped(),
        teams,
        cooperative_verification: ctx.cooperative.as_ref().and_then(CooperativeSort::verification),
        workers,
        signals,
        output,
    }
}
