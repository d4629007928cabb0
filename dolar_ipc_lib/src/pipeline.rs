//! Per-source Fetch → Load → Scan pipeline.
//!
//! Every configured source runs as its own tokio task. Inside a task the
//! stages are strictly sequential: loading reads the snapshot file the fetch
//! stage wrote, scanning starts after the load transaction committed. A
//! failing source never stops or rolls back the others.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use datosgob_api::{Client, EndpointSpec};
use serde::Serialize;
use tokio::task::{self, JoinSet};

use crate::anomaly::{self, AnomalyReport};
use crate::config::{Config, SourceConfig};
use crate::db::{Db, LoadOutcome};
use crate::error::{FailureKind, PipelineError};
use crate::loader;
use crate::retry::{attempt, RetryPolicy};
use crate::snapshot::{write_snapshot, Snapshot};

/// Where a source's pipeline is, or where it ended.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Loading,
    Scanning,
    Done,
    Failed(FailureKind),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetching => f.write_str("fetching"),
            Stage::Loading => f.write_str("loading"),
            Stage::Scanning => f.write_str("scanning"),
            Stage::Done => f.write_str("done"),
            Stage::Failed(kind) => write!(f, "failed ({})", kind),
        }
    }
}

/// The logical date a run stands for. Drives the date window and the
/// snapshot path, so re-running the same logical date is idempotent.
#[derive(Clone, Copy, Debug)]
pub struct RunContext {
    pub logical_date: NaiveDateTime,
}

impl RunContext {
    pub fn new(logical_date: NaiveDateTime) -> Self {
        Self { logical_date }
    }

    pub fn now() -> Self {
        Self::new(Utc::now().naive_utc())
    }
}

/// Result of one source's pipeline.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub snapshot_path: PathBuf,
    /// Every stage entered, in order. The last one is terminal.
    pub stages: Vec<Stage>,
    /// Rows in the fetched snapshot.
    pub fetched: Option<usize>,
    pub load: Option<LoadOutcome>,
    pub report: Option<AnomalyReport>,
    pub error: Option<PipelineError>,
}

impl SourceOutcome {
    fn new(spec: &EndpointSpec) -> Self {
        Self {
            source: spec.name.clone(),
            snapshot_path: spec.save_path.clone(),
            stages: Vec::new(),
            fetched: None,
            load: None,
            report: None,
            error: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Fetching)
    }

    pub fn succeeded(&self) -> bool {
        self.stage() == Stage::Done
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(PipelineError::kind)
    }

    fn enter(&mut self, stage: Stage) {
        tracing::info!("{}: {}", self.source, stage);
        self.stages.push(stage);
    }

    fn aborted(spec: &EndpointSpec, message: String) -> Self {
        Self::new(spec).fail(PipelineError::Internal(message))
    }

    fn fail(mut self, err: PipelineError) -> Self {
        let during = self.stage();
        tracing::error!("{}: {} failed: {}", self.source, during, err);
        self.stages.push(Stage::Failed(err.kind()));
        self.error = Some(err);
        self
    }
}

/// Outcomes of every source of one run, in configuration order.
#[derive(Debug)]
pub struct RunSummary {
    pub logical_date: NaiveDateTime,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(SourceOutcome::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn inserted_total(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.load)
            .map(|l| l.inserted)
            .sum()
    }

    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }
}

/// Database location and scan parameters shared by the load and scan stages.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub table: String,
    pub threshold: f64,
    pub busy_timeout: Duration,
}

impl StoreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            db_path: config.database.database_path(),
            table: config.pipeline.table.clone(),
            threshold: config.pipeline.threshold,
            busy_timeout: config.pipeline.busy_timeout(),
        }
    }

    pub fn open(&self) -> Result<Db, PipelineError> {
        Db::open_with_timeout(&self.db_path, self.busy_timeout)
    }

    /// Scans `table` without creating the database file. A database that
    /// does not exist yet holds no anomalies.
    pub fn scan(&self, table: &str, threshold: f64) -> Result<AnomalyReport, PipelineError> {
        match Db::open_existing(&self.db_path, self.busy_timeout)? {
            Some(db) => anomaly::scan(&db, table, threshold),
            None => anomaly::scan(&Db::open_in_memory()?, table, threshold),
        }
    }
}

/// Fetches one series and persists it as a snapshot file.
///
/// Nothing is written when the request or the payload shape fails.
pub async fn fetch_and_store(client: &Client, spec: &EndpointSpec) -> Result<Snapshot, PipelineError> {
    let payload = client.get_series(spec).await?;
    let snapshot = Snapshot::from_payload(&payload, &spec.columns)?;
    write_snapshot(&snapshot, &spec.save_path)?;
    tracing::info!(
        "{}: fetched {} rows into {}",
        spec.name,
        snapshot.len(),
        spec.save_path.display()
    );
    Ok(snapshot)
}

async fn run_blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(format!("blocking task failed: {}", e)))?
}

/// Runs Fetch → Load → Scan for every configured source.
pub struct PipelineRunner<P> {
    client: Arc<Client>,
    store: Arc<StoreSettings>,
    data_dir: PathBuf,
    sources: Vec<SourceConfig>,
    policy: Arc<P>,
}

impl<P: RetryPolicy + 'static> PipelineRunner<P> {
    pub fn new(
        client: Client,
        store: StoreSettings,
        data_dir: PathBuf,
        sources: Vec<SourceConfig>,
        policy: P,
    ) -> Self {
        Self {
            client: Arc::new(client),
            store: Arc::new(store),
            data_dir,
            sources,
            policy: Arc::new(policy),
        }
    }

    pub fn from_config(config: &Config, policy: P) -> Result<Self, PipelineError> {
        let client =
            Client::with_timeout(&config.pipeline.base_url, config.pipeline.request_timeout())?;
        Ok(Self::new(
            client,
            StoreSettings::from_config(config),
            config.pipeline.data_dir.clone(),
            config.sources.clone(),
            policy,
        ))
    }

    /// Restricts the run to `sources`.
    pub fn with_sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    pub fn endpoint_specs(&self, ctx: &RunContext) -> Vec<EndpointSpec> {
        self.sources
            .iter()
            .map(|s| s.endpoint_spec(&self.data_dir, ctx.logical_date))
            .collect()
    }

    /// Runs every source concurrently and waits for all of them.
    pub async fn run(&self, ctx: &RunContext) -> RunSummary {
        tracing::info!(
            "Starting run for {} ({} sources, table {})",
            ctx.logical_date,
            self.sources.len(),
            self.store.table
        );

        let specs = self.endpoint_specs(ctx);
        let mut set = JoinSet::new();
        let mut slots = HashMap::with_capacity(specs.len());
        for (idx, spec) in specs.iter().enumerate() {
            let job = SourceJob {
                client: Arc::clone(&self.client),
                store: Arc::clone(&self.store),
                policy: Arc::clone(&self.policy),
                spec: spec.clone(),
            };
            let handle = set.spawn(job.execute());
            slots.insert(handle.id(), idx);
        }
        let outcomes = join_outcomes(set, &slots, &specs).await;

        let summary = RunSummary {
            logical_date: ctx.logical_date,
            outcomes,
        };
        tracing::info!(
            "Run for {} finished: {} inserted, {} of {} sources failed",
            ctx.logical_date,
            summary.inserted_total(),
            summary.failed().count(),
            summary.outcomes.len()
        );
        summary
    }
}

/// Collects every task's outcome in source order. A task that panicked or
/// was cancelled still yields an outcome, failed as `Internal`.
async fn join_outcomes(
    mut set: JoinSet<SourceOutcome>,
    slots: &HashMap<task::Id, usize>,
    specs: &[EndpointSpec],
) -> Vec<SourceOutcome> {
    let mut outcomes: Vec<Option<SourceOutcome>> = specs.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, Ok(outcome)),
            Err(e) => (e.id(), Err(e)),
        };
        let Some(&idx) = slots.get(&id) else {
            tracing::error!("Unknown source task {} finished", id);
            continue;
        };
        outcomes[idx] = Some(match outcome {
            Ok(outcome) => outcome,
            Err(e) => SourceOutcome::aborted(&specs[idx], format!("source task aborted: {}", e)),
        });
    }
    outcomes
        .into_iter()
        .zip(specs)
        .map(|(outcome, spec)| {
            outcome.unwrap_or_else(|| SourceOutcome::aborted(spec, "source task never finished".to_string()))
        })
        .collect()
}

/// Everything one source task owns.
struct SourceJob<P> {
    client: Arc<Client>,
    store: Arc<StoreSettings>,
    policy: Arc<P>,
    spec: EndpointSpec,
}

impl<P: RetryPolicy + 'static> SourceJob<P> {
    async fn execute(self) -> SourceOutcome {
        let client = self.client.as_ref();
        let policy = self.policy.as_ref();
        let spec = &self.spec;
        let mut outcome = SourceOutcome::new(spec);

        outcome.enter(Stage::Fetching);
        let label = format!("{} fetch", spec.name);
        match attempt(policy, &label, move || async move { fetch_and_store(client, spec).await }).await {
            Ok(snapshot) => outcome.fetched = Some(snapshot.len()),
            Err(e) => return outcome.fail(e),
        }

        outcome.enter(Stage::Loading);
        let label = format!("{} load", spec.name);
        let loaded = attempt(policy, &label, || {
            let store = Arc::clone(&self.store);
            let path = spec.save_path.clone();
            async move {
                run_blocking(move || {
                    let mut db = store.open()?;
                    loader::load(&mut db, &path, &store.table)
                })
                .await
            }
        })
        .await;
        match loaded {
            Ok(load) => outcome.load = Some(load),
            Err(e) => return outcome.fail(e),
        }

        outcome.enter(Stage::Scanning);
        let label = format!("{} scan", spec.name);
        let scanned = attempt(policy, &label, || {
            let store = Arc::clone(&self.store);
            async move {
                run_blocking(move || store.scan(&store.table, store.threshold))
                .await
            }
        })
        .await;
        match scanned {
            Ok(report) => outcome.report = Some(report),
            Err(e) => return outcome.fail(e),
        }

        outcome.enter(Stage::Done);
        outcome
    }
}
