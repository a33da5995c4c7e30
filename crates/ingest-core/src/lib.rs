//! Live-state persistence for boat telemetry.
//!
//! A sample enters through [`LiveTelemetry::ingest`], is folded into the
//! previous hot state by the engine, and is written to the hot slot and,
//! at most once per remember delay, to the durable log.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

pub use model::{Position, PositionOutOfRange, Sample, State};
pub use state_engine::EngineConfig;

pub mod ops;
pub mod policy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no live state has been recorded yet")]
    NotFound,
    #[error("rejected sample: {0}")]
    InvalidSample(#[from] PositionOutOfRange),
    #[error("hot store: {0}")]
    HotStore(#[source] StoreError),
    #[error("durable log: {0}")]
    DurableStore(#[source] StoreError),
    #[error(
        "durable log failed after the hot slot was written (hot restored: {rolled_back}): {source}"
    )]
    Partial {
        #[source]
        source: StoreError,
        rolled_back: bool,
    },
    #[error("ingest task aborted: {0}")]
    Aborted(String),
}

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveStatus {
    /// Hot slot (maybe) updated, no durable record written.
    #[serde(rename = "temporary saved")]
    TempSaved,
    /// A durable record was appended.
    #[serde(rename = "permanently saved")]
    PermSaved,
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SaveStatus::TempSaved => "temporary saved",
            SaveStatus::PermSaved => "permanently saved",
        })
    }
}

#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// Minimum spacing between durable records.
    pub remember_delay: Duration,
    pub engine: EngineConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { remember_delay: Duration::seconds(60), engine: EngineConfig::default() }
    }
}

/// Single-slot store for the most recent live state.
#[async_trait::async_trait]
pub trait HotStateStore: Send + Sync {
    async fn get(&self) -> Result<Option<State>, StoreError>;
    async fn set(&self, state: &State) -> Result<(), StoreError>;
}

/// Append-only history of live states.
#[async_trait::async_trait]
pub trait DurableLog: Send + Sync {
    async fn latest(&self) -> Result<Option<State>, StoreError>;
    async fn append(&self, state: &State) -> Result<(), StoreError>;
    /// Records created at or after `from`, oldest first.
    async fn since(&self, from: OffsetDateTime) -> Result<Vec<State>, StoreError>;
}

/// Front door for the surrounding service.
///
/// Every read-modify-write of the hot slot runs under one lock, inside a
/// spawned task: a caller that stops polling cannot leave a save half done.
pub struct LiveTelemetry<H: ?Sized, D: ?Sized> {
    hot: Arc<H>,
    durable: Arc<D>,
    cfg: PolicyConfig,
    gate: Arc<Mutex<()>>,
}

impl<H: ?Sized, D: ?Sized> Clone for LiveTelemetry<H, D> {
    fn clone(&self) -> Self {
        Self {
            hot: self.hot.clone(),
            durable: self.durable.clone(),
            cfg: self.cfg.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<H, D> LiveTelemetry<H, D>
where
    H: HotStateStore + ?Sized + 'static,
    D: DurableLog + ?Sized + 'static,
{
    pub fn new(hot: Arc<H>, durable: Arc<D>, cfg: PolicyConfig) -> Self {
        Self { hot, durable, cfg, gate: Arc::new(Mutex::new(())) }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.cfg
    }

    pub async fn ingest(&self, sample: Sample) -> Result<SaveStatus, IngestError> {
        self.exclusive(move |hot, durable, cfg| async move {
            policy::save(&sample, &*hot, &*durable, &cfg).await
        })
        .await
    }

    pub async fn current_state(&self) -> Result<State, IngestError> {
        ops::current_state(&*self.hot).await
    }

    pub async fn set_anchor(&self) -> Result<Position, IngestError> {
        self.exclusive(|hot, _, _| async move { ops::set_anchor(&*hot).await }).await
    }

    pub async fn clear_anchor(&self) -> Result<(), IngestError> {
        self.exclusive(|hot, _, _| async move { ops::clear_anchor(&*hot).await }).await
    }

    pub async fn remove_anchor(&self) -> Result<Option<Position>, IngestError> {
        self.exclusive(|hot, _, _| async move { ops::remove_anchor(&*hot).await }).await
    }

    pub async fn reset_distance(&self) -> Result<(), IngestError> {
        self.exclusive(|hot, _, _| async move { ops::reset_distance(&*hot).await }).await
    }

    pub async fn clear_distance(&self) -> Result<(), IngestError> {
        self.reset_distance().await
    }

    pub async fn history(&self, from: OffsetDateTime) -> Result<Vec<State>, IngestError> {
        self.durable.since(from).await.map_err(IngestError::DurableStore)
    }

    async fn exclusive<T, F, Fut>(&self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce(Arc<H>, Arc<D>, PolicyConfig) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, IngestError>> + Send + 'static,
        T: Send + 'static,
    {
        let gate = self.gate.clone();
        let hot = self.hot.clone();
        let durable = self.durable.clone();
        let cfg = self.cfg.clone();
        let task = tokio::spawn(async move {
            let _held = gate.lock().await;
            f(hot, durable, cfg).await
        });
        task.await.map_err(|e| IngestError::Aborted(e.to_string()))?
    }
}
