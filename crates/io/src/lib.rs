use anyhow::{Context, Result};
use boat_ingest_core::{DurableLog, HotStateStore, StoreError};
use model::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Well-known key of the single hot slot.
pub const CURRENT_STATE_KEY: &str = "current_state";

#[derive(Default)]
pub struct MemoryHotStore {
    slot: Mutex<Option<State>>,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HotStateStore for MemoryHotStore {
    async fn get(&self) -> Result<Option<State>, StoreError> {
        Ok(self.slot.lock().clone())
    }

    async fn set(&self, state: &State) -> Result<(), StoreError> {
        *self.slot.lock() = Some(state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLog {
    records: Mutex<Vec<State>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl DurableLog for MemoryLog {
    async fn latest(&self) -> Result<Option<State>, StoreError> {
        Ok(self.records.lock().last().cloned())
    }

    async fn append(&self, state: &State) -> Result<(), StoreError> {
        self.records.lock().push(state.clone());
        Ok(())
    }

    async fn since(&self, from: OffsetDateTime) -> Result<Vec<State>, StoreError> {
        Ok(self.records.lock().iter().filter(|s| s.created_at() >= from).cloned().collect())
    }
}

/// Hot slot kept as one JSON document, `<dir>/current_state.json`.
pub struct JsonFileHotStore {
    path: PathBuf,
    write: tokio::sync::Mutex<()>,
}

impl JsonFileHotStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{CURRENT_STATE_KEY}.json")),
            write: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl HotStateStore for JsonFileHotStore {
    async fn get(&self) -> Result<Option<State>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, state: &State) -> Result<(), StoreError> {
        let _held = self.write.lock().await;
        let body = serde_json::to_vec(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct LogRecord {
    #[serde(with = "uuid::serde::simple")]
    id: Uuid,
    state: State,
}

/// Durable log as an append-only NDJSON file.
pub struct NdjsonLog {
    path: PathBuf,
    inner: tokio::sync::Mutex<LogTail>,
}

struct LogTail {
    latest: Option<State>,
    /// False while the file may end in a partial line from a failed append.
    clean: bool,
}

impl NdjsonLog {
    /// Open (or start) the log at `path`, replaying it to find the latest record.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let latest = match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                repair_tail(&path, &text).await?;
                parse_records(&text).pop()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(Self {
            path,
            inner: tokio::sync::Mutex::new(LogTail { latest, clean: true }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Make the file end on a line boundary. An unterminated last line is
/// either a whole record missing its newline (terminated here) or a torn
/// write (cut off).
async fn repair_tail(path: &Path, text: &str) -> Result<()> {
    if text.is_empty() || text.ends_with('\n') {
        return Ok(());
    }
    let cut = text.rfind('\n').map_or(0, |i| i + 1);
    let tail = &text[cut..];
    if serde_json::from_str::<LogRecord>(tail).is_ok() {
        let mut f = tokio::fs::OpenOptions::new().append(true).open(path).await?;
        f.write_all(b"\n").await?;
        f.sync_data().await?;
    } else {
        warn!(path = %path.display(), bytes = tail.len(), "truncating torn log record");
        let f = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        f.set_len(cut as u64).await?;
        f.sync_data().await?;
    }
    Ok(())
}

fn parse_records(text: &str) -> Vec<State> {
    let mut out = vec![];
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(r) => out.push(r.state),
            Err(err) => warn!(line = n + 1, %err, "skipping malformed log record"),
        }
    }
    out
}

#[async_trait::async_trait]
impl DurableLog for NdjsonLog {
    async fn latest(&self) -> Result<Option<State>, StoreError> {
        Ok(self.inner.lock().await.latest.clone())
    }

    async fn append(&self, state: &State) -> Result<(), StoreError> {
        let mut tail = self.inner.lock().await;
        let record = LogRecord { id: Uuid::new_v4(), state: state.clone() };
        let mut line = String::new();
        if !tail.clean {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&record)?);
        line.push('\n');
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        tail.clean = false;
        f.write_all(line.as_bytes()).await?;
        f.sync_data().await?;
        tail.clean = true;
        tail.latest = Some(record.state);
        Ok(())
    }

    async fn since(&self, from: OffsetDateTime) -> Result<Vec<State>, StoreError> {
        let _held = self.inner.lock().await;
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_records(&text).into_iter().filter(|s| s.created_at() >= from).collect())
    }
}

/// Parse recorded samples, one JSON object per line. Blank lines are skipped.
pub fn read_samples<R: BufRead>(rdr: R) -> impl Iterator<Item = Result<Sample>> {
    rdr.lines().enumerate().filter_map(|(n, line)| match line {
        Ok(s) if s.trim().is_empty() => None,
        Ok(s) => {
            let parsed = serde_json::from_str::<Sample>(&s);
            Some(parsed.with_context(|| format!("sample on line {}", n + 1)))
        }
        Err(e) => Some(Err(e.into())),
    })
}

pub fn import_samples_ndjson(path: &Path) -> Result<Vec<Sample>> {
    let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_samples(std::io::BufReader::new(f)).collect()
}

pub fn export_history_csv(states: &[State], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    for s in states {
        w.serialize(CsvRow {
            created_at: s.created_at().format(&Rfc3339)?,
            controller_watts: s.sample.controller_watts,
            time_to_go: s.sample.time_to_go,
            controller_volts: s.sample.controller_volts,
            mppt_volts: s.sample.mppt_volts,
            mppt_watts: s.sample.mppt_watts,
            motor_temp: s.sample.motor_temp,
            motor_revolutions: s.sample.motor_revolutions,
            position_lat: s.sample.position_lat,
            position_lng: s.sample.position_lng,
            speed: s.speed,
            distance_travelled: s.distance_travelled,
            laps: s.laps,
            lap_anchor_lat: s.lap_anchor.map(|p| p.lat),
            lap_anchor_lng: s.lap_anchor.map(|p| p.lng),
        })?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct CsvRow {
    created_at: String,
    controller_watts: i32, time_to_go: i64,
    controller_volts: f64, mppt_volts: f64, mppt_watts: f64,
    motor_temp: f64, motor_revolutions: f64,
    position_lat: f64, position_lng: f64,
    speed: f64, distance_travelled: f64, laps: u32,
    lap_anchor_lat: Option<f64>, lap_anchor_lng: Option<f64>,
}
