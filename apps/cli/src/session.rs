use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc, thread};

use anyhow::{anyhow, Context, Result};
use boat_ingest_core::{DurableLog, HotStateStore, LiveTelemetry, SaveStatus};
use iox::{JsonFileHotStore, MemoryHotStore, MemoryLog, NdjsonLog};
use model::Sample;
use tracing::{error, info, warn};

use crate::config::AppConfig;

pub type Live = LiveTelemetry<dyn HotStateStore, dyn DurableLog>;

pub const HISTORY_FILE: &str = "telemetry.ndjson";

pub struct AppSession {
    pub live: Live,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplaySummary {
    pub permanent: usize,
    pub temporary: usize,
    pub skipped: usize,
}

impl AppSession {
    /// File-backed stores under the configured data dir, or memory stores
    /// when `ephemeral` is set.
    pub async fn open(cfg: AppConfig, ephemeral: bool) -> Result<Self> {
        let (hot, durable): (Arc<dyn HotStateStore>, Arc<dyn DurableLog>) = if ephemeral {
            (Arc::new(MemoryHotStore::new()), Arc::new(MemoryLog::new()))
        } else {
            std::fs::create_dir_all(&cfg.data_dir)
                .with_context(|| format!("create {}", cfg.data_dir.display()))?;
            let log = NdjsonLog::open(cfg.data_dir.join(HISTORY_FILE)).await?;
            (Arc::new(JsonFileHotStore::new(&cfg.data_dir)), Arc::new(log))
        };
        info!(data_dir = %cfg.data_dir.display(), ephemeral, "stores opened");
        Ok(Self { live: LiveTelemetry::new(hot, durable, cfg.policy) })
    }

    /// Replay a recorded NDJSON sample file: a reader thread feeds a channel,
    /// a blocking pump pushes each sample through the live service.
    /// Stops at the first store failure.
    pub async fn replay(&self, path: PathBuf) -> Result<ReplaySummary> {
        let (tx, rx) = crossbeam_channel::bounded::<Result<Sample>>(256);
        let reader = thread::spawn(move || -> Result<()> {
            let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
            for item in iox::read_samples(BufReader::new(f)) {
                if tx.send(item).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let live = self.live.clone();
        let rt = tokio::runtime::Handle::current();
        let pumped = tokio::task::spawn_blocking(move || -> Result<ReplaySummary> {
            let mut summary = ReplaySummary::default();
            for item in rx.iter() {
                let sample = match item {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "skipping sample");
                        summary.skipped += 1;
                        continue;
                    }
                };
                let at = sample.created_at;
                match rt.block_on(live.ingest(sample)) {
                    Ok(status) => {
                        println!("{at}\t{status}");
                        match status {
                            SaveStatus::PermSaved => summary.permanent += 1,
                            SaveStatus::TempSaved => summary.temporary += 1,
                        }
                    }
                    Err(e) => {
                        error!(error = %e, %at, "ingest failed");
                        return Err(e.into());
                    }
                }
            }
            Ok(summary)
        })
        .await??;

        reader.join().map_err(|_| anyhow!("sample reader panicked"))??;
        info!(?pumped, "replay finished");
        Ok(pumped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(secs: i64, lat: f64) -> String {
        let t = time::OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1_717_243_200 + secs);
        let s = Sample {
            created_at: t,
            controller_watts: 600,
            time_to_go: 900,
            controller_volts: 47.0,
            mppt_volts: 50.0,
            mppt_watts: 240.0,
            motor_temp: 36.0,
            motor_revolutions: 950.0,
            position_lat: lat,
            position_lng: 30.3,
        };
        serde_json::to_string(&s).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replay_file_backed() {
        let dir = std::env::temp_dir().join(format!("boat-live-{}", uuid::Uuid::new_v4()));
        let cfg = AppConfig::from_lookup(|k| {
            (k == "BOAT_DATA_DIR").then(|| dir.to_string_lossy().into_owned())
        });
        let session = AppSession::open(cfg, false).await.unwrap();

        let input = dir.join("input.ndjson");
        let text = [
            line(0, 59.90),
            line(30, 59.91),
            "not json".into(),
            line(90, 59.92),
        ]
        .join("\n");
        std::fs::write(&input, text).unwrap();

        let summary = session.replay(input).await.unwrap();
        assert_eq!(summary, ReplaySummary { permanent: 2, temporary: 1, skipped: 1 });

        let cur = session.live.current_state().await.unwrap();
        assert_eq!(cur.sample.position_lat, 59.92);
        let history = std::fs::read_to_string(dir.join(HISTORY_FILE)).unwrap();
        assert_eq!(history.lines().count(), 2);
        std::fs::remove_dir_all(dir).ok();
    }
}
