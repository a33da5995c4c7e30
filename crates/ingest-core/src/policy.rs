//! Dual-tier write decision: hot slot follows the newest sample, the durable
//! log takes at most one record per remember delay.

use state_engine::derive;
use tracing::{debug, info, warn};

use crate::{
    DurableLog, HotStateStore, IngestError, PolicyConfig, Sample, SaveStatus, State, StoreError,
};

/// Fold `sample` into the hot state and persist it.
///
/// Samples with an impossible position are rejected before any store is
/// touched.
///
/// Callers are responsible for serializing access to the hot slot; see
/// [`crate::LiveTelemetry`].
pub async fn save<H, D>(
    sample: &Sample,
    hot: &H,
    durable: &D,
    cfg: &PolicyConfig,
) -> Result<SaveStatus, IngestError>
where
    H: HotStateStore + ?Sized,
    D: DurableLog + ?Sized,
{
    sample.check_position()?;
    let current = hot.get().await.map_err(IngestError::HotStore)?;

    let Some(current) = current else {
        let state = derive(sample, None, &cfg.engine);
        hot.set(&state).await.map_err(IngestError::HotStore)?;
        if let Err(e) = durable.append(&state).await {
            return Err(unwind(hot, None, e).await);
        }
        info!(at = %state.created_at(), "first live state recorded");
        return Ok(SaveStatus::PermSaved);
    };

    let state = derive(sample, Some(&current), &cfg.engine);
    let hot_written = current.created_at() < sample.created_at;
    if hot_written {
        hot.set(&state).await.map_err(IngestError::HotStore)?;
    }
    let restore = hot_written.then_some(&current);

    let last = match durable.latest().await {
        Ok(last) => last,
        Err(e) if hot_written => return Err(unwind(hot, restore, e).await),
        Err(e) => return Err(IngestError::DurableStore(e)),
    };

    let due = match &last {
        None => true,
        Some(d) => sample.created_at - d.created_at() > cfg.remember_delay,
    };
    if !due {
        debug!(at = %sample.created_at, hot_written, "durable write throttled");
        return Ok(SaveStatus::TempSaved);
    }

    if let Err(e) = durable.append(&state).await {
        if hot_written {
            return Err(unwind(hot, restore, e).await);
        }
        return Err(IngestError::DurableStore(e));
    }
    info!(
        at = %state.created_at(),
        distance = state.distance_travelled,
        laps = state.laps,
        "durable record appended"
    );
    Ok(SaveStatus::PermSaved)
}

/// Put the hot slot back after a durable failure. A slot that was empty
/// before cannot be emptied again, so that case is reported as not restored.
async fn unwind<H>(hot: &H, previous: Option<&State>, source: StoreError) -> IngestError
where
    H: HotStateStore + ?Sized,
{
    let rolled_back = match previous {
        Some(prev) => match hot.set(prev).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not restore hot slot");
                false
            }
        },
        None => false,
    };
    warn!(error = %source, rolled_back, "durable write failed after hot write");
    IngestError::Partial { source, rolled_back }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{sample_at, TestHot, TestLog};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_first_sample_is_baseline_and_permanent() {
        let hot = TestHot::default();
        let log = TestLog::default();
        let cfg = PolicyConfig::default();

        let status = save(&sample_at(0, 59.9, 30.3), &hot, &log, &cfg).await.unwrap();
        assert_eq!(status, SaveStatus::PermSaved);

        let st = hot.slot.lock().clone().unwrap();
        assert_eq!(st.speed, 0.0);
        assert_eq!(st.distance_travelled, 0.0);
        assert_eq!(st.laps, 0);
        assert!(st.lap_anchor.is_none());
        assert_eq!(log.records.lock()[0], st);
    }

    #[tokio::test]
    async fn test_durable_compared_against_its_own_latest() {
        let hot = TestHot::default();
        let log = TestLog::default();
        let cfg = PolicyConfig::default();

        // the log is far behind the hot slot
        log.records.lock().push(State::baseline(sample_at(-600, 59.9, 30.3)));
        *hot.slot.lock() = Some(State::baseline(sample_at(0, 59.9, 30.3)));

        let status = save(&sample_at(10, 59.9, 30.3), &hot, &log, &cfg).await.unwrap();
        assert_eq!(status, SaveStatus::PermSaved);
        assert_eq!(log.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_append_failure_without_hot_write_is_plain() {
        let hot = TestHot::default();
        let log = TestLog::default();
        let cfg = PolicyConfig::default();
        *hot.slot.lock() = Some(State::baseline(sample_at(100, 59.9, 30.3)));
        log.fail_append.store(true, Ordering::SeqCst);

        // older than the hot slot, and the log is empty so an append is due
        let err = save(&sample_at(50, 59.9, 30.3), &hot, &log, &cfg).await.unwrap_err();
        assert!(matches!(err, IngestError::DurableStore(_)));
        assert!(hot.written.lock().is_empty());
    }
}
