//! Operator resets. They touch only the hot slot.

use tracing::info;

use crate::{HotStateStore, IngestError, Position, State};

async fn load<H: HotStateStore + ?Sized>(hot: &H) -> Result<State, IngestError> {
    hot.get().await.map_err(IngestError::HotStore)?.ok_or(IngestError::NotFound)
}

async fn store<H: HotStateStore + ?Sized>(hot: &H, state: &State) -> Result<(), IngestError> {
    hot.set(state).await.map_err(IngestError::HotStore)
}

pub async fn current_state<H: HotStateStore + ?Sized>(hot: &H) -> Result<State, IngestError> {
    load(hot).await
}

/// Anchor the lap geofence at the current position and restart the lap count.
pub async fn set_anchor<H: HotStateStore + ?Sized>(hot: &H) -> Result<Position, IngestError> {
    let mut st = load(hot).await?;
    let anchor = st.position();
    st.lap_anchor = Some(anchor);
    st.laps = 0;
    store(hot, &st).await?;
    info!(lat = anchor.lat, lng = anchor.lng, "lap anchor set");
    Ok(anchor)
}

pub async fn clear_anchor<H: HotStateStore + ?Sized>(hot: &H) -> Result<(), IngestError> {
    remove_anchor(hot).await.map(|_| ())
}

/// Same as [`clear_anchor`], but hands back the (now absent) anchor.
pub async fn remove_anchor<H: HotStateStore + ?Sized>(
    hot: &H,
) -> Result<Option<Position>, IngestError> {
    let mut st = load(hot).await?;
    st.lap_anchor = None;
    st.laps = 0;
    store(hot, &st).await?;
    info!("lap anchor removed");
    Ok(st.lap_anchor)
}

pub async fn reset_distance<H: HotStateStore + ?Sized>(hot: &H) -> Result<(), IngestError> {
    let mut st = load(hot).await?;
    st.distance_travelled = 0.0;
    store(hot, &st).await?;
    info!(laps = st.laps, "distance reset");
    Ok(())
}

pub async fn clear_distance<H: HotStateStore + ?Sized>(hot: &H) -> Result<(), IngestError> {
    reset_distance(hot).await
}
