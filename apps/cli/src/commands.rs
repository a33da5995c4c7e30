use std::path::Path;

use anyhow::{Context, Result};
use boat_ingest_core::Position;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::session::AppSession;

pub async fn ingest_file(s: &AppSession, path: &Path) -> Result<()> {
    let summary = s.replay(path.to_path_buf()).await?;
    println!(
        "permanent: {}, temporary: {}, skipped: {}",
        summary.permanent, summary.temporary, summary.skipped
    );
    Ok(())
}

pub async fn show_state(s: &AppSession) -> Result<()> {
    let st = s.live.current_state().await?;
    println!("{}", serde_json::to_string_pretty(&st)?);
    Ok(())
}

pub async fn set_anchor(s: &AppSession) -> Result<()> {
    let p = s.live.set_anchor().await?;
    print_anchor(Some(p));
    Ok(())
}

pub async fn clear_anchor(s: &AppSession) -> Result<()> {
    s.live.clear_anchor().await?;
    Ok(())
}

pub async fn remove_anchor(s: &AppSession) -> Result<()> {
    let p = s.live.remove_anchor().await?;
    print_anchor(p);
    Ok(())
}

pub async fn reset_distance(s: &AppSession) -> Result<()> {
    s.live.reset_distance().await?;
    Ok(())
}

pub async fn clear_distance(s: &AppSession) -> Result<()> {
    s.live.clear_distance().await?;
    Ok(())
}

pub async fn export(s: &AppSession, out: &Path, since: Option<&str>) -> Result<()> {
    let from = match since {
        Some(raw) => {
            OffsetDateTime::parse(raw, &Rfc3339).with_context(|| format!("--since {raw}"))?
        }
        None => OffsetDateTime::UNIX_EPOCH,
    };
    let states = s.live.history(from).await?;
    iox::export_history_csv(&states, out)?;
    println!("{} records written to {}", states.len(), out.display());
    Ok(())
}

fn print_anchor(p: Option<Position>) {
    let (lat, lng) = match p {
        Some(p) => (Some(p.lat), Some(p.lng)),
        None => (None, None),
    };
    println!("{}", serde_json::json!({ "lat": lat, "lng": lng }));
}
