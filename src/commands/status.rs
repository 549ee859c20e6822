use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{StatusArgs, resolve_db_path};
use crate::model::TrackInventoryManifest;
use crate::store::{PointStore, SqliteStore, or_empty};

pub fn run(args: StatusArgs) -> Result<()> {
    let inventory_path = args
        .cache_root
        .join("manifests")
        .join("track_inventory.json");
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());

    info!(cache_root = %args.cache_root.display(), "status requested");

    if inventory_path.exists() {
        let raw = fs::read(&inventory_path)
            .with_context(|| format!("failed to read {}", inventory_path.display()))?;
        let inventory: TrackInventoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", inventory_path.display()))?;

        info!(
            generated_at = %inventory.generated_at,
            source = %inventory.source_directory,
            file_count = inventory.file_count,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let rows = or_empty("row_count", store.row_count());
    let tracks = or_empty("known_track_names", store.known_track_names());

    info!(
        path = %db_path.display(),
        rows,
        tracks = tracks.len(),
        "database status"
    );

    for summary in or_empty("activity_summary", store.activity_summary()) {
        info!(
            activity = %summary.activity_type,
            tracks = summary.tracks,
            rows = summary.rows,
            "activity"
        );
    }

    Ok(())
}
