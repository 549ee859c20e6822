use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{IngestArgs, resolve_db_path};
use crate::commands::inventory::{TrackFileFilter, file_entry};
use crate::filename::TrackFilenameParser;
use crate::model::{IngestCounts, IngestPaths, IngestRunManifest};
use crate::store::{PointStore, SqliteStore};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::orchestrator::ingest_directory;

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "ingest_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = resolve_db_path(&cache_root, args.db_path.as_ref());
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    info!(
        tracks_dir = %args.tracks_dir.display(),
        db_path = %db_path.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let parser = TrackFilenameParser::new()?;
    let filter = TrackFileFilter::from(&args.filter);

    let mut store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    store.ensure_schema().context("failed to prepare track table")?;

    let report = ingest_directory(&mut store, &args.tracks_dir, &filter, &parser)?;
    let rows_total = store.row_count().context("failed to count stored rows")?;

    let mut source_hashes = Vec::with_capacity(report.imported.len());
    for imported in &report.imported {
        let path = args.tracks_dir.join(&imported.filename);
        match file_entry(&path, &parser) {
            Ok(entry) => source_hashes.push(entry),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to hash imported file"),
        }
    }

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        paths: IngestPaths {
            cache_root: cache_root.display().to_string(),
            tracks_dir: args.tracks_dir.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: IngestCounts {
            candidate_files: report.candidate_files,
            new_tracks: report.new_tracks,
            known_tracks: report.known_tracks,
            failed_files: report.failed_files,
            rows_inserted: report.rows_inserted,
            rows_total,
        },
        imported: report.imported,
        failures: report.failures,
        source_hashes,
    };

    write_json_pretty(&ingest_manifest_path, &manifest)?;

    info!(path = %ingest_manifest_path.display(), "wrote ingest run manifest");
    info!(
        new_tracks = manifest.counts.new_tracks,
        known_tracks = manifest.counts.known_tracks,
        failed_files = manifest.counts.failed_files,
        rows_inserted = manifest.counts.rows_inserted,
        rows_total,
        "ingest completed"
    );

    Ok(())
}
