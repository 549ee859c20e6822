use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::commands::inventory::{TrackFileFilter, list_track_files};
use crate::filename::TrackFilenameParser;
use crate::gpx::parse_gpx_file;
use crate::model::{FileFailure, ImportedTrack, TrackRecord};
use crate::store::PointStore;

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub candidate_files: usize,
    pub new_tracks: usize,
    pub known_tracks: usize,
    pub failed_files: usize,
    pub rows_inserted: usize,
    pub imported: Vec<ImportedTrack>,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    fn record_failure(&mut self, filename: &str, reason: String) {
        warn!(filename = %filename, reason = %reason, "skipping track file");
        self.failed_files += 1;
        self.failures.push(FileFailure {
            filename: filename.to_string(),
            reason,
        });
    }
}

/// Imports every track file in `tracks_dir` whose track name is not already stored.
///
/// Files are handled independently: an unrecognised file name or unparsable content
/// is reported and the batch moves on. Store failures end the run, since continuing
/// without the known-name set would import duplicates.
pub fn ingest_directory<S>(
    store: &mut S,
    tracks_dir: &Path,
    filter: &TrackFileFilter,
    parser: &TrackFilenameParser,
) -> Result<IngestReport>
where
    S: PointStore + ?Sized,
{
    let files = list_track_files(tracks_dir, filter)?;
    let mut known = store
        .known_track_names()
        .context("failed to load known track names")?;

    info!(
        path = %tracks_dir.display(),
        candidate_files = files.len(),
        known_tracks = known.len(),
        "scanning track files"
    );

    let mut report = IngestReport {
        candidate_files: files.len(),
        ..IngestReport::default()
    };

    for path in &files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let metadata = match parser.parse(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                report.record_failure(&filename, err.to_string());
                continue;
            }
        };

        if known.contains(&metadata.track_name) {
            debug!(track = %metadata.track_name, "track already stored");
            report.known_tracks += 1;
            continue;
        }

        let points = match parse_gpx_file(path) {
            Ok(points) => points,
            Err(err) => {
                report.record_failure(&filename, err.to_string());
                continue;
            }
        };

        let record = TrackRecord {
            track_name: metadata.track_name,
            activity_type: metadata.activity,
            capture_date: metadata.capture_date,
            points,
        };

        let rows = store
            .insert_track(&record)
            .with_context(|| format!("failed to store track from {}", path.display()))?;

        debug!(
            source = %metadata.source_tag,
            track = %record.track_name,
            activity = %record.activity_type,
            rows,
            "imported track"
        );

        report.new_tracks += 1;
        report.rows_inserted += rows;
        report.imported.push(ImportedTrack {
            filename,
            track_name: record.track_name.clone(),
            activity_type: record.activity_type,
            rows,
            placeholder: record.points.is_empty(),
        });
        known.insert(record.track_name);
    }

    Ok(report)
}
