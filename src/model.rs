use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::filename::NOT_AVAILABLE;

/// One recorded location, as read from a `<trkpt>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    /// Keeps the offset the device recorded, so the stored date is the local one.
    pub time: Option<DateTime<FixedOffset>>,
}

/// One imported track. An empty `points` list is stored as a single placeholder row
/// dated with `fallback_date`.
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub track_name: String,
    pub activity_type: String,
    pub capture_date: Option<NaiveDate>,
    pub points: Vec<TrackPoint>,
}

impl TrackRecord {
    /// Time value used for the placeholder row of a track without points.
    pub fn fallback_date(&self) -> String {
        self.capture_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFileEntry {
    pub filename: String,
    pub track_name: Option<String>,
    pub activity: String,
    pub capture_date: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub file_count: usize,
    pub files: Vec<TrackFileEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub tracks_dir: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestCounts {
    pub candidate_files: usize,
    pub new_tracks: usize,
    pub known_tracks: usize,
    pub failed_files: usize,
    pub rows_inserted: usize,
    pub rows_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedTrack {
    pub filename: String,
    pub track_name: String,
    pub activity_type: String,
    pub rows: usize,
    pub placeholder: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub imported: Vec<ImportedTrack>,
    pub failures: Vec<FileFailure>,
    pub source_hashes: Vec<TrackFileEntry>,
}
