use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sport-tracks",
    version,
    about = "Import exported GPX tracks into a local SQLite archive and query them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List track files and the metadata recovered from their names.
    Inventory(InventoryArgs),
    /// Import tracks that are not yet in the store.
    Ingest(IngestArgs),
    /// Query stored tracks by activity and date range, or one track by name.
    Tracks(TracksArgs),
    /// Summarize the inventory manifest and what the store holds per activity.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FileFilterArgs {
    /// Only files with this extension (case-insensitive).
    #[arg(long, default_value = "gpx")]
    pub extension: String,

    /// Only files whose name starts with this prefix, e.g. `SportsTracker`.
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "tracks")]
    pub tracks_dir: PathBuf,

    #[arg(long, default_value = ".cache/sport-tracks")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FileFilterArgs,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = "tracks")]
    pub tracks_dir: PathBuf,

    #[arg(long, default_value = ".cache/sport-tracks")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FileFilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TracksArgs {
    #[arg(long, default_value = ".cache/sport-tracks")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// First day of the range, YYYY-MM-DD.
    #[arg(long, required_unless_present = "track")]
    pub start: Option<String>,

    /// Last day of the range (inclusive), YYYY-MM-DD.
    #[arg(long, required_unless_present = "track")]
    pub end: Option<String>,

    /// Exact, case-sensitive activity label such as `Cycling`.
    #[arg(long, required_unless_present = "track")]
    pub activity: Option<String>,

    /// Show a single track instead of a range selection.
    #[arg(long, conflicts_with_all = ["start", "end", "activity"])]
    pub track: Option<String>,

    #[arg(long, default_value_t = false)]
    pub with_points: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/sport-tracks")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

pub fn resolve_db_path(cache_root: &std::path::Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| cache_root.join("gps_data.db"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tracks_accepts_range_or_single_track() {
        let range = Cli::try_parse_from([
            "sport-tracks",
            "tracks",
            "--start",
            "2023-01-01",
            "--end",
            "2023-12-31",
            "--activity",
            "Cycling",
        ]);
        assert!(range.is_ok());

        let single = Cli::try_parse_from(["sport-tracks", "tracks", "--track", "602ab25c"]);
        assert!(single.is_ok());

        let missing = Cli::try_parse_from(["sport-tracks", "tracks", "--start", "2023-01-01"]);
        assert!(missing.is_err());
    }

    #[test]
    fn db_path_defaults_under_cache_root() {
        let args = StatusArgs {
            cache_root: PathBuf::from(".cache/sport-tracks"),
            db_path: None,
        };
        assert_eq!(
            resolve_db_path(&args.cache_root, args.db_path.as_ref()),
            PathBuf::from(".cache/sport-tracks/gps_data.db")
        );
    }
}
