use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{FileFilterArgs, InventoryArgs};
use crate::filename::TrackFilenameParser;
use crate::model::{TrackFileEntry, TrackInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

/// Which directory entries count as candidate track files.
#[derive(Debug, Clone)]
pub struct TrackFileFilter {
    pub extension: String,
    pub prefix: Option<String>,
}

impl Default for TrackFileFilter {
    fn default() -> Self {
        Self {
            extension: "gpx".to_string(),
            prefix: None,
        }
    }
}

impl From<&FileFilterArgs> for TrackFileFilter {
    fn from(args: &FileFilterArgs) -> Self {
        Self {
            extension: args.extension.trim_start_matches('.').to_string(),
            prefix: args.prefix.clone().filter(|prefix| !prefix.is_empty()),
        }
    }
}

impl TrackFileFilter {
    fn accepts(&self, path: &Path) -> bool {
        let extension_matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);

        let prefix_matches = match &self.prefix {
            Some(prefix) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix.as_str()))
                .unwrap_or(false),
            None => true,
        };

        extension_matches && prefix_matches
    }
}

pub fn run(args: InventoryArgs) -> Result<()> {
    let parser = TrackFilenameParser::new()?;
    let filter = TrackFileFilter::from(&args.filter);
    let manifest = build_manifest(&args.tracks_dir, &filter, &parser)?;

    if args.dry_run {
        for entry in &manifest.files {
            info!(
                filename = %entry.filename,
                track = %entry.track_name.as_deref().unwrap_or("-"),
                activity = %entry.activity,
                date = %entry.capture_date,
                "track file"
            );
        }
        info!(
            file_count = manifest.file_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.cache_root.join("manifests").join("track_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(file_count = manifest.file_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(
    tracks_dir: &Path,
    filter: &TrackFileFilter,
    parser: &TrackFilenameParser,
) -> Result<TrackInventoryManifest> {
    let paths = list_track_files(tracks_dir, filter)?;
    if paths.is_empty() {
        warn!(path = %tracks_dir.display(), "no track files found");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(file_entry(&path, parser)?);
    }

    Ok(TrackInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: tracks_dir.display().to_string(),
        file_count: files.len(),
        files,
    })
}

pub fn file_entry(path: &Path, parser: &TrackFilenameParser) -> Result<TrackFileEntry> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

    Ok(TrackFileEntry {
        filename,
        track_name: parser.track_name_from_filename(path).ok(),
        activity: parser.activity_from_filename(path),
        capture_date: parser.date_from_filename(path),
        sha256: sha256_file(path)?,
    })
}

/// Regular files directly inside `tracks_dir` accepted by `filter`, sorted by path.
pub fn list_track_files(tracks_dir: &Path, filter: &TrackFileFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries = fs::read_dir(tracks_dir)
        .with_context(|| format!("failed to read {}", tracks_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", tracks_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if filter.accepts(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "SportsTracker-AlpineSkiing-20210215-602ab25caee48f193dbea82a.gpx";

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"<gpx/>").unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn lists_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), SAMPLE);
        touch(dir.path(), "Bike Ride Nice - Brussels.gpx");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "SportsTracker-Running-20200101-aaa.GPX");
        fs::create_dir(dir.path().join("nested.gpx")).unwrap();

        let all = list_track_files(dir.path(), &TrackFileFilter::default()).unwrap();
        assert_eq!(
            names(&all),
            vec![
                "Bike Ride Nice - Brussels.gpx",
                SAMPLE,
                "SportsTracker-Running-20200101-aaa.GPX"
            ]
        );

        let filter = TrackFileFilter {
            extension: "gpx".to_string(),
            prefix: Some("SportsTracker".to_string()),
        };
        let exported = list_track_files(dir.path(), &filter).unwrap();
        assert_eq!(
            names(&exported),
            vec![SAMPLE, "SportsTracker-Running-20200101-aaa.GPX"]
        );
    }

    #[test]
    fn filter_args_drop_leading_dot_and_empty_prefix() {
        let filter = TrackFileFilter::from(&FileFilterArgs {
            extension: ".gpx".to_string(),
            prefix: Some(String::new()),
        });
        assert_eq!(filter.extension, "gpx");
        assert!(filter.prefix.is_none());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(list_track_files(&missing, &TrackFileFilter::default()).is_err());
    }

    #[test]
    fn manifest_records_metadata_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), SAMPLE);
        touch(dir.path(), "Bike Ride Nice.gpx");

        let parser = TrackFilenameParser::new().unwrap();
        let manifest =
            build_manifest(dir.path(), &TrackFileFilter::default(), &parser).unwrap();
        assert_eq!(manifest.file_count, 2);

        let unnamed = &manifest.files[0];
        assert_eq!(unnamed.filename, "Bike Ride Nice.gpx");
        assert_eq!(unnamed.track_name, None);
        assert_eq!(unnamed.activity, "NA");

        let exported = &manifest.files[1];
        assert_eq!(
            exported.track_name.as_deref(),
            Some("602ab25caee48f193dbea82a")
        );
        assert_eq!(exported.activity, "AlpineSkiing");
        assert_eq!(exported.capture_date, "2021-02-15");
        assert_eq!(exported.sha256.len(), 64);
    }
}
