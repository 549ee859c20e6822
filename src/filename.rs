use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

/// Value returned by the soft extractors when a field cannot be recovered.
pub const NOT_AVAILABLE: &str = "NA";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("path has no usable file name: {path}")]
    NoFileName { path: String },
    #[error("file name does not match <source>-<activity>-<yyyymmdd>-<track>.<ext>: {filename}")]
    Unrecognized { filename: String },
}

/// Metadata recovered from an exported track file name such as
/// `SportsTracker-Cycling-20230803-64cbb65a281fe01c2345297a.gpx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFilename {
    pub source_tag: String,
    pub activity: String,
    pub raw_date: String,
    pub capture_date: Option<NaiveDate>,
    pub track_name: String,
}

impl TrackFilename {
    /// Capture date as `YYYY-MM-DD`, or `NA` when the date field is not `YYYYMMDD`.
    pub fn display_date(&self) -> String {
        self.capture_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Matches the basename only; directories in front of it never take part.
#[derive(Debug, Clone)]
pub struct TrackFilenameParser {
    pattern: Regex,
}

impl TrackFilenameParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(
                r"^(?P<source>[^-.]+)-(?P<activity>[^-.]+)-(?P<date>[^-.]+)-(?P<track>[^-.]+)\.[^.]+$",
            )
            .context("failed to compile track filename regex")?,
        })
    }

    pub fn parse(&self, path: &Path) -> Result<TrackFilename, FilenameError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FilenameError::NoFileName {
                path: path.display().to_string(),
            })?;

        let captures =
            self.pattern
                .captures(filename)
                .ok_or_else(|| FilenameError::Unrecognized {
                    filename: filename.to_string(),
                })?;

        let raw_date = captures["date"].to_string();
        let capture_date = NaiveDate::parse_from_str(&raw_date, "%Y%m%d").ok();

        Ok(TrackFilename {
            source_tag: captures["source"].to_string(),
            activity: captures["activity"].to_string(),
            raw_date,
            capture_date,
            track_name: captures["track"].to_string(),
        })
    }

    pub fn activity_from_filename(&self, path: &Path) -> String {
        match self.parse(path) {
            Ok(parsed) => parsed.activity,
            Err(err) => {
                warn!(error = %err, "activity unavailable from file name");
                NOT_AVAILABLE.to_string()
            }
        }
    }

    pub fn date_from_filename(&self, path: &Path) -> String {
        match self.parse(path) {
            Ok(parsed) => {
                if parsed.capture_date.is_none() {
                    warn!(
                        path = %path.display(),
                        raw_date = %parsed.raw_date,
                        "capture date is not in YYYYMMDD form"
                    );
                }
                parsed.display_date()
            }
            Err(err) => {
                warn!(error = %err, "capture date unavailable from file name");
                NOT_AVAILABLE.to_string()
            }
        }
    }

    /// No fallback: a file without a track id cannot be deduplicated.
    pub fn track_name_from_filename(&self, path: &Path) -> Result<String, FilenameError> {
        self.parse(path).map(|parsed| parsed.track_name)
    }
}
