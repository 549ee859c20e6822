use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::{TracksArgs, resolve_db_path};
use crate::store::{PointStore, SqliteStore, or_empty};
use crate::util::parse_iso_date;

#[derive(Debug, Clone, Serialize)]
struct TrackSummary {
    track_name: String,
    first_time: Option<String>,
    point_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    selection: Selection,
    returned: usize,
    tracks: Vec<TrackSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Selection {
    Range {
        start: String,
        end: String,
        activity: String,
    },
    Track {
        track_name: String,
    },
}

pub fn run(args: TracksArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    if !db_path.exists() {
        bail!(
            "track store {} does not exist; run `sport-tracks ingest` first",
            db_path.display()
        );
    }

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let (selection, names) = select_tracks(&store, &args)?;
    let tracks = names
        .into_iter()
        .map(|name| summarize_track(&store, name, args.with_points))
        .collect::<Vec<_>>();

    info!(returned = tracks.len(), "track query complete");

    let response = TracksResponse {
        selection,
        returned: tracks.len(),
        tracks,
    };

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

fn select_tracks<S: PointStore>(store: &S, args: &TracksArgs) -> Result<(Selection, Vec<String>)> {
    if let Some(track_name) = &args.track {
        // Points without timestamps leave MIN(time) NULL, so look the name up directly.
        let exists =
            or_empty("known_track_names", store.known_track_names()).contains(track_name);
        let names = if exists {
            vec![track_name.clone()]
        } else {
            Vec::new()
        };
        return Ok((
            Selection::Track {
                track_name: track_name.clone(),
            },
            names,
        ));
    }

    let (Some(start), Some(end), Some(activity)) = (&args.start, &args.end, &args.activity) else {
        bail!("--start, --end and --activity are required unless --track is given");
    };
    let start_date = parse_iso_date(start)?;
    let end_date = parse_iso_date(end)?;

    let names = or_empty(
        "activity_tracks_between",
        store.activity_tracks_between(start_date, end_date, activity),
    );

    Ok((
        Selection::Range {
            start: start.clone(),
            end: end.clone(),
            activity: activity.clone(),
        },
        names,
    ))
}

fn summarize_track<S: PointStore>(store: &S, track_name: String, with_points: bool) -> TrackSummary {
    let first_time = or_empty(
        "earliest_time_for_track",
        store.earliest_time_for_track(&track_name),
    );
    let points = or_empty("points_for_track", store.points_for_track(&track_name));

    TrackSummary {
        track_name,
        first_time,
        point_count: points.len(),
        points: with_points.then(|| {
            points
                .into_iter()
                .map(|(latitude, longitude)| [latitude, longitude])
                .collect()
        }),
    }
}

fn write_json_response(response: &TracksResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize tracks json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &TracksResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    match &response.selection {
        Selection::Range {
            start,
            end,
            activity,
        } => writeln!(output, "Activity: {activity} from {start} to {end}")?,
        Selection::Track { track_name } => writeln!(output, "Track: {track_name}")?,
    }
    writeln!(output, "Tracks: {}", response.returned)?;

    for track in &response.tracks {
        writeln!(
            output,
            "{}\t{}\tpoints={}",
            track.track_name,
            track.first_time.as_deref().unwrap_or("-"),
            track.point_count
        )?;
        if let Some(points) = &track.points {
            for [latitude, longitude] in points {
                writeln!(output, "\t{latitude:.6}\t{longitude:.6}")?;
            }
        }
    }

    output.flush()?;
    Ok(())
}
