use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::model::TrackPoint;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("document has no <gpx> root element")]
    MissingRoot,
    #[error("track point at byte {position} has no {attribute} attribute")]
    MissingCoordinate {
        attribute: &'static str,
        position: u64,
    },
    #[error("invalid {field} value {value:?} at byte {position}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        position: u64,
    },
    #[error("invalid time value {value:?} at byte {position}")]
    InvalidTime { value: String, position: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointField {
    Elevation,
    Time,
}

#[derive(Debug, Default)]
struct TrackState {
    root_seen: bool,
    depth: usize,
    in_track: bool,
    in_segment: bool,
    current: Option<TrackPoint>,
    field: Option<PointField>,
    text: String,
}

pub fn parse_gpx_file(path: &Path) -> Result<Vec<TrackPoint>, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_gpx(BufReader::new(file))
}

/// Flattens every `<trkpt>` of every `<trkseg>` of every `<trk>` in document order.
/// Waypoints and route points are not part of a recorded track and are ignored.
pub fn parse_gpx<R: BufRead>(input: R) -> Result<Vec<TrackPoint>, ParseError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut state = TrackState::default();
    let mut points = Vec::new();
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;

        match reader.read_event_into(&mut buf) {
            Err(err) => {
                return Err(ParseError::Xml {
                    position,
                    message: err.to_string(),
                });
            }
            Ok(Event::Start(element)) => {
                let name = element.local_name();
                check_root(&mut state, name.as_ref())?;
                state.depth += 1;
                match name.as_ref() {
                    b"trk" => state.in_track = true,
                    b"trkseg" if state.in_track => state.in_segment = true,
                    b"trkpt" if state.in_segment => {
                        state.current = Some(point_from_attributes(&element, position)?);
                    }
                    b"ele" if state.current.is_some() => {
                        state.field = Some(PointField::Elevation);
                        state.text.clear();
                    }
                    b"time" if state.current.is_some() => {
                        state.field = Some(PointField::Time);
                        state.text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(element)) => {
                let name = element.local_name();
                check_root(&mut state, name.as_ref())?;
                if name.as_ref() == b"trkpt" && state.in_segment {
                    points.push(point_from_attributes(&element, position)?);
                }
            }
            Ok(Event::Text(text)) => {
                if state.field.is_some() {
                    let value = text.unescape().map_err(|err| ParseError::Xml {
                        position,
                        message: err.to_string(),
                    })?;
                    state.text.push_str(&value);
                }
            }
            Ok(Event::End(element)) => {
                state.depth = state.depth.saturating_sub(1);
                match element.local_name().as_ref() {
                    b"ele" | b"time" => {
                        if let (Some(field), Some(point)) =
                            (state.field.take(), state.current.as_mut())
                        {
                            apply_field(point, field, &state.text, position)?;
                        }
                        state.text.clear();
                    }
                    b"trkpt" => {
                        if let Some(point) = state.current.take() {
                            points.push(point);
                        }
                    }
                    b"trkseg" => state.in_segment = false,
                    b"trk" => state.in_track = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => {
                // quick-xml reports Eof even with elements still open.
                if state.depth > 0 {
                    return Err(ParseError::Xml {
                        position,
                        message: format!(
                            "unexpected end of document with {} element(s) still open",
                            state.depth
                        ),
                    });
                }
                break;
            }
            Ok(_) => {}
        }

        buf.clear();
    }

    if !state.root_seen {
        return Err(ParseError::MissingRoot);
    }

    Ok(points)
}

fn check_root(state: &mut TrackState, name: &[u8]) -> Result<(), ParseError> {
    if state.root_seen {
        return Ok(());
    }
    if name != b"gpx" {
        return Err(ParseError::MissingRoot);
    }
    state.root_seen = true;
    Ok(())
}

fn point_from_attributes(element: &BytesStart<'_>, position: u64) -> Result<TrackPoint, ParseError> {
    let mut latitude = None;
    let mut longitude = None;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| ParseError::Xml {
            position,
            message: err.to_string(),
        })?;
        let field = match attribute.key.local_name().as_ref() {
            b"lat" => "lat",
            b"lon" => "lon",
            _ => continue,
        };
        let raw = attribute.unescape_value().map_err(|err| ParseError::Xml {
            position,
            message: err.to_string(),
        })?;
        let value = parse_number(field, &raw, position)?;
        if field == "lat" {
            latitude = Some(value);
        } else {
            longitude = Some(value);
        }
    }

    Ok(TrackPoint {
        latitude: latitude.ok_or(ParseError::MissingCoordinate {
            attribute: "lat",
            position,
        })?,
        longitude: longitude.ok_or(ParseError::MissingCoordinate {
            attribute: "lon",
            position,
        })?,
        elevation: None,
        time: None,
    })
}

fn apply_field(
    point: &mut TrackPoint,
    field: PointField,
    text: &str,
    position: u64,
) -> Result<(), ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    match field {
        PointField::Elevation => point.elevation = Some(parse_number("ele", text, position)?),
        PointField::Time => point.time = Some(parse_time(text, position)?),
    }
    Ok(())
}

fn parse_number(field: &'static str, raw: &str, position: u64) -> Result<f64, ParseError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: raw.to_string(),
            position,
        })
}

/// RFC 3339 first, keeping the recorded offset; timestamps without one are taken as UTC.
fn parse_time(raw: &str, position: u64) -> Result<DateTime<FixedOffset>, ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed);
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|_| ParseError::InvalidTime {
            value: raw.to_string(),
            position,
        })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    const TWO_SEGMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Sports Tracker" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Morning ride</name><time>2023-08-03T06:00:00Z</time></metadata>
  <wpt lat="1.0" lon="1.0"><name>ignored</name></wpt>
  <trk>
    <name>Cycling</name>
    <trkseg>
      <trkpt lat="60.1699" lon="24.9384"><ele>12.5</ele><time>2023-08-03T06:01:00Z</time></trkpt>
      <trkpt lat="60.1700" lon="24.9390"><ele>13.0</ele><time>2023-08-03T06:01:05Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="60.1710" lon="24.9400"/>
    </trkseg>
  </trk>
  <rte><rtept lat="2.0" lon="2.0"/></rte>
</gpx>"#;

    #[test]
    fn flattens_points_across_segments() {
        let points = parse_gpx(TWO_SEGMENTS.as_bytes()).unwrap();
        assert_eq!(points.len(), 3);

        assert_eq!(points[0].latitude, 60.1699);
        assert_eq!(points[0].longitude, 24.9384);
        assert_eq!(points[0].elevation, Some(12.5));
        assert_eq!(
            points[0].time,
            Some(Utc.with_ymd_and_hms(2023, 8, 3, 6, 1, 0).unwrap().fixed_offset())
        );

        assert_eq!(points[2].latitude, 60.1710);
        assert_eq!(points[2].elevation, None);
        assert_eq!(points[2].time, None);
    }

    #[test]
    fn waypoints_and_route_points_are_ignored() {
        let points = parse_gpx(TWO_SEGMENTS.as_bytes()).unwrap();
        assert!(points.iter().all(|point| point.latitude > 60.0));
    }

    #[test]
    fn file_without_tracks_yields_no_points() {
        let xml = r#"<gpx version="1.1"><metadata><name>planned</name></metadata></gpx>"#;
        let points = parse_gpx(xml.as_bytes()).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn recorded_offsets_are_kept() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="1" lon="2"><time>2021-02-15T00:30:00+02:00</time></trkpt>
            <trkpt lat="1" lon="2"><time>2021-02-15T12:00:05</time></trkpt>
        </trkseg></trk></gpx>"#;
        let points = parse_gpx(xml.as_bytes()).unwrap();

        let local = points[0].time.unwrap();
        assert_eq!(local.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(local.date_naive(), chrono::NaiveDate::from_ymd_opt(2021, 2, 15).unwrap());
        assert_eq!(
            local.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2021, 2, 14, 22, 30, 0).unwrap()
        );

        assert_eq!(
            points[1].time,
            Some(Utc.with_ymd_and_hms(2021, 2, 15, 12, 0, 5).unwrap().fixed_offset())
        );
    }

    #[test]
    fn truncated_document_is_rejected() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"></trkpt><trkpt lat="3" lon="4"><ele>5"#;
        let err = parse_gpx(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }), "{err:?}");

        let unclosed_root = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"/></trkseg></trk>"#;
        assert!(matches!(
            parse_gpx(unclosed_root.as_bytes()),
            Err(ParseError::Xml { .. })
        ));
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(parse_gpx("".as_bytes()), Err(ParseError::MissingRoot)));
    }

    #[test]
    fn non_gpx_root_is_rejected() {
        let err = parse_gpx("<kml><Document/></kml>".as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingRoot));
    }

    #[test]
    fn mismatched_tags_are_reported() {
        let err = parse_gpx("<gpx><trk><trkseg></trk></gpx>".as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }), "{err:?}");
    }

    #[test]
    fn bad_coordinates_are_reported() {
        let missing = parse_gpx(r#"<gpx><trk><trkseg><trkpt lat="1"/></trkseg></trk></gpx>"#.as_bytes())
            .unwrap_err();
        assert!(matches!(
            missing,
            ParseError::MissingCoordinate { attribute: "lon", .. }
        ));

        let invalid = parse_gpx(
            r#"<gpx><trk><trkseg><trkpt lat="north" lon="2"/></trkseg></trk></gpx>"#.as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(invalid, ParseError::InvalidNumber { field: "lat", .. }));
    }

    #[test]
    fn bad_time_is_reported() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"><time>yesterday</time></trkpt></trkseg></trk></gpx>"#;
        let err = parse_gpx(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = parse_gpx_file(Path::new("/nonexistent/track.gpx")).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
