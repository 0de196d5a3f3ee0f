// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS track parsing (GPX / TCX) and geometry helpers.
//!
//! Distances use the Haversine great-circle formula from `geo`; tracks are
//! stored compactly as Google encoded polylines (precision 5).

use crate::error::AppError;
use crate::models::TrackPoint;
use crate::time_utils::parse_rfc3339_utc;
use chrono::{DateTime, Utc};
use geo::{Coord, Distance, Haversine, Point};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::FromStr;

/// Polyline precision used for stored tracks.
pub const POLYLINE_PRECISION: u32 = 5;

/// Supported activity file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    Gpx,
    Tcx,
}

impl TrackFormat {
    /// Guess the format from the document's root element.
    pub fn detect(xml: &str) -> Option<Self> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    return match e.local_name().as_ref() {
                        b"gpx" => Some(TrackFormat::Gpx),
                        b"TrainingCenterDatabase" => Some(TrackFormat::Tcx),
                        _ => None,
                    };
                }
                Ok(Event::Eof) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackFormat::Gpx => "gpx",
            TrackFormat::Tcx => "tcx",
        }
    }
}

impl FromStr for TrackFormat {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpx" => Ok(TrackFormat::Gpx),
            "tcx" => Ok(TrackFormat::Tcx),
            other => Err(TrackError::UnknownFormat(other.to_string())),
        }
    }
}

/// Derived metrics for a parsed track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub point_count: u32,
    pub distance_km: f64,
    /// Elapsed time between first and last timestamped fix
    pub duration_hours: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub summary_polyline: String,
}

/// Parse a GPX or TCX document; `format` overrides detection.
pub fn parse_track(xml: &str, format: Option<TrackFormat>) -> Result<Vec<TrackPoint>, TrackError> {
    let format = match format {
        Some(f) => f,
        None => TrackFormat::detect(xml)
            .ok_or_else(|| TrackError::UnknownFormat("unrecognized root element".to_string()))?,
    };

    let points = match format {
        TrackFormat::Gpx => parse_gpx(xml)?,
        TrackFormat::Tcx => parse_tcx(xml)?,
    };

    if points.is_empty() {
        return Err(TrackError::Empty);
    }

    tracing::debug!(format = format.as_str(), points = points.len(), "Parsed track");
    Ok(points)
}

/// Which text node we are collecting inside a track point.
#[derive(Clone, Copy)]
enum Field {
    Lat,
    Lon,
    Elevation,
    Time,
}

fn parse_gpx(xml: &str) -> Result<Vec<TrackPoint>, TrackError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut points = Vec::new();
    let mut current: Option<TrackPoint> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" | b"rtept" => current = Some(gpx_point(&e)?),
                b"ele" if current.is_some() => field = Some(Field::Elevation),
                b"time" if current.is_some() => field = Some(Field::Time),
                _ => {}
            },
            Event::Empty(e) => {
                if matches!(e.local_name().as_ref(), b"trkpt" | b"rtept") {
                    points.push(gpx_point(&e)?);
                }
            }
            Event::Text(t) => {
                if let (Some(point), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(xml_error)?;
                    apply_field(point, f, text.trim())?;
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"trkpt" | b"rtept" => {
                    if let Some(point) = current.take() {
                        points.push(point);
                    }
                    field = None;
                }
                b"ele" | b"time" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(points)
}

fn gpx_point(e: &BytesStart<'_>) -> Result<TrackPoint, TrackError> {
    let lat = required_attr(e, "lat")?;
    let lon = required_attr(e, "lon")?;
    let point = TrackPoint::new(lat, lon);
    if !point.is_valid() {
        return Err(TrackError::InvalidCoordinate(format!("{}, {}", lat, lon)));
    }
    Ok(point)
}

fn required_attr(e: &BytesStart<'_>, name: &str) -> Result<f64, TrackError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(xml_error)?
        .ok_or_else(|| TrackError::InvalidCoordinate(format!("missing '{}' attribute", name)))?;
    let value = attr.unescape_value().map_err(xml_error)?;
    parse_number(value.trim())
}

/// Partially-read TCX trackpoint; `Position` may be absent while paused.
#[derive(Default)]
struct TcxPoint {
    lat: Option<f64>,
    lon: Option<f64>,
    elevation_m: Option<f64>,
    time: Option<DateTime<Utc>>,
}

fn parse_tcx(xml: &str) -> Result<Vec<TrackPoint>, TrackError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut points = Vec::new();
    let mut current: Option<TcxPoint> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                if current.is_none() {
                    if e.local_name().as_ref() == b"Trackpoint" {
                        current = Some(TcxPoint::default());
                    }
                    continue;
                }
                field = match e.local_name().as_ref() {
                    b"LatitudeDegrees" => Some(Field::Lat),
                    b"LongitudeDegrees" => Some(Field::Lon),
                    b"AltitudeMeters" => Some(Field::Elevation),
                    b"Time" => Some(Field::Time),
                    _ => None,
                };
            }
            Event::Text(t) => {
                if let (Some(point), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(xml_error)?;
                    let text = text.trim();
                    match f {
                        Field::Lat => point.lat = Some(parse_number(text)?),
                        Field::Lon => point.lon = Some(parse_number(text)?),
                        Field::Elevation => point.elevation_m = Some(parse_number(text)?),
                        Field::Time => point.time = parse_rfc3339_utc(text),
                    }
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"Trackpoint" {
                    if let Some(TcxPoint {
                        lat: Some(lat),
                        lon: Some(lon),
                        elevation_m,
                        time,
                    }) = current.take()
                    {
                        let point = TrackPoint {
                            lat,
                            lon,
                            elevation_m,
                            time,
                        };
                        if !point.is_valid() {
                            return Err(TrackError::InvalidCoordinate(format!(
                                "{}, {}",
                                lat, lon
                            )));
                        }
                        points.push(point);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(points)
}

fn apply_field(point: &mut TrackPoint, field: Field, text: &str) -> Result<(), TrackError> {
    match field {
        Field::Elevation => point.elevation_m = Some(parse_number(text)?),
        Field::Time => point.time = parse_rfc3339_utc(text),
        Field::Lat | Field::Lon => {}
    }
    Ok(())
}

fn parse_number(text: &str) -> Result<f64, TrackError> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrackError::InvalidCoordinate(format!("not a number: '{}'", text)))
}

fn xml_error<E: std::fmt::Display>(e: E) -> TrackError {
    TrackError::Xml(e.to_string())
}

/// Great-circle distance between two fixes, in kilometres.
pub fn haversine_km(a: &TrackPoint, b: &TrackPoint) -> f64 {
    Haversine.distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat)) / 1000.0
}

/// Total path length of a track, in kilometres.
pub fn track_distance_km(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(&pair[0], &pair[1]))
        .sum()
}

/// Elapsed hours between the first and last timestamped fix.
pub fn track_duration_hours(points: &[TrackPoint]) -> Option<f64> {
    let first = points.iter().find_map(|p| p.time)?;
    let last = points.iter().rev().find_map(|p| p.time)?;
    let seconds = (last - first).num_seconds();
    (seconds > 0).then(|| seconds as f64 / 3600.0)
}

/// Encode a track as a Google polyline.
pub fn encode_track(points: &[TrackPoint]) -> Result<String, TrackError> {
    polyline::encode_coordinates(
        points.iter().map(|p| Coord { x: p.lon, y: p.lat }),
        POLYLINE_PRECISION,
    )
    .map_err(|e| TrackError::Polyline(e.to_string()))
}

/// Decode a stored polyline back into track points (no time/elevation).
pub fn decode_track(encoded: &str) -> Result<Vec<TrackPoint>, TrackError> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
        .map_err(|e| TrackError::Polyline(e.to_string()))?;
    Ok(line.0.iter().map(|c| TrackPoint::new(c.y, c.x)).collect())
}

/// Compute distance, duration and polyline for a track.
pub fn summarize(points: &[TrackPoint]) -> Result<TrackSummary, TrackError> {
    if points.is_empty() {
        return Err(TrackError::Empty);
    }
    if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
        return Err(TrackError::InvalidCoordinate(format!(
            "{}, {}",
            bad.lat, bad.lon
        )));
    }

    Ok(TrackSummary {
        point_count: points.len() as u32,
        distance_km: track_distance_km(points),
        duration_hours: track_duration_hours(points),
        start_time: points.iter().find_map(|p| p.time),
        summary_polyline: encode_track(points)?,
    })
}

/// Render a track as a GeoJSON `LineString` feature.
pub fn track_to_geojson(
    points: &[TrackPoint],
    properties: serde_json::Map<String, serde_json::Value>,
) -> geojson::Feature {
    let coordinates: Vec<Vec<f64>> = points.iter().map(|p| vec![p.lon, p.lat]).collect();

    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::LineString(
            coordinates,
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Errors from track parsing.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Track contains no points")]
    Empty,

    #[error("Unknown track format: {0}")]
    UnknownFormat(String),

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Polyline error: {0}")]
    Polyline(String),
}

impl From<TrackError> for AppError {
    fn from(err: TrackError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning Ride</name>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194"><ele>16.0</ele><time>2024-05-01T07:00:00Z</time></trkpt>
      <trkpt lat="37.7849" lon="-122.4094"><ele>20.5</ele><time>2024-05-01T07:05:00Z</time></trkpt>
      <trkpt lat="37.7949" lon="-122.3994"><time>2024-05-01T07:30:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    const TCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities>
    <Activity Sport="Biking">
      <Id>2024-05-01T07:00:00Z</Id>
      <Lap StartTime="2024-05-01T07:00:00Z">
        <Track>
          <Trackpoint>
            <Time>2024-05-01T07:00:00Z</Time>
            <Position><LatitudeDegrees>51.5007</LatitudeDegrees><LongitudeDegrees>-0.1246</LongitudeDegrees></Position>
            <AltitudeMeters>12.0</AltitudeMeters>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-05-01T07:10:00Z</Time>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-05-01T08:00:00Z</Time>
            <Position><LatitudeDegrees>51.5055</LatitudeDegrees><LongitudeDegrees>-0.0754</LongitudeDegrees></Position>
          </Trackpoint>
        </Track>
      </Lap>
    </Activity>
  </Activities>
</TrainingCenterDatabase>"#;

    #[test]
    fn test_detect_format() {
        assert_eq!(TrackFormat::detect(GPX), Some(TrackFormat::Gpx));
        assert_eq!(TrackFormat::detect(TCX), Some(TrackFormat::Tcx));
        assert_eq!(TrackFormat::detect("<kml></kml>"), None);
    }

    #[test]
    fn test_parse_gpx_points() {
        let points = parse_track(GPX, None).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].lat, 37.7749);
        assert_eq!(points[0].lon, -122.4194);
        assert_eq!(points[0].elevation_m, Some(16.0));
        assert_eq!(points[2].elevation_m, None);
        assert_eq!(
            points[1].time,
            parse_rfc3339_utc("2024-05-01T07:05:00Z")
        );
    }

    #[test]
    fn test_parse_tcx_skips_points_without_position() {
        let points = parse_track(TCX, Some(TrackFormat::Tcx)).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].elevation_m, Some(12.0));
        assert_eq!(track_duration_hours(&points), Some(1.0));
    }

    #[test]
    fn test_self_closing_gpx_points() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1.0" lon="2.0"/><trkpt lat="1.5" lon="2.5"/></trkseg></trk></gpx>"#;
        let points = parse_track(xml, None).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(track_duration_hours(&points), None);
    }

    #[test]
    fn test_empty_and_malformed_tracks() {
        assert!(matches!(
            parse_track("<gpx><trk></trk></gpx>", None),
            Err(TrackError::Empty)
        ));
        assert!(matches!(
            parse_track(r#"<gpx><trkpt lat="abc" lon="1"/></gpx>"#, None),
            Err(TrackError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            parse_track(r#"<gpx><trkpt lat="95.0" lon="1"/></gpx>"#, None),
            Err(TrackError::InvalidCoordinate(_))
        ));
        assert!(parse_track("not xml at all", None).is_err());
    }

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        let a = TrackPoint::new(0.0, 0.0);
        let b = TrackPoint::new(1.0, 0.0);
        let km = haversine_km(&a, &b);
        assert!((km - 111.19).abs() < 0.1, "got {} km", km);
        assert_eq!(haversine_km(&a, &a), 0.0);
    }

    #[test]
    fn test_track_distance_is_sum_of_segments() {
        let points = parse_track(GPX, None).unwrap();
        let total = track_distance_km(&points);
        let expected = haversine_km(&points[0], &points[1]) + haversine_km(&points[1], &points[2]);
        assert!((total - expected).abs() < 1e-12);
        assert!(total > 2.0 && total < 3.5, "got {} km", total);
    }

    #[test]
    fn test_summarize_and_polyline_round_trip() {
        let points = parse_track(GPX, None).unwrap();
        let summary = summarize(&points).unwrap();
        assert_eq!(summary.point_count, 3);
        assert_eq!(summary.duration_hours, Some(0.5));
        assert_eq!(summary.start_time, points[0].time);

        let decoded = decode_track(&summary.summary_polyline).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!((decoded[1].lat - 37.7849).abs() < 1e-5);
        assert!((decoded[1].lon + 122.4094).abs() < 1e-5);
    }

    #[test]
    fn test_geojson_uses_lon_lat_order() {
        let points = vec![TrackPoint::new(10.0, 20.0), TrackPoint::new(11.0, 21.0)];
        let feature = track_to_geojson(&points, serde_json::Map::new());
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["type"], "LineString");
        assert_eq!(json["geometry"]["coordinates"][0][0], 20.0);
        assert_eq!(json["geometry"]["coordinates"][0][1], 10.0);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("GPX".parse::<TrackFormat>().unwrap(), TrackFormat::Gpx);
        assert!("fit".parse::<TrackFormat>().is_err());
    }
}
