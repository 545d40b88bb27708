use chrono::{DateTime, SecondsFormat, Utc};
use geo_http_client_instrumented::prelude::{HttpMethod, HttpRequest};
use geo_tunnel_dataset::prelude::Record;
use geo_tunnel_runner::prelude::ConfigurationError;
use serde::Serialize;

use crate::operation::{OperationSpec, PipAnchor};
use crate::profile::{
    BackendProfile, Payload, PayloadShape, PolygonEncoding, ServiceType, Telemetry,
    TimestampFormat,
};

#[derive(Debug, thiserror::Error)]
pub enum RequestBuildError {
    #[error("Record is missing its trajectory id, latitude or longitude")]
    IncompleteRecord,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Failed to serialise payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Build the request for one operation on one record.
///
/// Pure: the same record, operation, profile and `now` always give an identical request. `now` is
/// only read when the profile uses a wall clock timestamp.
pub fn build_request(
    record: &Record,
    spec: &OperationSpec,
    profile: &BackendProfile,
    now: DateTime<Utc>,
) -> Result<HttpRequest, RequestBuildError> {
    let fields = record
        .required()
        .ok_or(RequestBuildError::IncompleteRecord)?;
    let kind = spec.kind();
    let route = profile
        .route(kind)
        .ok_or_else(|| ConfigurationError::MissingRoute {
            profile: profile.name.clone(),
            operation: kind.to_string(),
        })?;

    let payload = PayloadBuilder {
        record,
        profile,
        now,
    };
    let located = Subject {
        user_id: None,
        latitude: fields.latitude,
        longitude: fields.longitude,
        bearing: None,
    };

    let mut query = Vec::new();
    let mut body = None;
    let method = match (&route.payload, spec) {
        (Payload::CoordinatesQuery, OperationSpec::Range { .. } | OperationSpec::Knn { .. }) => {
            query.push(("lat".to_string(), fields.latitude.to_string()));
            query.push(("lng".to_string(), fields.longitude.to_string()));
            HttpMethod::Get
        }
        (Payload::Json(shape), OperationSpec::Write { user_id, bearing }) => {
            body = Some(payload.body(
                shape,
                &Subject {
                    user_id: Some(user_id.as_str()),
                    bearing: *bearing,
                    ..located
                },
            )?);
            HttpMethod::Post
        }
        (Payload::Json(shape), OperationSpec::Range { .. } | OperationSpec::Knn { .. }) => {
            body = Some(payload.body(shape, &located)?);
            HttpMethod::Post
        }
        (Payload::Json(shape), OperationSpec::Point { user_id }) => {
            // The lookup is by user alone, shapes that need a position get the origin.
            body = Some(payload.body(
                shape,
                &Subject {
                    user_id: Some(user_id.as_str()),
                    latitude: 0.0,
                    longitude: 0.0,
                    bearing: None,
                },
            )?);
            HttpMethod::Post
        }
        (
            Payload::Polygon {
                encoding,
                closed_ring,
            },
            OperationSpec::Pip { offset, anchor },
        ) => {
            let rectangle = Rectangle::around(fields.latitude, fields.longitude, *offset, *anchor);
            match encoding {
                PolygonEncoding::Wkt { parameter } => {
                    query.push((parameter.clone(), rectangle.wkt(*closed_ring)));
                    HttpMethod::Get
                }
                PolygonEncoding::CoordinateListsQuery => {
                    let (lats, lngs) = rectangle.coordinate_lists(*closed_ring);
                    query.extend(lats.iter().map(|lat| ("lats".to_string(), lat.to_string())));
                    query.extend(lngs.iter().map(|lng| ("lngs".to_string(), lng.to_string())));
                    HttpMethod::Get
                }
                PolygonEncoding::CoordinateListsBody => {
                    let (lats, lngs) = rectangle.coordinate_lists(*closed_ring);
                    body = Some(serde_json::to_vec(&CoordinateLists { lats, lngs })?);
                    HttpMethod::Post
                }
                PolygonEncoding::ServerSide(shape) => {
                    body = Some(payload.body(shape, &located)?);
                    HttpMethod::Post
                }
            }
        }
        (payload, _) => {
            return Err(ConfigurationError::invalid(
                format!("{kind} route of backend profile [{}]", profile.name),
                format!("{payload:?} cannot carry this operation"),
            )
            .into())
        }
    };

    match spec {
        OperationSpec::Range { radius } => {
            if let Some(parameter) = &route.parameter {
                query.push((parameter.clone(), radius.to_string()));
            }
        }
        OperationSpec::Knn { k } => {
            if let Some(parameter) = &route.parameter {
                query.push((parameter.clone(), k.to_string()));
            }
        }
        _ => {}
    }

    Ok(HttpRequest {
        label: kind.to_string(),
        method,
        url: profile.url_for(kind, route),
        query,
        body,
        expected_status: route.expected_status,
    })
}

/// Who and where a payload is about.
#[derive(Debug, Clone, Copy)]
struct Subject<'a> {
    user_id: Option<&'a str>,
    latitude: f64,
    longitude: f64,
    bearing: Option<f64>,
}

struct PayloadBuilder<'a> {
    record: &'a Record,
    profile: &'a BackendProfile,
    now: DateTime<Utc>,
}

impl PayloadBuilder<'_> {
    fn body(&self, shape: &PayloadShape, subject: &Subject) -> Result<Vec<u8>, serde_json::Error> {
        let telemetry = self.telemetry(subject);
        let timestamp = self.timestamp();

        match shape {
            PayloadShape::LocationUpdate => serde_json::to_vec(&LocationUpdateBody {
                user_id: subject.user_id,
                service_type: self.service_type(),
                latitude: subject.latitude,
                longitude: subject.longitude,
                speed: telemetry.speed,
                accuracy: telemetry.accuracy,
                timestamp,
            }),
            PayloadShape::StreamLocation => serde_json::to_vec(&StreamLocationBody {
                user_id: subject.user_id,
                latitude: subject.latitude,
                longitude: subject.longitude,
                timestamp,
            }),
            PayloadShape::RawPing {
                driving_mode,
                os_name,
            } => serde_json::to_vec(&RawPingBody {
                trj_id: subject.user_id,
                rawlat: subject.latitude,
                rawlng: subject.longitude,
                pingtimestamp: timestamp,
                driving_mode,
                osname: os_name,
                speed: telemetry.speed,
                bearing: telemetry.bearing,
                accuracy: telemetry.accuracy,
            }),
            PayloadShape::SearchCenter => serde_json::to_vec(&SearchCenterBody {
                latitude: subject.latitude,
                longitude: subject.longitude,
                service_type: self.service_type(),
            }),
            PayloadShape::PointLookup => serde_json::to_vec(&PointLookupBody {
                user_id: subject.user_id,
                service_type: self.service_type(),
            }),
        }
    }

    fn service_type(&self) -> &str {
        match &self.profile.service_type {
            ServiceType::FromDrivingMode => match self.record.driving_mode.as_deref() {
                Some("car") => "TAXI",
                _ => "BIKE",
            },
            ServiceType::Fixed(service_type) => service_type,
        }
    }

    fn telemetry(&self, subject: &Subject) -> TelemetryValues {
        let values = match &self.profile.telemetry {
            Telemetry::FromRecord => TelemetryValues {
                speed: self.record.speed.map(|metres_per_second| metres_per_second * 3.6),
                bearing: self.record.bearing,
                accuracy: self.record.accuracy,
            },
            Telemetry::Fixed {
                speed,
                bearing,
                accuracy,
            } => TelemetryValues {
                speed: Some(*speed),
                bearing: Some(*bearing),
                accuracy: Some(*accuracy),
            },
        };

        TelemetryValues {
            bearing: subject.bearing.or(values.bearing),
            ..values
        }
    }

    fn timestamp(&self) -> Option<Timestamp> {
        match self.profile.timestamp {
            TimestampFormat::SourceMillis => self
                .record
                .timestamp
                .map(|seconds| Timestamp::Millis(seconds * 1000)),
            TimestampFormat::WallClockMillis => Some(Timestamp::Millis(self.now.timestamp_millis())),
            TimestampFormat::WallClockRfc3339 => Some(Timestamp::Text(
                self.now.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
        }
    }
}

struct TelemetryValues {
    speed: Option<f64>,
    bearing: Option<f64>,
    accuracy: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Timestamp {
    Millis(i64),
    Text(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    service_type: &'a str,
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
    accuracy: Option<f64>,
    timestamp: Option<Timestamp>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamLocationBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    latitude: f64,
    longitude: f64,
    timestamp: Option<Timestamp>,
}

/// Searches send `trj_id: null`.
#[derive(Serialize)]
struct RawPingBody<'a> {
    trj_id: Option<&'a str>,
    rawlat: f64,
    rawlng: f64,
    pingtimestamp: Option<Timestamp>,
    driving_mode: &'a str,
    osname: &'a str,
    speed: Option<f64>,
    bearing: Option<f64>,
    accuracy: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchCenterBody<'a> {
    latitude: f64,
    longitude: f64,
    service_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PointLookupBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    service_type: &'a str,
}

#[derive(Serialize)]
struct CoordinateLists {
    lats: Vec<f64>,
    lngs: Vec<f64>,
}

/// An axis aligned rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rectangle {
    south: f64,
    north: f64,
    west: f64,
    east: f64,
}

impl Rectangle {
    fn around(latitude: f64, longitude: f64, offset: f64, anchor: PipAnchor) -> Self {
        match anchor {
            PipAnchor::Center => Self {
                south: latitude - offset,
                north: latitude + offset,
                west: longitude - offset,
                east: longitude + offset,
            },
            PipAnchor::Corner => Self {
                south: latitude,
                north: latitude + offset,
                west: longitude,
                east: longitude + offset,
            },
        }
    }

    /// Counter-clockwise from the south west corner, as `lng lat` pairs.
    fn wkt(&self, closed: bool) -> String {
        let mut ring = vec![
            (self.west, self.south),
            (self.east, self.south),
            (self.east, self.north),
            (self.west, self.north),
        ];
        if closed {
            ring.push(ring[0]);
        }

        let points = ring
            .iter()
            .map(|(lng, lat)| format!("{lng} {lat}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({points}))")
    }

    /// Clockwise from the south west corner, split into latitudes and longitudes.
    fn coordinate_lists(&self, closed: bool) -> (Vec<f64>, Vec<f64>) {
        let mut lats = vec![self.south, self.north, self.north, self.south];
        let mut lngs = vec![self.west, self.west, self.east, self.east];
        if closed {
            lats.push(self.south);
            lngs.push(self.west);
        }
        (lats, lngs)
    }
}
