use geo_tunnel_runner::prelude::ConfigurationError;

use crate::operation::OperationKind;

/// The JSON bodies the location services accept.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// `userId, serviceType, latitude, longitude, speed, accuracy, timestamp`
    LocationUpdate,
    /// `userId, latitude, longitude, timestamp`
    StreamLocation,
    /// The source row layout, `trj_id, rawlat, rawlng, pingtimestamp, driving_mode, osname, speed,
    /// bearing, accuracy`, with a fixed mode and OS tag.
    RawPing {
        driving_mode: String,
        os_name: String,
    },
    /// `latitude, longitude, serviceType`
    SearchCenter,
    /// `userId, serviceType`
    PointLookup,
}

impl PayloadShape {
    pub fn raw_ping(driving_mode: impl Into<String>, os_name: impl Into<String>) -> Self {
        Self::RawPing {
            driving_mode: driving_mode.into(),
            os_name: os_name.into(),
        }
    }
}

/// How a polygon query describes its polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonEncoding {
    /// `POLYGON((lng lat, ...))` text in a query parameter of a `GET`.
    Wkt { parameter: String },
    /// Repeated `lats` and `lngs` query parameters on a `GET`.
    CoordinateListsQuery,
    /// `{"lats": [...], "lngs": [...]}` in the body of a `POST`.
    CoordinateListsBody,
    /// No polygon is sent. The location is posted and the service derives the area itself.
    ServerSide(PayloadShape),
}

/// How the request for an operation carries its data.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A `GET` with the record's coordinates as `lat` and `lng` query parameters.
    CoordinatesQuery,
    /// A `POST` with a JSON body.
    Json(PayloadShape),
    Polygon {
        encoding: PolygonEncoding,
        /// Repeat the first vertex at the end of the ring.
        closed_ring: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Appended to the profile's base URL.
    pub path: String,
    pub expected_status: u16,
    pub payload: Payload,
    /// Query parameter name for the radius or the neighbour count.
    pub parameter: Option<String>,
}

impl Route {
    pub fn new(path: impl Into<String>, expected_status: u16, payload: Payload) -> Self {
        Self {
            path: path.into(),
            expected_status,
            payload,
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceType {
    /// `car` maps to `TAXI`, any other mode to `BIKE`.
    FromDrivingMode,
    Fixed(String),
}

/// Where speed, bearing and accuracy come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// The record's values, with speed converted from metres per second to kilometres per hour.
    FromRecord,
    Fixed {
        speed: f64,
        bearing: f64,
        accuracy: f64,
    },
}

impl Telemetry {
    pub fn zero() -> Self {
        Self::Fixed {
            speed: 0.0,
            bearing: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// The record's source time, converted from seconds to milliseconds.
    SourceMillis,
    /// Milliseconds since the Unix epoch at the time the request is built.
    WallClockMillis,
    /// RFC 3339 text with millisecond precision at the time the request is built.
    WallClockRfc3339,
}

/// Everything that differs between the location service backends.
///
/// Field names, units, parameter names and success codes are all properties of a profile, the
/// request builder has no defaults of its own. Start from one of the presets and adjust it for the
/// variant of the service being tested.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendProfile {
    pub name: String,
    /// Base URL for writes.
    pub base_url: String,
    /// Base URL for reads, if they are served separately from writes.
    pub read_base_url: Option<String>,
    pub service_type: ServiceType,
    pub telemetry: Telemetry,
    pub timestamp: TimestampFormat,
    pub write: Option<Route>,
    pub range: Option<Route>,
    pub knn: Option<Route>,
    pub pip: Option<Route>,
    pub point: Option<Route>,
}

impl BackendProfile {
    /// The relational store, everything synchronous on one service.
    pub fn rdbms() -> Self {
        Self {
            name: "rdbms".to_string(),
            base_url: "http://localhost:8081/api/v1/rdbms".to_string(),
            read_base_url: None,
            service_type: ServiceType::FromDrivingMode,
            telemetry: Telemetry::FromRecord,
            timestamp: TimestampFormat::WallClockMillis,
            write: Some(Route::new(
                "/update",
                200,
                Payload::Json(PayloadShape::LocationUpdate),
            )),
            range: Some(
                Route::new("/search/range", 200, Payload::CoordinatesQuery)
                    .with_parameter("radius"),
            ),
            knn: Some(Route::new("/search/knn", 200, Payload::CoordinatesQuery).with_parameter("k")),
            pip: Some(Route::new(
                "/search/pip",
                200,
                Payload::Polygon {
                    encoding: PolygonEncoding::Wkt {
                        parameter: "wkt".to_string(),
                    },
                    closed_ring: true,
                },
            )),
            point: Some(Route::new(
                "/search/point",
                200,
                Payload::Json(PayloadShape::PointLookup),
            )),
        }
    }

    /// Writes are queued and accepted with a 202, reads go to the in-memory geo index.
    pub fn kafka() -> Self {
        Self {
            name: "kafka".to_string(),
            base_url: "http://localhost:8082/api/v1".to_string(),
            read_base_url: None,
            service_type: ServiceType::FromDrivingMode,
            telemetry: Telemetry::FromRecord,
            timestamp: TimestampFormat::SourceMillis,
            write: Some(Route::new(
                "/update/kafka",
                202,
                Payload::Json(PayloadShape::LocationUpdate),
            )),
            range: Some(
                Route::new("/search/redis/range", 200, Payload::CoordinatesQuery)
                    .with_parameter("radiusMeter"),
            ),
            knn: Some(
                Route::new("/search/redis/knn", 200, Payload::CoordinatesQuery)
                    .with_parameter("n"),
            ),
            pip: Some(Route::new(
                "/search/redis/pip",
                200,
                Payload::Polygon {
                    encoding: PolygonEncoding::CoordinateListsQuery,
                    closed_ring: true,
                },
            )),
            point: Some(Route::new(
                "/search/redis/point",
                200,
                Payload::Json(PayloadShape::PointLookup),
            )),
        }
    }

    /// A producer that appends to a stream and a separate consumer that serves searches.
    pub fn redis_streams() -> Self {
        Self {
            name: "redis_streams".to_string(),
            base_url: "http://localhost:8080/api/v1".to_string(),
            read_base_url: Some("http://localhost:8081/api/v1/search".to_string()),
            service_type: ServiceType::FromDrivingMode,
            telemetry: Telemetry::FromRecord,
            timestamp: TimestampFormat::WallClockRfc3339,
            write: Some(Route::new(
                "/locations",
                200,
                Payload::Json(PayloadShape::StreamLocation),
            )),
            range: Some(
                Route::new("/range", 200, Payload::Json(PayloadShape::StreamLocation))
                    .with_parameter("radius"),
            ),
            knn: Some(
                Route::new("/knn", 200, Payload::Json(PayloadShape::StreamLocation))
                    .with_parameter("k"),
            ),
            pip: Some(Route::new(
                "/pip",
                200,
                Payload::Polygon {
                    encoding: PolygonEncoding::ServerSide(PayloadShape::StreamLocation),
                    closed_ring: false,
                },
            )),
            point: Some(Route::new(
                "/point",
                200,
                Payload::Json(PayloadShape::raw_ping("searching", "test-client")),
            )),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_read_base_url(mut self, read_base_url: impl Into<String>) -> Self {
        self.read_base_url = Some(read_base_url.into());
        self
    }

    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_timestamp(mut self, timestamp: TimestampFormat) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_write(mut self, route: Route) -> Self {
        self.write = Some(route);
        self
    }

    pub fn with_range(mut self, route: Route) -> Self {
        self.range = Some(route);
        self
    }

    pub fn with_knn(mut self, route: Route) -> Self {
        self.knn = Some(route);
        self
    }

    pub fn with_pip(mut self, route: Route) -> Self {
        self.pip = Some(route);
        self
    }

    pub fn with_point(mut self, route: Route) -> Self {
        self.point = Some(route);
        self
    }

    /// Send every request to one service, used when the connection string is overridden.
    pub fn with_single_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.read_base_url = None;
        self
    }

    pub fn route(&self, kind: OperationKind) -> Option<&Route> {
        match kind {
            OperationKind::Write => self.write.as_ref(),
            OperationKind::Range => self.range.as_ref(),
            OperationKind::Knn => self.knn.as_ref(),
            OperationKind::Pip => self.pip.as_ref(),
            OperationKind::Point => self.point.as_ref(),
        }
    }

    /// Full URL, without a query string, for an operation on this backend.
    pub fn url_for(&self, kind: OperationKind, route: &Route) -> String {
        let base = match kind {
            OperationKind::Write => &self.base_url,
            _ => self.read_base_url.as_ref().unwrap_or(&self.base_url),
        };

        format!("{}{}", base.trim_end_matches('/'), route.path)
    }

    /// Check that the route for `kind` exists and is usable for that kind of operation.
    pub fn validate_route(&self, kind: OperationKind) -> Result<(), ConfigurationError> {
        let route = self
            .route(kind)
            .ok_or_else(|| ConfigurationError::MissingRoute {
                profile: self.name.clone(),
                operation: kind.to_string(),
            })?;

        let field = format!("{} route of backend profile [{}]", kind, self.name);
        let payload_fits = match kind {
            OperationKind::Write | OperationKind::Point => matches!(route.payload, Payload::Json(_)),
            OperationKind::Range | OperationKind::Knn => matches!(
                route.payload,
                Payload::CoordinatesQuery | Payload::Json(_)
            ),
            OperationKind::Pip => matches!(route.payload, Payload::Polygon { .. }),
        };
        if !payload_fits {
            return Err(ConfigurationError::invalid(
                field,
                format!("{:?} cannot carry this operation", route.payload),
            ));
        }

        if matches!(kind, OperationKind::Range | OperationKind::Knn)
            && route.parameter.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigurationError::invalid(field, "needs a parameter name"));
        }

        if !(100..=599).contains(&route.expected_status) {
            return Err(ConfigurationError::invalid(
                field,
                format!("{} is not an HTTP status", route.expected_status),
            ));
        }

        let base = self.url_for(kind, route);
        url::Url::parse(&base)
            .map_err(|e| ConfigurationError::invalid(field, format!("bad URL {base}: {e}")))?;

        Ok(())
    }
}
