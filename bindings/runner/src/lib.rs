mod builder;
mod common;
mod context;
mod operation;
mod profile;
mod runner_context;
mod workload;

pub mod prelude {
    /// Common operations for location scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::builder::{build_request, RequestBuildError};
    pub use crate::context::{DefaultScenarioValues, LocationUserContext};
    pub use crate::operation::{
        CountTemplate, Identity, OperationKind, OperationSpec, OperationTemplate, PipAnchor,
        Radius, RadiusTemplate, UserIdStrategy,
    };
    pub use crate::profile::{
        BackendProfile, Payload, PayloadShape, PolygonEncoding, Route, ServiceType, Telemetry,
        TimestampFormat,
    };
    pub use crate::runner_context::LocationRunnerContext;
    pub use crate::workload::LocationWorkload;

    /// Re-export of the `geo_tunnel_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use geo_tunnel_runner::prelude::*;

    /// Re-export of the dataset types for convenience.
    pub use geo_tunnel_dataset::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use geo_http_client_instrumented::prelude::*;
}
