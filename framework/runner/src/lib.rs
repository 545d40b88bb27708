mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod schedule;
mod scheduler;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::{GeoTunnelScenarioCli, ReporterOpt};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{RunnerContext, VirtualUserContext};
    pub use crate::definition::{
        HookResult, ScenarioDefinitionBuilder, VirtualUserBehaviour, DEFAULT_GRACEFUL_RAMP_DOWN,
        DEFAULT_TICK_INTERVAL,
    };
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::schedule::{IterationBudget, ScenarioExecutor, Schedule, Stage};
    pub use crate::types::GeoTunnelResult;

    pub use futures::future::BoxFuture;
    pub use geo_tunnel_core::prelude::*;
    pub use geo_tunnel_instruments::prelude::*;
    pub use geo_tunnel_summary_model::SummaryReport;
}
