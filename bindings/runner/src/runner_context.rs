use std::sync::Arc;

use anyhow::Context;
use geo_http_client_instrumented::prelude::HttpClient;
use geo_tunnel_dataset::prelude::Dataset;
use geo_tunnel_runner::prelude::UserValuesConstraint;

use crate::workload::LocationWorkload;

/// Run wide values for location scenarios, filled in by [crate::prelude::configure_workload] in
/// the scenario's setup hook.
#[derive(Default, Debug)]
pub struct LocationRunnerContext {
    pub(crate) workload: Option<LocationWorkload>,
    pub(crate) dataset: Option<Arc<Dataset>>,
    pub(crate) client: Option<HttpClient>,
}

impl UserValuesConstraint for LocationRunnerContext {}

impl LocationRunnerContext {
    pub fn workload(&self) -> anyhow::Result<&LocationWorkload> {
        self.workload
            .as_ref()
            .context("workload is not set, did you forget to call `configure_workload` in your setup?")
    }

    pub fn dataset(&self) -> anyhow::Result<&Arc<Dataset>> {
        self.dataset
            .as_ref()
            .context("dataset is not set, did you forget to call `configure_workload` in your setup?")
    }

    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client
            .as_ref()
            .context("client is not set, did you forget to call `configure_workload` in your setup?")
    }
}
