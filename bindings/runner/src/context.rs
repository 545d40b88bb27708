use std::collections::HashMap;

use geo_tunnel_runner::prelude::UserValuesConstraint;

#[derive(Debug, Default)]
pub struct DefaultScenarioValues {
    pub values: HashMap<String, String>,
}

impl UserValuesConstraint for DefaultScenarioValues {}

/// Location-specific values for the [geo_tunnel_runner::prelude::VirtualUserContext].
#[derive(Default, Debug)]
pub struct LocationUserContext<T: UserValuesConstraint = DefaultScenarioValues> {
    pub(crate) dispatched: u64,
    pub(crate) skipped: u64,
    pub scenario_values: T,
}

impl<T: UserValuesConstraint> UserValuesConstraint for LocationUserContext<T> {}

impl<T: UserValuesConstraint> LocationUserContext<T> {
    /// Requests this virtual user has sent.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Iterations this virtual user skipped because the sampled record was incomplete.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
