use std::time::Duration;

use geo_http_client_instrumented::prelude::DEFAULT_REQUEST_TIMEOUT;
use geo_tunnel_runner::prelude::{ConfigurationError, WeightedMix};
use itertools::Itertools;

use crate::operation::{OperationTemplate, UserIdStrategy};
use crate::profile::BackendProfile;

/// What one scenario sends to one backend.
#[derive(Debug, Clone)]
pub struct LocationWorkload {
    pub profile: BackendProfile,
    pub mix: WeightedMix<OperationTemplate>,
    pub user_ids: UserIdStrategy,
    /// Sleep between iterations of a virtual user.
    pub pacing: Duration,
    /// Absolute limit for each request.
    pub timeout: Duration,
}

impl LocationWorkload {
    pub fn new(profile: BackendProfile, mix: WeightedMix<OperationTemplate>) -> Self {
        Self {
            profile,
            mix,
            user_ids: UserIdStrategy::TrajectoryPerVu,
            pacing: Duration::from_secs(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_user_ids(mut self, user_ids: UserIdStrategy) -> Self {
        self.user_ids = user_ids;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Every operation the mix can pick must be well formed and have a usable route on the
    /// profile.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.timeout.is_zero() {
            return Err(ConfigurationError::invalid(
                "request timeout",
                "must be greater than zero",
            ));
        }

        if let UserIdStrategy::RandomPool { size: 0 } = self.user_ids {
            return Err(ConfigurationError::invalid("user id pool", "is empty"));
        }

        for template in self.mix.leaves() {
            template.validate()?;
        }

        for kind in self.mix.leaves().iter().map(|t| t.kind()).unique() {
            self.profile.validate_route(kind)?;
        }

        Ok(())
    }

    /// One line per operation with its effective share of iterations, for the run log.
    pub fn describe_mix(&self) -> String {
        self.mix
            .flattened_weights()
            .into_iter()
            .map(|(template, weight)| format!("{} {:.1}%", template.kind(), weight * 100.0))
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CountTemplate, PipAnchor, Radius, RadiusTemplate};
    use geo_tunnel_runner::prelude::ConfigurationError;

    fn read_mix() -> WeightedMix<OperationTemplate> {
        WeightedMix::uniform(vec![
            OperationTemplate::range(RadiusTemplate::Fixed(Radius::Metres(5000))),
            OperationTemplate::knn(CountTemplate::Fixed(5)),
            OperationTemplate::pip(0.01, PipAnchor::Center),
        ])
        .unwrap()
    }

    #[test]
    fn nested_mix_is_described_with_effective_weights() {
        let mix = WeightedMix::builder()
            .with(0.8, OperationTemplate::write())
            .with_nested(0.2, read_mix())
            .build()
            .unwrap();
        let workload = LocationWorkload::new(BackendProfile::rdbms(), mix);

        workload.validate().unwrap();
        assert_eq!(
            "write 80.0%, range 6.7%, knn 6.7%, pip 6.7%",
            workload.describe_mix()
        );
    }

    #[test]
    fn operation_without_a_route_is_rejected() {
        let mut profile = BackendProfile::rdbms();
        profile.pip = None;
        let workload = LocationWorkload::new(profile, read_mix());

        assert_eq!(
            Err(ConfigurationError::MissingRoute {
                profile: "rdbms".to_string(),
                operation: "pip".to_string()
            }),
            workload.validate()
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let workload = LocationWorkload::new(BackendProfile::rdbms(), read_mix())
            .with_timeout(Duration::ZERO);

        assert!(workload.validate().is_err());
    }

    #[test]
    fn empty_user_pool_is_rejected() {
        let workload = LocationWorkload::new(BackendProfile::rdbms(), read_mix())
            .with_user_ids(UserIdStrategy::RandomPool { size: 0 });

        assert!(workload.validate().is_err());
    }
}
