/// A malformed scenario definition.
///
/// Always fatal. It is raised while the scenario is being built, before any virtual user starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Mix has no entries")]
    EmptyMix,
    #[error("Mix weight {weight} at position {index} is not a finite, non-negative number")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("Mix weights sum to {sum}, expected 1.0")]
    WeightsDoNotSumToOne { sum: f64 },
    #[error("Scenario has no stages")]
    NoStages,
    #[error("Scenario has a total duration of zero")]
    ZeroDuration,
    #[error("Scenario needs at least one virtual user")]
    NoVirtualUsers,
    #[error("No virtual user behaviour has been set")]
    NoBehaviour,
    #[error("Unknown backend [{name}], available backends: {available}")]
    UnknownBackend { name: String, available: String },
    #[error("Backend profile [{profile}] has no route for [{operation}] operations")]
    MissingRoute { profile: String, operation: String },
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
