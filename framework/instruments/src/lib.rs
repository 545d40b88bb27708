mod histogram;
mod outcome;
mod report;

pub use histogram::LatencyHistogram;
pub use outcome::{ErrorKind, OutcomeKind, RequestOutcome};
pub use report::{ReportConfig, Reporter, StagePlan, DEFAULT_BUFFER_CAPACITY};

pub mod prelude {
    pub use crate::{ErrorKind, OutcomeKind, ReportConfig, Reporter, RequestOutcome, StagePlan};
}
