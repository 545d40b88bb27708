use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Why a request produced no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// The request timeout expired before a response arrived.
    Timeout,
    /// No connection could be made to the service.
    Connect,
    /// Any other transport failure, such as a reset connection.
    Transport,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Connect => write!(f, "connect"),
            ErrorKind::Transport => write!(f, "transport"),
        }
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The service answered with the status the operation expects.
    Success { status: u16 },
    /// The service answered, but with a different status.
    Failure { status: u16 },
    /// There was no usable response.
    Error { kind: ErrorKind },
}

impl OutcomeKind {
    /// Classify the result of a request against the status the operation expects.
    pub fn classify(response: Result<u16, ErrorKind>, expected_status: u16) -> Self {
        match response {
            Ok(status) if status == expected_status => OutcomeKind::Success { status },
            Ok(status) => OutcomeKind::Failure { status },
            Err(kind) => OutcomeKind::Error { kind },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OutcomeKind::Success { status } | OutcomeKind::Failure { status } => Some(*status),
            OutcomeKind::Error { .. } => None,
        }
    }
}

/// The recorded result of one dispatched request. Never changed after it is created.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub label: String,
    pub kind: OutcomeKind,
    pub latency: Duration,
    pub issued_at: DateTime<Utc>,
    /// Index of the schedule stage that was active when the request was issued.
    pub stage: usize,
    pub vu_id: usize,
}

impl RequestOutcome {
    pub fn new(
        label: impl Into<String>,
        kind: OutcomeKind,
        latency: Duration,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            latency,
            issued_at,
            stage: 0,
            vu_id: 0,
        }
    }

    pub fn with_stage(mut self, stage: usize) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_vu_id(mut self, vu_id: usize) -> Self {
        self.vu_id = vu_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_expected_status() {
        assert_eq!(
            OutcomeKind::Success { status: 202 },
            OutcomeKind::classify(Ok(202), 202)
        );
        assert_eq!(
            OutcomeKind::Failure { status: 200 },
            OutcomeKind::classify(Ok(200), 202)
        );
        assert_eq!(
            OutcomeKind::Failure { status: 503 },
            OutcomeKind::classify(Ok(503), 200)
        );
        assert_eq!(
            OutcomeKind::Error {
                kind: ErrorKind::Timeout
            },
            OutcomeKind::classify(Err(ErrorKind::Timeout), 200)
        );
    }
}
