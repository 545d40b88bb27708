use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use geo_tunnel_core::prelude::ConfigurationError;
use geo_tunnel_instruments::StagePlan;
use itertools::Itertools;

/// One step of a ramp schedule.
///
/// The number of virtual users moves linearly from the previous stage's target, or the schedule's
/// starting population for the first stage, to `target` over `duration`. A stage whose target is
/// the same as the previous one holds the population steady.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// How virtual users are scheduled over the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioExecutor {
    /// Follow a table of stages, starting from `start_vus`.
    RampingVus { start_vus: usize, stages: Vec<Stage> },
    /// A fixed population for a fixed time.
    ConstantVus { vus: usize, duration: Duration },
    /// A fixed population works through `iterations` between them. Each iteration index is handed
    /// out exactly once. The run ends when every iteration has been handed out or when
    /// `max_duration` has passed, whichever comes first.
    SharedIterations {
        vus: usize,
        iterations: u64,
        max_duration: Duration,
    },
}

impl ScenarioExecutor {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            ScenarioExecutor::RampingVus { start_vus, stages } => {
                if stages.is_empty() {
                    return Err(ConfigurationError::NoStages);
                }
                if stages.iter().all(|s| s.duration.is_zero()) {
                    return Err(ConfigurationError::ZeroDuration);
                }
                if *start_vus == 0 && stages.iter().all(|s| s.target == 0) {
                    return Err(ConfigurationError::NoVirtualUsers);
                }
            }
            ScenarioExecutor::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(ConfigurationError::NoVirtualUsers);
                }
                if duration.is_zero() {
                    return Err(ConfigurationError::ZeroDuration);
                }
            }
            ScenarioExecutor::SharedIterations {
                vus,
                iterations,
                max_duration,
            } => {
                if *vus == 0 {
                    return Err(ConfigurationError::NoVirtualUsers);
                }
                if *iterations == 0 {
                    return Err(ConfigurationError::invalid(
                        "iterations",
                        "a shared iterations scenario needs at least one iteration",
                    ));
                }
                if max_duration.is_zero() {
                    return Err(ConfigurationError::ZeroDuration);
                }
            }
        }

        Ok(())
    }

    /// The population the scheduler tracks. Shared iterations keep a constant population until
    /// the iterations run out.
    pub fn schedule(&self) -> Schedule {
        match self {
            ScenarioExecutor::RampingVus { start_vus, stages } => Schedule {
                start_vus: *start_vus,
                stages: stages.clone(),
            },
            ScenarioExecutor::ConstantVus { vus, duration } => Schedule {
                start_vus: *vus,
                stages: vec![Stage::new(*duration, *vus)],
            },
            ScenarioExecutor::SharedIterations {
                vus, max_duration, ..
            } => Schedule {
                start_vus: *vus,
                stages: vec![Stage::new(*max_duration, *vus)],
            },
        }
    }

    pub fn iterations(&self) -> Option<u64> {
        match self {
            ScenarioExecutor::SharedIterations { iterations, .. } => Some(*iterations),
            _ => None,
        }
    }
}

impl Display for ScenarioExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioExecutor::RampingVus { start_vus, stages } => write!(
                f,
                "ramping-vus[start {start_vus}, {}]",
                stages
                    .iter()
                    .map(|s| format!("{}s->{}", s.duration.as_secs_f64(), s.target))
                    .join(", ")
            ),
            ScenarioExecutor::ConstantVus { vus, duration } => {
                write!(f, "constant-vus[{vus} for {}s]", duration.as_secs_f64())
            }
            ScenarioExecutor::SharedIterations {
                vus,
                iterations,
                max_duration,
            } => write!(
                f,
                "shared-iterations[{vus} vus, {iterations} iterations, max {}s]",
                max_duration.as_secs_f64()
            ),
        }
    }
}

/// The target population over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    start_vus: usize,
    stages: Vec<Stage>,
}

impl Schedule {
    /// The number of virtual users that should be active `elapsed` into the run, rounded to the
    /// nearest whole virtual user. After the last stage this is the last stage's target.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let target = from as f64 + (stage.target as f64 - from as f64) * progress;
                return target.round() as usize;
            }

            from = stage.target;
            stage_start = stage_end;
        }

        from
    }

    /// Index of the stage that is running `elapsed` into the run. Time past the end of the
    /// schedule, such as the graceful ramp down, belongs to the last stage.
    pub fn stage_index_at(&self, elapsed: Duration) -> usize {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return index;
            }
        }

        self.stages.len().saturating_sub(1)
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The largest target anywhere in the schedule.
    pub fn peak_target(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, usize::max)
    }

    pub fn stage_plans(&self) -> Vec<StagePlan> {
        self.stages
            .iter()
            .map(|s| StagePlan {
                duration: s.duration,
                target_vus: s.target,
            })
            .collect()
    }
}

/// Hands out the iteration indices of a shared iterations scenario, each exactly once.
#[derive(Debug)]
pub struct IterationBudget {
    claimed: AtomicU64,
    total: u64,
}

impl IterationBudget {
    pub fn new(total: u64) -> Self {
        Self {
            claimed: AtomicU64::new(0),
            total,
        }
    }

    /// Claim the next global iteration index, or `None` once all of them have been handed out.
    pub fn claim(&self) -> Option<u64> {
        let index = self.claimed.fetch_add(1, Ordering::Relaxed);
        (index < self.total).then_some(index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.claimed.load(Ordering::Relaxed) >= self.total
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed).min(self.total)
    }
}
