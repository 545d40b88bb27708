use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use geo_tunnel_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use geo_tunnel_instruments::Reporter;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::schedule::{IterationBudget, Schedule};

struct Member {
    retire: ShutdownHandle,
    handle: JoinHandle<()>,
}

/// The virtual users that are currently running, keyed by their 1-based id.
///
/// Ids are handed out lowest free id first and retirement takes the highest active id first, so
/// a ramp down followed by a ramp up reuses the same ids.
pub(crate) struct Population {
    active: BTreeMap<usize, Member>,
    retiring: Vec<(usize, JoinHandle<()>)>,
    free_ids: BTreeSet<usize>,
    next_id: usize,
}

impl Population {
    pub(crate) fn new() -> Self {
        Self {
            active: BTreeMap::new(),
            retiring: Vec::new(),
            free_ids: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Virtual users that are running and have not been asked to retire.
    pub(crate) fn active(&self) -> usize {
        self.active.len()
    }

    /// Virtual users that have been asked to retire but are still finishing an iteration.
    pub(crate) fn retiring(&self) -> usize {
        self.retiring.len()
    }

    fn take_id(&mut self) -> usize {
        self.free_ids.pop_first().unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        })
    }

    /// Forget virtual users that have finished, whether they were retired or stopped by themselves,
    /// and free their ids.
    pub(crate) fn reap(&mut self) {
        let finished = self
            .active
            .iter()
            .filter(|(_, member)| member.handle.is_finished())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in finished {
            self.active.remove(&id);
            self.free_ids.insert(id);
        }

        let free_ids = &mut self.free_ids;
        self.retiring.retain(|(id, handle)| {
            if handle.is_finished() {
                free_ids.insert(*id);
                false
            } else {
                true
            }
        });
    }

    /// Start or retire virtual users until `target` are active.
    ///
    /// `spawn` starts a virtual user with the given id, which must stop once the given handle is
    /// shut down. Retired virtual users are only signalled, they finish their current iteration
    /// before they exit.
    pub(crate) fn scale_to<F>(&mut self, target: usize, mut spawn: F)
    where
        F: FnMut(usize, ShutdownHandle) -> JoinHandle<()>,
    {
        self.reap();

        while self.active.len() < target {
            let id = self.take_id();
            let retire = ShutdownHandle::new();
            let handle = spawn(id, retire.clone());
            self.active.insert(id, Member { retire, handle });
        }

        self.retire_down_to(target);
    }

    fn retire_down_to(&mut self, target: usize) {
        while self.active.len() > target {
            let Some((id, member)) = self.active.pop_last() else {
                break;
            };
            member.retire.shutdown();
            self.retiring.push((id, member.handle));
        }
    }

    /// Retire everyone and wait for them to finish.
    ///
    /// An in-flight iteration is never aborted. If virtual users are still running after
    /// `graceful_ramp_down` a warning is logged and the wait continues.
    pub(crate) async fn retire_all(&mut self, graceful_ramp_down: Duration) {
        self.reap();
        self.retire_down_to(0);

        let handles = std::mem::take(&mut self.retiring);
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        let all = futures::future::join_all(handles.into_iter().map(|(_, handle)| handle));
        tokio::pin!(all);

        let results = match tokio::time::timeout(graceful_ramp_down, &mut all).await {
            Ok(results) => results,
            Err(_) => {
                log::warn!(
                    "Virtual users still running {}s after the end of the scenario, waiting for their in-flight requests",
                    graceful_ramp_down.as_secs_f64()
                );
                all.await
            }
        };

        for result in results {
            if let Err(e) = result {
                log::error!("Virtual user task failed: {e:?}");
            }
        }
        log::debug!("Retired {count} virtual users");
    }
}

/// The scheduler control loop.
///
/// Once per tick it compares the active population to the schedule's target and starts or retires
/// virtual users to match. It stops when the schedule has elapsed, the scenario is shut down or the
/// iteration budget runs out, then waits for every virtual user to finish.
pub(crate) async fn drive<F>(
    schedule: &Schedule,
    tick_interval: Duration,
    graceful_ramp_down: Duration,
    budget: Option<&IterationBudget>,
    reporter: &Reporter,
    mut shutdown_listener: DelegatedShutdownListener,
    mut spawn: F,
) -> Duration
where
    F: FnMut(usize, ShutdownHandle) -> JoinHandle<()>,
{
    let started = Instant::now();
    let total = schedule.total_duration();
    let mut population = Population::new();
    let mut stage = None;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= total {
            log::info!("All stages complete");
            break;
        }
        if shutdown_listener.should_shutdown() {
            log::info!("Scenario stopped early");
            break;
        }

        let current_stage = schedule.stage_index_at(elapsed);
        if stage != Some(current_stage) {
            log::info!("Entering stage {current_stage}");
            stage = Some(current_stage);
        }

        if budget.is_some_and(|b| b.is_exhausted()) {
            // Nothing left to hand out, let the remaining virtual users finish without replacing
            // them.
            population.reap();
            if population.active() == 0 {
                log::info!("All iterations complete");
                break;
            }
        } else {
            let target = schedule.target_at(elapsed);
            let before = population.active();
            population.scale_to(target, &mut spawn);
            if before != population.active() {
                log::debug!(
                    "Virtual users: {before} -> {} (target {target}, {} retiring)",
                    population.active(),
                    population.retiring()
                );
            }
        }
        reporter.observe_active_vus(population.active());

        tokio::select! {
            _ = tokio::time::sleep(tick_interval) => {}
            _ = shutdown_listener.wait_for_shutdown() => {}
        }
    }

    population.retire_all(graceful_ramp_down).await;

    started.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScenarioExecutor, Stage};
    use geo_tunnel_instruments::ReportConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Started = Arc<Mutex<Vec<usize>>>;

    fn idle_vu(started: Started) -> impl FnMut(usize, ShutdownHandle) -> JoinHandle<()> {
        move |id, retire| {
            started.lock().unwrap().push(id);
            let mut listener = retire.new_listener();
            tokio::spawn(async move {
                listener.wait_for_shutdown().await;
            })
        }
    }

    fn ids(started: &Started) -> Vec<usize> {
        started.lock().unwrap().clone()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn ids_are_reused_lowest_first_and_retired_highest_first() {
        let started = Started::default();
        let mut population = Population::new();

        population.scale_to(4, idle_vu(started.clone()));
        assert_eq!(vec![1, 2, 3, 4], ids(&started));

        population.scale_to(2, idle_vu(started.clone()));
        assert_eq!(2, population.active());
        assert_eq!(vec![1, 2], population.active.keys().copied().collect::<Vec<_>>());

        // Ids 3 and 4 are free once their tasks have finished.
        settle().await;
        population.scale_to(3, idle_vu(started.clone()));
        assert_eq!(vec![1, 2, 3, 4, 3], ids(&started));

        population.retire_all(Duration::from_secs(1)).await;
        assert_eq!(0, population.active());
        assert_eq!(0, population.retiring());
    }

    #[tokio::test]
    async fn retired_id_is_not_reused_while_still_running() {
        let started = Started::default();
        let mut population = Population::new();

        // This virtual user ignores its retire signal for a while.
        population.scale_to(1, |id, _retire| {
            started.lock().unwrap().push(id);
            tokio::spawn(tokio::time::sleep(Duration::from_millis(200)))
        });
        population.scale_to(0, idle_vu(started.clone()));
        population.scale_to(1, idle_vu(started.clone()));

        assert_eq!(vec![1, 2], ids(&started));
        assert_eq!(1, population.retiring());

        population.retire_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn slow_retirement_is_waited_for_past_the_grace_period() {
        let mut population = Population::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        population.scale_to(1, move |_, _| {
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
        });

        population.retire_all(Duration::from_millis(10)).await;

        assert_eq!(1, finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drive_never_runs_more_than_the_target() {
        let schedule = ScenarioExecutor::RampingVus {
            start_vus: 0,
            stages: vec![
                Stage::new(Duration::from_millis(300), 6),
                Stage::new(Duration::from_millis(300), 6),
                Stage::new(Duration::from_millis(300), 0),
            ],
        }
        .schedule();
        let reporter = ReportConfig::default()
            .init(&tokio::runtime::Handle::current())
            .unwrap();
        let shutdown = ShutdownHandle::new();

        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let (r, m) = (running.clone(), max_running.clone());
        drive(
            &schedule,
            Duration::from_millis(10),
            Duration::from_secs(1),
            None,
            &reporter,
            shutdown.new_listener(),
            move |_, retire| {
                let (running, max_running) = (r.clone(), m.clone());
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                let mut listener = retire.new_listener();
                tokio::spawn(async move {
                    listener.wait_for_shutdown().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            },
        )
        .await;

        assert_eq!(0, running.load(Ordering::SeqCst));
        // Retiring virtual users stop straight away here, so this is at most one tick's spawn
        // batch above the peak of the schedule.
        assert!(max_running.load(Ordering::SeqCst) <= 7);
        let report = reporter.finalize(Duration::from_secs(1)).await;
        assert_eq!(6, report.peak_vus);
    }

    #[tokio::test]
    async fn drive_stops_when_iterations_run_out() {
        let schedule = ScenarioExecutor::SharedIterations {
            vus: 3,
            iterations: 30,
            max_duration: Duration::from_secs(30),
        }
        .schedule();
        let budget = Arc::new(IterationBudget::new(30));
        let reporter = ReportConfig::default()
            .init(&tokio::runtime::Handle::current())
            .unwrap();
        let shutdown = ShutdownHandle::new();
        let done = Arc::new(AtomicUsize::new(0));

        let (b, d) = (budget.clone(), done.clone());
        let elapsed = drive(
            &schedule,
            Duration::from_millis(10),
            Duration::from_secs(1),
            Some(&budget),
            &reporter,
            shutdown.new_listener(),
            move |_, _| {
                let (budget, done) = (b.clone(), d.clone());
                tokio::spawn(async move {
                    while budget.claim().is_some() {
                        done.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                })
            },
        )
        .await;

        assert_eq!(30, done.load(Ordering::SeqCst));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn drive_stops_on_shutdown() {
        let schedule = ScenarioExecutor::ConstantVus {
            vus: 2,
            duration: Duration::from_secs(60),
        }
        .schedule();
        let reporter = ReportConfig::default()
            .init(&tokio::runtime::Handle::current())
            .unwrap();
        let shutdown = ShutdownHandle::new();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.shutdown();
        });

        let elapsed = drive(
            &schedule,
            Duration::from_secs(1),
            Duration::from_secs(1),
            None,
            &reporter,
            shutdown.new_listener(),
            |_, retire| {
                let mut listener = retire.new_listener();
                tokio::spawn(async move { listener.wait_for_shutdown().await })
            },
        )
        .await;

        assert!(elapsed < Duration::from_secs(5));
    }
}
