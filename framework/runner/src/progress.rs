use std::cmp::min;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geo_tunnel_core::prelude::DelegatedShutdownListener;
use geo_tunnel_instruments::Reporter;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar while the test is running to show the user how long is left, along
/// with running request counts.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    reporter: Arc<Reporter>,
    mut shutdown_listener: DelegatedShutdownListener,
) {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )
    .map(|style| {
        style
            .with_key("planned_runtime", {
                let hours = planned_runtime.as_secs() / 3600;
                let minutes = (planned_runtime.as_secs() % 3600) / 60;
                let seconds = planned_runtime.as_secs() % 60;
                move |_state: &ProgressState, w: &mut dyn Write| {
                    let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
                }
            })
            .progress_chars("#>-")
    });
    let style = match style {
        Ok(style) => style,
        Err(e) => {
            log::warn!("Invalid progress bar template, not showing progress: {e:?}");
            return;
        }
    };

    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let elapsed = start_time.elapsed();
                let snapshot = reporter.snapshot(elapsed);
                pb.set_message(format!(
                    "{} requests, {} failed, {} errors",
                    snapshot.total.attempts, snapshot.total.failures, snapshot.total.errors
                ));
                pb.set_position(min(elapsed.as_secs(), planned_runtime.as_secs()));
                std::thread::sleep(Duration::from_secs(1));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e:?}");
    }
}
