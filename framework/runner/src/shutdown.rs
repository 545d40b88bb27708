use geo_tunnel_core::prelude::ShutdownHandle;
use tokio::signal;

/// Shut the scenario down on Ctrl-C. Virtual users finish their current iteration before they
/// stop, so the run still produces a report.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                listener_handle.shutdown();
                println!("Received shutdown signal, shutting down...");
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the scenario can only stop by itself: {e:?}");
            }
        }
    });

    Ok(handle)
}
