use crate::cli::GeoTunnelScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the geo tunnel runner.
pub fn init() -> GeoTunnelScenarioCli {
    env_logger::init();

    GeoTunnelScenarioCli::parse()
}
