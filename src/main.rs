//! Binary entry point: registers the provider with the plugin host.
//!
//! Does nothing beyond logging setup and serving the provider over the
//! handshake protocol; all behavior lives in the library.

use hemmer_provider_dynatrace::{init_logging, serve, DynatraceProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting Dynatrace provider"
    );

    serve(DynatraceProvider::new()).await
}
