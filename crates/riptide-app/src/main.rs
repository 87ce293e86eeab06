#![forbid(unsafe_code)]

//! Binary entrypoint that wires the Riptide services together.

use riptide_app::{AppResult, run_app};

/// Bootstraps the Riptide daemon and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
