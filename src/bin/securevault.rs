//! Shim binary that calls into the `securevault_server` library's `inner_main`.
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    securevault_server::inner_main().await
}
