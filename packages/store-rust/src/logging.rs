//! Tracing subscriber setup for binaries embedding the store.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `filter` (an `EnvFilter`
/// directive such as `info` or `entitygraph_store=debug`). Log lines go to
/// stderr, as JSON objects when `json` is set.
///
/// # Errors
///
/// Fails if `filter` does not parse or a global subscriber is already set.
pub fn init_tracing(filter: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err))
}
