use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise dependencies log at `warn` and this
/// crate at `info`, or `debug` with `--verbose`. stdout is left to the run
/// summaries.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(verbose)).context("build log filter")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,wishshelf=debug"
    } else {
        "warn,wishshelf=info"
    }
}
