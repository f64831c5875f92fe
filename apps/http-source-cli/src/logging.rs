use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `-v` is given; otherwise `RUST_LOG` applies, then `warn`.
fn verbosity_directive(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("http_source=debug,http_source_cli=debug,info"),
        _ => Some("trace"),
    }
}

fn env_filter(verbose: u8) -> EnvFilter {
    match verbosity_directive(verbose) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the JSON outcome.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init(verbose: u8, json: bool) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(verbose));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if json {
        registry.with(fmt.json()).try_init()?;
    } else {
        registry.with(fmt).try_init()?;
    }
    Ok(())
}
