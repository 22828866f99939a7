use eyre::{eyre, Result};
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryArgs;

/// Log level for a `-v` count, starting from `base` occurrences.
fn level(verbose: u8, base: u8) -> &'static str {
    match verbose.saturating_add(base) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `-v` count.
///
/// Keep the returned guard alive for as long as the Chrome trace should be
/// written; dropping it flushes the file.
pub fn init(args: &TelemetryArgs, base: u8) -> Result<Option<FlushGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level(args.verbose, base)));

    let (chrome, guard) = match &args.trace_chrome {
        Some(path) => {
            let (layer, guard) = ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(chrome)
        .try_init()
        .map_err(|e| eyre!("failed to install the tracing subscriber: {e}"))?;

    Ok(guard)
}
