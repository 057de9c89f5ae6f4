//! Tracing subscriber setup.

use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tower=warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// `log` records from the Drive client are forwarded as tracing events.
pub fn init(json: bool) -> Result<(), TryInitError> {
    if json {
        init_with_layer(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true),
        )
    } else {
        init_with_layer(tracing_subscriber::fmt::layer().compact().with_target(true))
    }
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_with_layer<L>(fmt_layer: L) -> Result<(), TryInitError>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(build_env_filter())
        .try_init()
}
