//! Log subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns false if a
/// global subscriber was already installed, which leaves that one in place.
pub fn init(config: &LogConfig) -> bool {
	let filter = env_filter(config);
	let registry = tracing_subscriber::registry().with(filter);
	let installed = if config.json {
		registry
			.with(tracing_subscriber::fmt::layer().json())
			.try_init()
	} else {
		registry.with(tracing_subscriber::fmt::layer()).try_init()
	};
	installed.is_ok()
}

fn env_filter(config: &LogConfig) -> EnvFilter {
	EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.filter))
		.unwrap_or_else(|_| EnvFilter::new("info"))
}
