//! Engine, transport and logging configuration.
//!
//! All structs deserialize from camelCase JSON or YAML and reject unknown
//! fields. Every field has a default, so an empty document is valid.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::serde_dur_option;

/// Top level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub engine: EngineConfig,
	#[serde(default)]
	pub rest: RestConfig,
	#[serde(default)]
	pub logging: LogConfig,
}

impl Config {
	pub fn from_json(text: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(text)?)
	}

	pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
		Ok(serde_yaml::from_str(text)?)
	}
}

/// Execution engine tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
	/// Upper bound on concurrently running transactions (unbounded when absent)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_concurrency: Option<usize>,

	/// Fixed pause between attempts of the same operation
	#[serde(
		default,
		skip_serializing_if = "Option::is_none",
		with = "serde_dur_option"
	)]
	pub retry_backoff: Option<Duration>,

	/// Compensate independent nodes concurrently instead of one at a time
	#[serde(default)]
	pub parallel_compensation: bool,
}

/// REST transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RestConfig {
	/// Base address for each service name used in definitions
	#[serde(default)]
	pub services: HashMap<String, Url>,

	/// Per request timeout enforced by the HTTP client
	#[serde(
		default,
		skip_serializing_if = "Option::is_none",
		with = "serde_dur_option"
	)]
	pub request_timeout: Option<Duration>,
}

/// Log output settings consumed by [`crate::telemetry::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogConfig {
	/// `EnvFilter` directives, overridden by `RUST_LOG` when set
	#[serde(default = "default_filter")]
	pub filter: String,

	/// Emit JSON lines instead of human readable output
	#[serde(default)]
	pub json: bool,
}

fn default_filter() -> String {
	"info".to_string()
}

impl Default for LogConfig {
	fn default() -> Self {
		Self {
			filter: default_filter(),
			json: false,
		}
	}
}
