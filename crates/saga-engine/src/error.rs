// Saga error types

use thiserror::Error;

/// Errors raised while interpreting a saga definition or building its graph.
///
/// These are always fatal: they abort the run before any remote call is made.
#[derive(Error, Debug)]
pub enum DefinitionError {
	#[error("Failed to interpret JSON {raw}")]
	InvalidJson {
		raw: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("duplicate request id: '{0}'")]
	DuplicateId(String),

	#[error("request '{request}' depends on unknown parent '{parent}'")]
	UnknownParent { request: String, parent: String },

	#[error("dependency cycle detected: {}", .0.join(" -> "))]
	Cycle(Vec<String>),

	#[error("request '{request}' uses unsupported operation type '{kind}'")]
	UnsupportedKind { request: String, kind: String },

	#[error("request '{request}' uses invalid method '{method}'")]
	InvalidMethod { request: String, method: String },
}

impl DefinitionError {
	pub fn invalid_json(raw: impl Into<String>, source: serde_json::Error) -> Self {
		Self::InvalidJson {
			raw: raw.into(),
			source,
		}
	}

	pub fn unknown_parent(request: impl Into<String>, parent: impl Into<String>) -> Self {
		Self::UnknownParent {
			request: request.into(),
			parent: parent.into(),
		}
	}

	pub fn unsupported_kind(request: impl Into<String>, kind: impl Into<String>) -> Self {
		Self::UnsupportedKind {
			request: request.into(),
			kind: kind.into(),
		}
	}
}

/// A single remote call failed.
///
/// Recovered locally by the owning node's retry budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("no address configured for service '{0}'")]
	UnknownService(String),

	#[error("request to service '{service}' failed: {message}")]
	Request { service: String, message: String },

	#[error("service '{service}' responded with status {code}: {body}")]
	Status {
		service: String,
		code: u16,
		body: String,
	},

	#[error("no transport registered for operation type '{0}'")]
	Unsupported(String),
}

impl TransportError {
	pub fn request(service: impl Into<String>, message: impl ToString) -> Self {
		Self::Request {
			service: service.into(),
			message: message.to_string(),
		}
	}

	pub fn status(service: impl Into<String>, code: u16, body: impl Into<String>) -> Self {
		Self::Status {
			service: service.into(),
			code,
			body: body.into(),
		}
	}
}

/// Errors from loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to parse configuration: {0}")]
	Json(#[from] serde_json::Error),

	#[error("failed to parse configuration: {0}")]
	Yaml(#[from] serde_yaml::Error),

	#[error("failed to build http client: {0}")]
	Client(String),
}
