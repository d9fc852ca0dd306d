//! Invocable units of work.
//!
//! An [`Operation`] is the transaction, compensation or fallback half of a
//! saga request. It is bound to a transport when the definition is
//! interpreted and is immutable afterwards, so it can be shared freely
//! between concurrently running nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::transport::{NopTransport, Transport};

/// Parameters grouped by channel (`query`, `form`, `json`, ...).
pub type Params = BTreeMap<String, BTreeMap<String, String>>;

/// Retry budget used when a definition does not specify one.
pub const DEFAULT_RETRIES: u32 = 3;

/// The closed set of transport kinds an operation can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
	/// A REST call against a named service
	Rest,
	/// Does nothing and always succeeds
	Nop,
}

impl OperationKind {
	pub fn parse(s: &str) -> Option<Self> {
		match s.to_ascii_lowercase().as_str() {
			"rest" => Some(Self::Rest),
			"nop" => Some(Self::Nop),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Rest => "rest",
			Self::Nop => "nop",
		}
	}
}

impl fmt::Display for OperationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The response of a successful remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaResponse {
	pub body: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
}

impl SagaResponse {
	pub fn new(body: impl Into<String>) -> Self {
		Self {
			body: body.into(),
			status: None,
		}
	}

	pub fn empty() -> Self {
		Self::new("")
	}

	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);
		self
	}
}

/// A single invocable remote operation.
#[derive(Clone)]
pub struct Operation {
	kind: OperationKind,
	method: Method,
	path: String,
	params: Params,
	retries: u32,
	transport: Arc<dyn Transport>,
}

impl Operation {
	pub fn new(
		kind: OperationKind,
		method: Method,
		path: impl Into<String>,
		params: Params,
		retries: u32,
		transport: Arc<dyn Transport>,
	) -> Self {
		Self {
			kind,
			method,
			path: path.into(),
			params,
			retries,
			transport,
		}
	}

	/// An operation that succeeds without contacting anything.
	pub fn nop() -> Self {
		Self {
			kind: OperationKind::Nop,
			method: Method::GET,
			path: String::new(),
			params: Params::new(),
			retries: 0,
			transport: Arc::new(NopTransport),
		}
	}

	pub fn kind(&self) -> OperationKind {
		self.kind
	}

	pub fn method(&self) -> &Method {
		&self.method
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn params(&self) -> &Params {
		&self.params
	}

	/// Additional attempts allowed after the first one fails.
	pub fn retries(&self) -> u32 {
		self.retries
	}

	pub fn is_nop(&self) -> bool {
		self.kind == OperationKind::Nop
	}

	/// Invoke the bound transport exactly once.
	pub async fn send(&self, service_name: &str) -> Result<SagaResponse, TransportError> {
		self
			.transport
			.invoke(service_name, &self.path, &self.method, &self.params)
			.await
	}
}

impl fmt::Debug for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Operation")
			.field("kind", &self.kind)
			.field("method", &self.method)
			.field("path", &self.path)
			.field("params", &self.params)
			.field("retries", &self.retries)
			.finish()
	}
}

/// Parse a definition method name ("post", "DELETE") into an HTTP method.
pub fn parse_method(method: &str) -> Option<Method> {
	if method.is_empty() {
		return None;
	}
	Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()
}
