//! JSON saga definitions.
//!
//! [`JsonFormat`] interprets definition text into [`SagaRequest`]s, binding
//! every operation to the transport registered for its type:
//!
//! ```json
//! { "requests": [ {
//!     "id": "request-aaa", "type": "rest", "serviceName": "aaa",
//!     "parents": [],
//!     "transaction":  { "method": "post", "path": "/rest/as", "params": { "form": { "foo": "as" } } },
//!     "compensation": { "method": "delete", "path": "/rest/as", "retries": 4 },
//!     "fallback":     { "type": "rest", "method": "put", "path": "/rest/as" }
//! } ] }
//! ```
//!
//! Transactions and compensations retry 3 times unless told otherwise;
//! fallbacks do not retry by default. A missing compensation does nothing.

use serde::Deserialize;
use tracing::debug;

use crate::error::DefinitionError;
use crate::graph::SagaGraph;
use crate::operation::{DEFAULT_RETRIES, Operation, OperationKind, Params, parse_method};
use crate::request::SagaRequest;
use crate::transport::TransportRegistry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDefinition {
	#[serde(default)]
	requests: Vec<RawRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
	id: String,
	#[serde(rename = "type")]
	kind: String,
	service_name: String,
	#[serde(default)]
	parents: Vec<String>,
	transaction: RawOperation,
	#[serde(default)]
	compensation: Option<RawOperation>,
	#[serde(default)]
	fallback: Option<RawOperation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
	/// Only meaningful for fallbacks; defaults to the request type
	#[serde(rename = "type", default)]
	kind: Option<String>,
	method: String,
	#[serde(default)]
	path: String,
	#[serde(default)]
	params: Params,
	#[serde(default)]
	retries: Option<u32>,
}

/// The interpreted requests of one saga, in declaration order.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
	requests: Vec<SagaRequest>,
}

impl SagaDefinition {
	pub fn new(requests: Vec<SagaRequest>) -> Self {
		Self { requests }
	}

	pub fn requests(&self) -> &[SagaRequest] {
		&self.requests
	}

	/// Validate the dependency structure and build the runnable graph.
	pub fn into_graph(self) -> Result<SagaGraph, DefinitionError> {
		SagaGraph::new(self.requests)
	}
}

/// Interprets JSON saga definitions against a transport registry.
#[derive(Debug, Clone)]
pub struct JsonFormat {
	registry: TransportRegistry,
}

impl JsonFormat {
	pub fn new(registry: TransportRegistry) -> Self {
		Self { registry }
	}

	pub fn from_json(&self, text: &str) -> Result<SagaDefinition, DefinitionError> {
		let raw: RawDefinition =
			serde_json::from_str(text).map_err(|e| DefinitionError::invalid_json(text, e))?;

		let requests = raw
			.requests
			.into_iter()
			.map(|r| self.interpret(r))
			.collect::<Result<Vec<_>, _>>()?;

		debug!(request_count = requests.len(), "interpreted saga definition");
		Ok(SagaDefinition::new(requests))
	}

	fn interpret(&self, raw: RawRequest) -> Result<SagaRequest, DefinitionError> {
		let kind = OperationKind::parse(&raw.kind)
			.ok_or_else(|| DefinitionError::unsupported_kind(&raw.id, &raw.kind))?;

		let transaction = self.operation(&raw.id, kind, raw.transaction, DEFAULT_RETRIES)?;
		let compensation = raw
			.compensation
			.map(|op| self.operation(&raw.id, kind, op, DEFAULT_RETRIES))
			.transpose()?;
		let fallback = raw
			.fallback
			.map(|op| self.operation(&raw.id, kind, op, 0))
			.transpose()?;

		let mut request =
			SagaRequest::new(raw.id, raw.service_name, kind, transaction).with_parents(raw.parents);
		if let Some(compensation) = compensation {
			request = request.with_compensation(compensation);
		}
		if let Some(fallback) = fallback {
			request = request.with_fallback(fallback);
		}
		Ok(request)
	}

	fn operation(
		&self,
		request: &str,
		default_kind: OperationKind,
		raw: RawOperation,
		default_retries: u32,
	) -> Result<Operation, DefinitionError> {
		let kind = match raw.kind {
			Some(kind) => OperationKind::parse(&kind)
				.ok_or_else(|| DefinitionError::unsupported_kind(request, kind))?,
			None => default_kind,
		};
		let transport = self
			.registry
			.resolve(kind)
			.ok_or_else(|| DefinitionError::unsupported_kind(request, kind.as_str()))?;
		let method = parse_method(&raw.method).ok_or_else(|| DefinitionError::InvalidMethod {
			request: request.to_string(),
			method: raw.method.clone(),
		})?;

		Ok(Operation::new(
			kind,
			method,
			raw.path,
			raw.params,
			raw.retries.unwrap_or(default_retries),
			transport,
		))
	}
}
