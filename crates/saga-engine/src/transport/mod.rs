//! Transports perform the actual remote call behind an [`Operation`].
//!
//! Each [`OperationKind`] maps to exactly one transport. The mapping is held
//! in a [`TransportRegistry`] that is built once at startup and handed to the
//! definition interpreter, which binds every operation to its transport.
//!
//! [`Operation`]: crate::operation::Operation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use itertools::Itertools;

use crate::config::RestConfig;
use crate::error::{ConfigError, TransportError};
use crate::operation::{OperationKind, Params, SagaResponse};

mod rest;
#[cfg(any(test, feature = "testing"))]
mod recording;

#[cfg(any(test, feature = "testing"))]
pub use recording::{RecordedCall, RecordingTransport};
pub use rest::RestTransport;

/// Capability to invoke a remote operation against a named service.
///
/// Implementations must be safe to call concurrently; the engine never issues
/// the same node's transaction twice at the same time, but unrelated nodes
/// share the transport.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Perform one call. Timeouts are the transport's responsibility.
	async fn invoke(
		&self,
		service_name: &str,
		path: &str,
		method: &Method,
		params: &Params,
	) -> Result<SagaResponse, TransportError>;
}

/// Transport for [`OperationKind::Nop`]: always succeeds with an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopTransport;

#[async_trait]
impl Transport for NopTransport {
	async fn invoke(
		&self,
		_service_name: &str,
		_path: &str,
		_method: &Method,
		_params: &Params,
	) -> Result<SagaResponse, TransportError> {
		Ok(SagaResponse::empty())
	}
}

/// Immutable lookup from operation kind to transport.
#[derive(Clone)]
pub struct TransportRegistry {
	transports: HashMap<OperationKind, Arc<dyn Transport>>,
}

impl TransportRegistry {
	pub fn builder() -> TransportRegistryBuilder {
		TransportRegistryBuilder::default()
	}

	/// A registry backed by the REST transport described by `config`.
	pub fn rest(config: &RestConfig) -> Result<Self, ConfigError> {
		Ok(
			Self::builder()
				.with(OperationKind::Rest, Arc::new(RestTransport::new(config)?))
				.build(),
		)
	}

	/// Resolve the transport responsible for `kind`.
	pub fn resolve(&self, kind: OperationKind) -> Option<Arc<dyn Transport>> {
		self.transports.get(&kind).cloned()
	}

	pub fn supports(&self, kind: OperationKind) -> bool {
		self.transports.contains_key(&kind)
	}
}

impl std::fmt::Debug for TransportRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let kinds = self.transports.keys().map(|k| k.as_str()).sorted().collect_vec();
		f.debug_struct("TransportRegistry")
			.field("kinds", &kinds)
			.finish()
	}
}

/// Builder for [`TransportRegistry`]. The no-op transport is always present.
pub struct TransportRegistryBuilder {
	transports: HashMap<OperationKind, Arc<dyn Transport>>,
}

impl Default for TransportRegistryBuilder {
	fn default() -> Self {
		let mut transports: HashMap<OperationKind, Arc<dyn Transport>> = HashMap::new();
		transports.insert(OperationKind::Nop, Arc::new(NopTransport));
		Self { transports }
	}
}

impl TransportRegistryBuilder {
	pub fn with(mut self, kind: OperationKind, transport: Arc<dyn Transport>) -> Self {
		self.transports.insert(kind, transport);
		self
	}

	pub fn build(self) -> TransportRegistry {
		TransportRegistry {
			transports: self.transports,
		}
	}
}
