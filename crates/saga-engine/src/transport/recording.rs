//! Scriptable in-memory transport for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;

use super::Transport;
use crate::error::TransportError;
use crate::operation::{Params, SagaResponse};

type CallKey = (String, Method);

/// A call observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
	pub service: String,
	pub path: String,
	pub method: Method,
	pub params: Params,
}

/// Transport that records every call and replies from a script.
///
/// Calls are keyed by service name and method. Scripted replies are consumed
/// in order; once exhausted (or when nothing is scripted) the call succeeds
/// with a body of `"<METHOD> <service><path>"`, unless the key was marked with
/// [`RecordingTransport::always_fail`].
#[derive(Default)]
pub struct RecordingTransport {
	scripts: Mutex<HashMap<CallKey, VecDeque<Result<SagaResponse, TransportError>>>>,
	failing: Mutex<HashSet<CallKey>>,
	latency: Mutex<HashMap<String, Duration>>,
	calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue a successful reply.
	pub fn respond(&self, service: &str, method: Method, response: SagaResponse) -> &Self {
		self
			.scripts
			.lock()
			.unwrap()
			.entry((service.to_string(), method))
			.or_default()
			.push_back(Ok(response));
		self
	}

	/// Queue `times` failures before falling back to the default reply.
	pub fn fail_times(&self, service: &str, method: Method, times: usize) -> &Self {
		let mut scripts = self.scripts.lock().unwrap();
		let queue = scripts.entry((service.to_string(), method)).or_default();
		for _ in 0..times {
			queue.push_back(Err(TransportError::status(service, 503, "scripted failure")));
		}
		self
	}

	/// Fail every call to `service` with `method`.
	pub fn always_fail(&self, service: &str, method: Method) -> &Self {
		self
			.failing
			.lock()
			.unwrap()
			.insert((service.to_string(), method));
		self
	}

	/// Delay every call to `service` by `latency` after it is recorded.
	pub fn with_latency(&self, service: &str, latency: Duration) -> &Self {
		self
			.latency
			.lock()
			.unwrap()
			.insert(service.to_string(), latency);
		self
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().unwrap().len()
	}

	/// Number of calls made to `service` with `method`.
	pub fn calls_to(&self, service: &str, method: &Method) -> usize {
		self
			.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|c| c.service == service && &c.method == method)
			.count()
	}

	/// Services called with `method`, in call order.
	pub fn services_called(&self, method: &Method) -> Vec<String> {
		self
			.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|c| &c.method == method)
			.map(|c| c.service.clone())
			.collect()
	}
}

#[async_trait]
impl Transport for RecordingTransport {
	async fn invoke(
		&self,
		service_name: &str,
		path: &str,
		method: &Method,
		params: &Params,
	) -> Result<SagaResponse, TransportError> {
		self.calls.lock().unwrap().push(RecordedCall {
			service: service_name.to_string(),
			path: path.to_string(),
			method: method.clone(),
			params: params.clone(),
		});

		let latency = self.latency.lock().unwrap().get(service_name).copied();
		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}

		let key = (service_name.to_string(), method.clone());
		if self.failing.lock().unwrap().contains(&key) {
			return Err(TransportError::status(service_name, 500, "permanent failure"));
		}

		let scripted = self
			.scripts
			.lock()
			.unwrap()
			.get_mut(&key)
			.and_then(|queue| queue.pop_front());

		scripted.unwrap_or_else(|| Ok(SagaResponse::new(format!("{} {}{}", method, service_name, path))))
	}
}
