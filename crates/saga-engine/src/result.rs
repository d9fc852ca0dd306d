//! Saga run results and the response aggregator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::operation::SagaResponse;
use crate::state::{NodeState, OperationRole};

/// Run level outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SagaOutcome {
	/// Every request committed, directly or through its fallback
	#[serde(rename = "SAGA_COMMITTED")]
	Committed,
	/// Compensation ran and every affected request was undone
	#[serde(rename = "SAGA_COMPENSATED")]
	Compensated,
	/// At least one compensation exhausted its budget; needs an operator
	#[serde(rename = "SAGA_COMPENSATION_FAILED")]
	CompensationFailed,
}

/// Fold final node states into a run outcome.
pub fn aggregate<'a>(states: impl IntoIterator<Item = &'a NodeState>) -> SagaOutcome {
	let mut all_committed = true;
	for state in states {
		if *state == NodeState::CompensationFailed {
			return SagaOutcome::CompensationFailed;
		}
		all_committed &= state.is_committed();
	}
	if all_committed {
		SagaOutcome::Committed
	} else {
		SagaOutcome::Compensated
	}
}

/// One call made on behalf of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
	pub role: OperationRole,
	/// One based attempt number within `role`
	pub attempt: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<SagaResponse>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl AttemptRecord {
	pub fn succeeded(role: OperationRole, attempt: u32, response: SagaResponse) -> Self {
		Self {
			role,
			attempt,
			response: Some(response),
			error: None,
		}
	}

	pub fn failed(role: OperationRole, attempt: u32, error: impl ToString) -> Self {
		Self {
			role,
			attempt,
			response: None,
			error: Some(error.to_string()),
		}
	}

	pub fn is_success(&self) -> bool {
		self.error.is_none()
	}
}

/// Final view of one request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
	pub id: String,
	pub service_name: String,
	pub state: NodeState,
	pub attempts: Vec<AttemptRecord>,
	/// Response of the committing transaction or fallback call
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<SagaResponse>,
	/// Last error seen by the forward or compensating operation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Position in the completion log when the request committed
	#[serde(skip_serializing_if = "Option::is_none")]
	pub committed_seq: Option<u64>,
}

impl NodeReport {
	pub fn new(id: impl Into<String>, service_name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			service_name: service_name.into(),
			state: NodeState::Pending,
			attempts: Vec::new(),
			response: None,
			error: None,
			committed_seq: None,
		}
	}

	pub fn attempts_for(&self, role: OperationRole) -> usize {
		self.attempts.iter().filter(|a| a.role == role).count()
	}

	pub fn never_started(&self) -> bool {
		self.state == NodeState::Pending
	}
}

/// Outcome of one compensation, in the order compensations finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRecord {
	pub request: String,
	pub state: NodeState,
	pub attempts: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Lifecycle events, in the order the engine observed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SagaEvent {
	SagaStarted { requests: usize },
	TransactionStarted { request: String },
	TransactionCommitted { request: String, seq: u64 },
	FallbackCommitted { request: String, seq: u64 },
	TransactionAborted { request: String, error: String },
	TransactionSkipped { request: String },
	CompensationTriggered { request: String },
	CompensationStarted { request: String },
	Compensated { request: String },
	CompensationFailed { request: String, error: String },
	SagaEnded { outcome: SagaOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
	pub at: DateTime<Utc>,
	#[serde(flatten)]
	pub event: SagaEvent,
}

/// Everything known about a finished saga run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaResult {
	pub run_id: Uuid,
	pub outcome: SagaOutcome,
	/// The request whose failure triggered compensation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failed_request: Option<String>,
	pub requests: IndexMap<String, NodeReport>,
	pub compensations: Vec<CompensationRecord>,
	pub events: Vec<TraceEntry>,
	pub duration: Duration,
}

impl SagaResult {
	pub fn is_committed(&self) -> bool {
		self.outcome == SagaOutcome::Committed
	}

	pub fn state(&self, request: &str) -> Option<NodeState> {
		self.requests.get(request).map(|r| r.state)
	}

	pub fn report(&self, request: &str) -> Option<&NodeReport> {
		self.requests.get(request)
	}

	/// Requests the run never reached.
	pub fn never_started(&self) -> Vec<&str> {
		self
			.requests
			.values()
			.filter(|r| r.never_started())
			.map(|r| r.id.as_str())
			.collect()
	}

	/// Requests in the order their compensations finished.
	pub fn compensation_order(&self) -> Vec<&str> {
		self.compensations.iter().map(|c| c.request.as_str()).collect()
	}

	pub fn events(&self) -> impl Iterator<Item = &SagaEvent> {
		self.events.iter().map(|e| &e.event)
	}
}
