//! Engine-owned bookkeeping for a single saga run.
//!
//! The ledger is created when a run starts, mutated only by the task driving
//! the run, and turned into a [`SagaResult`] when the run ends.

use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::graph::SagaGraph;
use crate::result::{
	AttemptRecord, CompensationRecord, NodeReport, SagaEvent, SagaResult, TraceEntry, aggregate,
};
use crate::state::NodeState;

/// An entry of the append-only completion log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
	pub request: String,
	pub seq: u64,
}

/// What a finished forward state machine reports back.
#[derive(Debug)]
pub(crate) struct TransactionRun {
	pub id: String,
	pub state: NodeState,
	pub attempts: Vec<AttemptRecord>,
	pub response: Option<crate::operation::SagaResponse>,
	pub error: Option<String>,
}

/// What a finished compensation state machine reports back.
#[derive(Debug)]
pub(crate) struct CompensationRun {
	pub id: String,
	pub state: NodeState,
	pub attempts: Vec<AttemptRecord>,
	pub error: Option<String>,
}

pub(crate) struct RunLedger {
	run_id: Uuid,
	reports: IndexMap<String, NodeReport>,
	completion_log: Vec<CompletionRecord>,
	compensations: Vec<CompensationRecord>,
	events: Vec<TraceEntry>,
	failed_request: Option<String>,
}

impl RunLedger {
	pub fn new(run_id: Uuid, graph: &SagaGraph) -> Self {
		let reports = graph
			.requests()
			.map(|r| (r.id().to_string(), NodeReport::new(r.id(), r.service_name())))
			.collect();
		let mut ledger = Self {
			run_id,
			reports,
			completion_log: Vec::new(),
			compensations: Vec::new(),
			events: Vec::new(),
			failed_request: None,
		};
		ledger.push(SagaEvent::SagaStarted {
			requests: graph.len(),
		});
		ledger
	}

	pub fn state(&self, id: &str) -> NodeState {
		self
			.reports
			.get(id)
			.map(|r| r.state)
			.unwrap_or(NodeState::Pending)
	}

	pub fn failed_request(&self) -> Option<&str> {
		self.failed_request.as_deref()
	}

	pub fn completion_log(&self) -> &[CompletionRecord] {
		&self.completion_log
	}

	fn push(&mut self, event: SagaEvent) {
		self.events.push(TraceEntry {
			at: Utc::now(),
			event,
		});
	}

	fn set_state(&mut self, id: &str, state: NodeState) {
		if let Some(report) = self.reports.get_mut(id) {
			report.state = state;
		}
	}

	pub fn transaction_started(&mut self, id: &str) {
		self.set_state(id, NodeState::Running);
		self.push(SagaEvent::TransactionStarted {
			request: id.to_string(),
		});
	}

	/// Record a finished forward machine. Commits are appended to the
	/// completion log exactly once.
	pub fn transaction_finished(&mut self, run: TransactionRun) {
		let TransactionRun {
			id,
			state,
			attempts,
			response,
			error,
		} = run;

		let seq = if state.is_committed() {
			let seq = self.completion_log.len() as u64 + 1;
			self.completion_log.push(CompletionRecord {
				request: id.clone(),
				seq,
			});
			Some(seq)
		} else {
			None
		};

		if let Some(report) = self.reports.get_mut(&id) {
			report.state = state;
			report.attempts.extend(attempts);
			report.response = response;
			report.error = error.clone();
			report.committed_seq = seq;
		}

		let event = match (state, seq) {
			(NodeState::Committed, Some(seq)) => SagaEvent::TransactionCommitted { request: id, seq },
			(NodeState::FallbackCommitted, Some(seq)) => SagaEvent::FallbackCommitted { request: id, seq },
			_ => SagaEvent::TransactionAborted {
				request: id,
				error: error.unwrap_or_default(),
			},
		};
		self.push(event);
	}

	/// A ready request that was never started because the run halted first.
	/// It stays `Pending`.
	pub fn transaction_skipped(&mut self, id: &str) {
		self.push(SagaEvent::TransactionSkipped {
			request: id.to_string(),
		});
	}

	/// Mark `id` as the failure that aborts the run. Only the first call wins.
	pub fn trigger_compensation(&mut self, id: &str) -> bool {
		if self.failed_request.is_some() {
			return false;
		}
		self.failed_request = Some(id.to_string());
		self.push(SagaEvent::CompensationTriggered {
			request: id.to_string(),
		});
		true
	}

	/// Committed requests, most recently committed first.
	pub fn compensation_candidates(&self) -> Vec<String> {
		self
			.completion_log
			.iter()
			.rev()
			.filter(|r| self.state(&r.request).is_committed())
			.map(|r| r.request.clone())
			.collect()
	}

	/// Move a committed request into `Compensating`. Refuses anything else,
	/// which makes replaying compensation a no-op.
	pub fn begin_compensation(&mut self, id: &str) -> bool {
		let state = self.state(id);
		if !state.is_committed() {
			debug!(request = %id, ?state, "skipping compensation");
			return false;
		}
		self.set_state(id, NodeState::Compensating);
		self.push(SagaEvent::CompensationStarted {
			request: id.to_string(),
		});
		true
	}

	pub fn compensation_finished(&mut self, run: CompensationRun) {
		let CompensationRun {
			id,
			state,
			attempts,
			error,
		} = run;

		self.compensations.push(CompensationRecord {
			request: id.clone(),
			state,
			attempts: attempts.len() as u32,
			error: error.clone(),
		});
		if let Some(report) = self.reports.get_mut(&id) {
			report.state = state;
			report.attempts.extend(attempts);
			if error.is_some() {
				report.error = error.clone();
			}
		}

		let event = match state {
			NodeState::Compensated => SagaEvent::Compensated { request: id },
			_ => SagaEvent::CompensationFailed {
				request: id,
				error: error.unwrap_or_default(),
			},
		};
		self.push(event);
	}

	pub fn finish(mut self, duration: Duration) -> SagaResult {
		let outcome = aggregate(self.reports.values().map(|r| &r.state));
		self.push(SagaEvent::SagaEnded { outcome });
		SagaResult {
			run_id: self.run_id,
			outcome,
			failed_request: self.failed_request,
			requests: self.reports,
			compensations: self.compensations,
			events: self.events,
			duration,
		}
	}
}
