//! Compensation coordinator.
//!
//! Undoes every committed request of an aborted run, most recently committed
//! first. A request is only compensated once each of its committed children
//! has finished compensating, successfully or not.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::graph::SagaGraph;
use crate::ledger::{CompensationRun, RunLedger};
use crate::request::SagaRequest;
use crate::result::AttemptRecord;
use crate::state::{CompensationMachine, CompensationPhase, NodeState, OperationRole};

pub struct CompensationCoordinator<'g> {
	graph: &'g SagaGraph,
	parallel: bool,
	retry_backoff: Option<Duration>,
}

impl<'g> CompensationCoordinator<'g> {
	pub fn new(graph: &'g SagaGraph, config: &EngineConfig) -> Self {
		Self {
			graph,
			parallel: config.parallel_compensation,
			retry_backoff: config.retry_backoff,
		}
	}

	/// Compensate every request the ledger still reports as committed.
	///
	/// Calling this again after it returned does nothing: compensated and
	/// failed compensations are never retried.
	pub(crate) async fn compensate(&self, ledger: &mut RunLedger) {
		let mut pending = ledger.compensation_candidates();
		if pending.is_empty() {
			debug!("Nothing to compensate");
			return;
		}

		info!(
			request_count = pending.len(),
			parallel = self.parallel,
			"Starting compensation for committed requests"
		);

		let mut in_flight = FuturesUnordered::new();
		loop {
			for id in self.take_eligible(&mut pending, ledger, in_flight.is_empty()) {
				let Some(request) = self.graph.get(&id) else {
					continue;
				};
				if ledger.begin_compensation(&id) {
					in_flight.push(self.drive_compensation(request));
				}
			}

			match in_flight.next().await {
				Some(run) => ledger.compensation_finished(run),
				None if pending.is_empty() => break,
				None => {
					// Only reachable if the completion log disagrees with the
					// graph; compensate in log order rather than stall.
					let id = pending.remove(0);
					warn!(request_id = %id, "Compensating before its children settled");
					if let Some(request) = self.graph.get(&id)
						&& ledger.begin_compensation(&id)
					{
						let run = self.drive_compensation(request).await;
						ledger.compensation_finished(run);
					}
				},
			}
		}
	}

	/// Remove and return the requests that may start compensating now.
	///
	/// Sequential mode hands out the head of the queue once nothing is in
	/// flight. Parallel mode hands out every request whose children settled,
	/// keeping reverse completion order among them.
	fn take_eligible(
		&self,
		pending: &mut Vec<String>,
		ledger: &RunLedger,
		idle: bool,
	) -> Vec<String> {
		if !self.parallel {
			if idle && pending.first().is_some_and(|id| self.children_settled(id, ledger)) {
				return vec![pending.remove(0)];
			}
			return Vec::new();
		}

		let (ready, waiting): (Vec<_>, Vec<_>) = pending
			.drain(..)
			.partition(|id| self.children_settled(id, ledger));
		*pending = waiting;
		ready
	}

	/// No child is committed or still compensating.
	fn children_settled(&self, id: &str, ledger: &RunLedger) -> bool {
		self.graph.children(id).iter().all(|child| {
			!matches!(
				ledger.state(child),
				NodeState::Committed | NodeState::FallbackCommitted | NodeState::Compensating
			)
		})
	}

	async fn drive_compensation(&self, request: &SagaRequest) -> CompensationRun {
		let operation = request.compensation();
		if operation.is_nop() {
			debug!(request_id = %request.id(), "Request has no compensation action, marking compensated");
			return CompensationRun {
				id: request.id().to_string(),
				state: NodeState::Compensated,
				attempts: Vec::new(),
				error: None,
			};
		}

		let mut machine = CompensationMachine::new(operation.retries());
		let began = machine.begin();
		debug_assert!(began, "fresh compensation machine refused to start");
		let mut attempts = Vec::new();
		let mut last_error = None;

		while let CompensationPhase::Attempting(n) = machine.phase() {
			if n > 0
				&& let Some(backoff) = self.retry_backoff
			{
				tokio::time::sleep(backoff).await;
			}

			let attempt = n + 1;
			debug!(request_id = %request.id(), attempt, "Compensating request");
			match operation.send(request.service_name()).await {
				Ok(reply) => {
					attempts.push(AttemptRecord::succeeded(
						OperationRole::Compensation,
						attempt,
						reply,
					));
					machine.on_success();
				},
				Err(e) => {
					warn!(
						request_id = %request.id(),
						service = %request.service_name(),
						attempt,
						error = %e,
						"Compensation attempt failed"
					);
					attempts.push(AttemptRecord::failed(OperationRole::Compensation, attempt, &e));
					last_error = Some(e.to_string());
					machine.on_failure();
				},
			}
		}

		let state = machine.outcome().unwrap_or(NodeState::CompensationFailed);
		if state == NodeState::Compensated {
			info!(request_id = %request.id(), "Compensation succeeded");
		} else {
			error!(
				request_id = %request.id(),
				error = ?last_error,
				"Compensation failed after exhausting retries"
			);
		}

		CompensationRun {
			id: request.id().to_string(),
			state,
			attempts,
			error: if state == NodeState::Compensated {
				None
			} else {
				last_error
			},
		}
	}
}
