//! Saga execution engine.
//!
//! The engine drives every request of a [`SagaGraph`] through its transaction
//! state machine. Requests run concurrently as soon as all of their parents
//! committed. The first request that fails for good halts scheduling; requests
//! already in flight are awaited (never cancelled) and the run switches to the
//! [`CompensationCoordinator`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::compensation::CompensationCoordinator;
use crate::config::EngineConfig;
use crate::definition::SagaDefinition;
use crate::error::DefinitionError;
use crate::graph::SagaGraph;
use crate::ledger::{RunLedger, TransactionRun};
use crate::request::SagaRequest;
use crate::result::{AttemptRecord, SagaOutcome, SagaResult};
use crate::state::{NodeState, OperationRole, TransactionMachine, TransactionPhase};

/// Runs saga graphs.
///
/// An engine holds no per-run state and can run any number of sagas, one
/// after another or concurrently.
#[derive(Debug, Clone, Default)]
pub struct SagaEngine {
	config: EngineConfig,
}

impl SagaEngine {
	pub fn new(config: EngineConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Build the graph of an interpreted definition and run it.
	///
	/// Graph validation errors are returned before any remote call is made.
	pub async fn run_definition(
		&self,
		definition: SagaDefinition,
	) -> Result<SagaResult, DefinitionError> {
		let graph = definition.into_graph()?;
		Ok(self.run(&graph).await)
	}

	/// Run a validated graph to one of the three terminal outcomes.
	pub async fn run(&self, graph: &SagaGraph) -> SagaResult {
		let run_id = Uuid::new_v4();
		let span = info_span!("saga", saga_id = %run_id);
		self.execute(run_id, graph).instrument(span).await
	}

	async fn execute(&self, run_id: Uuid, graph: &SagaGraph) -> SagaResult {
		let start = Instant::now();
		let mut ledger = RunLedger::new(run_id, graph);

		info!(
			request_count = graph.len(),
			max_concurrency = ?self.config.max_concurrency,
			"Starting saga execution"
		);

		let semaphore = self
			.config
			.max_concurrency
			.map(|n| Arc::new(Semaphore::new(n.max(1))));

		let mut committed: HashSet<String> = HashSet::with_capacity(graph.len());
		let mut queued: VecDeque<&SagaRequest> = graph.ready_after(&committed).into();
		let mut scheduled: HashSet<&str> = queued.iter().map(|r| r.id()).collect();
		let mut in_flight = FuturesUnordered::new();

		loop {
			if ledger.failed_request().is_none() {
				while let Some(request) = queued.front().copied() {
					let permit = match &semaphore {
						Some(semaphore) => match semaphore.clone().try_acquire_owned() {
							Ok(permit) => Some(permit),
							Err(_) => break,
						},
						None => None,
					};
					queued.pop_front();
					ledger.transaction_started(request.id());
					in_flight.push(self.drive_transaction(request, permit));
				}
			}

			let Some(run) = in_flight.next().await else {
				break;
			};
			let id = run.id.clone();
			let state = run.state;
			ledger.transaction_finished(run);

			if state.is_committed() {
				committed.insert(id.clone());
				if ledger.failed_request().is_none() {
					for child in graph.ready_children(&id, &committed) {
						if scheduled.insert(child.id()) {
							queued.push_back(child);
						}
					}
				}
			} else if state == NodeState::Failed && ledger.trigger_compensation(&id) {
				warn!(
					request_id = %id,
					in_flight = in_flight.len(),
					queued = queued.len(),
					unreachable = graph.descendants(&id).len(),
					committed = ledger.completion_log().len(),
					"Request failed, halting scheduling"
				);
			}
		}

		// Only non-empty once the run halted: without a failure the queue is
		// drained whenever nothing is in flight.
		for request in queued.drain(..) {
			debug!(request_id = %request.id(), "Saga halted before request started");
			ledger.transaction_skipped(request.id());
		}

		if let Some(failed) = ledger.failed_request().map(str::to_string) {
			CompensationCoordinator::new(graph, &self.config)
				.compensate(&mut ledger)
				.await;
			debug!(failed_request = %failed, "compensation finished");
		}

		let result = ledger.finish(start.elapsed());
		match result.outcome {
			SagaOutcome::Committed => info!(duration = ?result.duration, "Saga committed"),
			SagaOutcome::Compensated => info!(
				duration = ?result.duration,
				failed_request = ?result.failed_request,
				"Saga compensated"
			),
			SagaOutcome::CompensationFailed => error!(
				duration = ?result.duration,
				failed_request = ?result.failed_request,
				"Saga compensation failed, manual intervention required"
			),
		}
		result
	}

	/// Drive one request's transaction machine to a terminal phase.
	///
	/// `_permit` is the concurrency slot this request occupies; it is released
	/// when the machine settles.
	async fn drive_transaction(
		&self,
		request: &SagaRequest,
		_permit: Option<OwnedSemaphorePermit>,
	) -> TransactionRun {
		let mut machine = TransactionMachine::new(
			request.transaction().retries(),
			request.fallback().map(|f| f.retries()),
		);
		let mut attempts = Vec::new();
		let mut response = None;
		let mut last_error = None;

		loop {
			let (role, operation, n) = match machine.phase() {
				TransactionPhase::Attempting(n) => (OperationRole::Transaction, request.transaction(), n),
				TransactionPhase::Fallback(n) => match request.fallback() {
					Some(fallback) => (OperationRole::Fallback, fallback, n),
					None => break,
				},
				_ => break,
			};

			if n > 0
				&& let Some(backoff) = self.config.retry_backoff
			{
				tokio::time::sleep(backoff).await;
			}

			let attempt = n + 1;
			debug!(
				request_id = %request.id(),
				service = %request.service_name(),
				role = ?role,
				attempt,
				"Sending operation"
			);

			match operation.send(request.service_name()).await {
				Ok(reply) => {
					attempts.push(AttemptRecord::succeeded(role, attempt, reply.clone()));
					response = Some(reply);
					machine.on_success();
				},
				Err(e) => {
					warn!(
						request_id = %request.id(),
						service = %request.service_name(),
						role = ?role,
						attempt,
						error = %e,
						"Operation attempt failed"
					);
					attempts.push(AttemptRecord::failed(role, attempt, &e));
					last_error = Some(e.to_string());
					machine.on_failure();
				},
			}
		}

		let state = machine.outcome().unwrap_or(NodeState::Failed);
		match state {
			NodeState::Committed => info!(request_id = %request.id(), "Transaction committed"),
			NodeState::FallbackCommitted => {
				info!(request_id = %request.id(), "Fallback committed after transaction exhausted retries")
			},
			_ => error!(
				request_id = %request.id(),
				error = ?last_error,
				"Request failed after exhausting retries"
			),
		}

		TransactionRun {
			id: request.id().to_string(),
			state,
			attempts,
			response,
			error: if state == NodeState::Failed {
				last_error
			} else {
				None
			},
		}
	}
}
