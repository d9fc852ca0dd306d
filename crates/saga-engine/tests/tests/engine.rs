// Integration tests for saga execution and compensation

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use saga_engine::result::SagaEvent;
use saga_engine::state::OperationRole;
use saga_engine::transport::RecordingTransport;
use saga_engine::{
	EngineConfig, NodeState, Operation, OperationKind, Params, SagaEngine, SagaGraph, SagaOutcome,
	SagaRequest,
};

struct Fixture {
	transport: Arc<RecordingTransport>,
}

impl Fixture {
	fn new() -> Self {
		Self {
			transport: Arc::new(RecordingTransport::new()),
		}
	}

	fn op(&self, method: Method, retries: u32) -> Operation {
		Operation::new(
			OperationKind::Rest,
			method,
			"/saga",
			Params::new(),
			retries,
			self.transport.clone(),
		)
	}

	fn request(&self, id: &str, parents: &[&str]) -> SagaRequest {
		SagaRequest::new(id, id, OperationKind::Rest, self.op(Method::POST, 0))
			.with_compensation(self.op(Method::DELETE, 0))
			.with_parents(parents.iter().copied())
	}
}

#[tokio::test]
async fn test_wide_graph_commits_with_one_call_per_request() {
	let fx = Fixture::new();
	let mut requests = vec![fx.request("root", &[])];
	for i in 0..10 {
		requests.push(fx.request(&format!("leaf-{i}"), &["root"]));
	}
	let leaves: Vec<String> = (0..10).map(|i| format!("leaf-{i}")).collect();
	let leaf_refs: Vec<&str> = leaves.iter().map(String::as_str).collect();
	requests.push(fx.request("sink", &leaf_refs));
	let graph = SagaGraph::new(requests).unwrap();

	let result = SagaEngine::default().run(&graph).await;

	assert_eq!(result.outcome, SagaOutcome::Committed);
	assert_eq!(fx.transport.call_count(), 12);
	assert!(result.requests.values().all(|r| r.attempts.len() == 1));
	let sink_seq = result.report("sink").unwrap().committed_seq;
	assert_eq!(sink_seq, Some(12));
}

#[tokio::test]
async fn test_failing_transaction_and_fallback_compensates_everything() {
	let fx = Fixture::new();
	fx.transport.always_fail("pay", Method::POST);
	fx.transport.always_fail("pay", Method::PUT);
	let graph = SagaGraph::new(vec![
		fx.request("reserve", &[]),
		fx.request("book", &["reserve"]),
		fx.request("pay", &["book"]).with_fallback(fx.op(Method::PUT, 1)),
		fx.request("ship", &["pay"]),
	])
	.unwrap();

	let result = SagaEngine::default().run(&graph).await;

	assert_eq!(result.outcome, SagaOutcome::Compensated);
	assert_eq!(result.compensation_order(), vec!["book", "reserve"]);
	assert_eq!(fx.transport.services_called(&Method::DELETE), vec!["book", "reserve"]);
	assert_eq!(result.never_started(), vec!["ship"]);

	let pay = result.report("pay").unwrap();
	assert_eq!(pay.state, NodeState::Failed);
	assert_eq!(pay.attempts_for(OperationRole::Transaction), 1);
	assert_eq!(pay.attempts_for(OperationRole::Fallback), 2);
}

/// a commits through its fallback, then its child b fails
#[tokio::test]
async fn test_fallback_committed_request_is_compensated() {
	let fx = Fixture::new();
	fx.transport.always_fail("a", Method::POST);
	fx.transport.always_fail("b", Method::POST);
	let graph = SagaGraph::new(vec![
		fx.request("a", &[]).with_fallback(fx.op(Method::PUT, 0)),
		fx.request("b", &["a"]),
	])
	.unwrap();

	let result = SagaEngine::default().run(&graph).await;

	assert_eq!(result.outcome, SagaOutcome::Compensated);
	assert_eq!(result.state("a"), Some(NodeState::Compensated));
	assert_eq!(result.compensation_order(), vec!["a"]);
	assert_eq!(fx.transport.calls_to("a", &Method::PUT), 1);
	assert_eq!(fx.transport.calls_to("a", &Method::DELETE), 1);

	let a = result.report("a").unwrap();
	assert_eq!(a.attempts_for(OperationRole::Fallback), 1);
	assert_eq!(a.committed_seq, Some(1));
}

#[tokio::test]
async fn test_compensation_failure_is_reported() {
	let fx = Fixture::new();
	fx.transport.always_fail("b", Method::POST);
	fx.transport.always_fail("a", Method::DELETE);
	let graph = SagaGraph::new(vec![fx.request("a", &[]), fx.request("b", &["a"])]).unwrap();

	let result = SagaEngine::default().run(&graph).await;

	assert_eq!(result.outcome, SagaOutcome::CompensationFailed);
	assert_eq!(result.state("a"), Some(NodeState::CompensationFailed));
	let json = serde_json::to_value(&result).unwrap();
	assert_eq!(json["outcome"], "SAGA_COMPENSATION_FAILED");
}

#[tokio::test]
async fn test_trace_records_lifecycle_in_order() {
	let fx = Fixture::new();
	fx.transport.always_fail("b", Method::POST);
	let graph = SagaGraph::new(vec![fx.request("a", &[]), fx.request("b", &["a"])]).unwrap();

	let result = SagaEngine::default().run(&graph).await;

	let kinds: Vec<&str> = result
		.events()
		.map(|e| match e {
			SagaEvent::SagaStarted { .. } => "started",
			SagaEvent::TransactionStarted { .. } => "tx-started",
			SagaEvent::TransactionCommitted { .. } => "tx-committed",
			SagaEvent::FallbackCommitted { .. } => "fallback-committed",
			SagaEvent::TransactionAborted { .. } => "tx-aborted",
			SagaEvent::TransactionSkipped { .. } => "tx-skipped",
			SagaEvent::CompensationTriggered { .. } => "triggered",
			SagaEvent::CompensationStarted { .. } => "comp-started",
			SagaEvent::Compensated { .. } => "compensated",
			SagaEvent::CompensationFailed { .. } => "comp-failed",
			SagaEvent::SagaEnded { .. } => "ended",
		})
		.collect();

	assert_eq!(
		kinds,
		vec![
			"started",
			"tx-started",
			"tx-committed",
			"tx-started",
			"tx-aborted",
			"triggered",
			"comp-started",
			"compensated",
			"ended",
		]
	);
}

#[tokio::test]
async fn test_max_concurrency_limits_in_flight_requests() {
	let fx = Fixture::new();
	for id in ["a", "b", "c", "d"] {
		fx.transport.with_latency(id, Duration::from_millis(20));
	}
	let graph = SagaGraph::new(vec![
		fx.request("a", &[]),
		fx.request("b", &[]),
		fx.request("c", &[]),
		fx.request("d", &[]),
	])
	.unwrap();
	let engine = SagaEngine::new(EngineConfig {
		max_concurrency: Some(2),
		..Default::default()
	});

	let start = std::time::Instant::now();
	let result = engine.run(&graph).await;

	assert!(result.is_committed());
	// two waves of two
	assert!(start.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn test_parallel_compensation_honours_children() {
	let fx = Fixture::new();
	fx.transport.always_fail("fail", Method::POST);
	fx.transport.with_latency("fail", Duration::from_millis(50));
	let graph = SagaGraph::new(vec![
		fx.request("a", &[]),
		fx.request("b", &["a"]),
		fx.request("c", &[]),
		fx.request("fail", &[]),
	])
	.unwrap();
	let engine = SagaEngine::new(EngineConfig {
		parallel_compensation: true,
		..Default::default()
	});

	let result = engine.run(&graph).await;

	assert_eq!(result.outcome, SagaOutcome::Compensated);
	let order = result.compensation_order();
	let pos = |id: &str| order.iter().position(|o| *o == id).unwrap();
	assert_eq!(order.len(), 3);
	assert!(pos("b") < pos("a"));
}
