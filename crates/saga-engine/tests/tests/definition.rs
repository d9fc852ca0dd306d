// Integration tests for interpreting and running JSON definitions

use std::sync::Arc;

use assert_matches::assert_matches;
use http::Method;
use saga_engine::transport::RecordingTransport;
use saga_engine::{
	DefinitionError, EngineConfig, JsonFormat, NodeState, OperationKind, SagaEngine, SagaOutcome,
	TransportRegistry,
};
use tempfile::NamedTempFile;

fn format_with(transport: &Arc<RecordingTransport>) -> JsonFormat {
	JsonFormat::new(
		TransportRegistry::builder()
			.with(OperationKind::Rest, transport.clone())
			.build(),
	)
}

const THREE_REQUESTS: &str = r#"{
	"requests": [
		{
			"id": "request-aaa",
			"type": "rest",
			"serviceName": "aaa",
			"transaction": { "method": "post", "path": "/rest/as", "retries": 0 },
			"compensation": { "method": "delete", "path": "/rest/as" }
		},
		{
			"id": "request-bbb",
			"type": "rest",
			"serviceName": "bbb",
			"transaction": { "method": "post", "path": "/rest/bs", "retries": 0 },
			"compensation": { "method": "delete", "path": "/rest/bs" }
		},
		{
			"id": "request-ccc",
			"type": "rest",
			"serviceName": "ccc",
			"parents": ["request-aaa", "request-bbb"],
			"transaction": { "method": "post", "path": "/rest/cs", "retries": 1 },
			"compensation": { "method": "delete", "path": "/rest/cs" }
		}
	]
}"#;

/// Test loading a definition from a file and running it to completion
#[tokio::test]
async fn test_definition_file_runs_to_commit() -> anyhow::Result<()> {
	let temp_file = NamedTempFile::with_suffix(".json")?;
	std::fs::write(temp_file.path(), THREE_REQUESTS)?;
	let text = std::fs::read_to_string(temp_file.path())?;

	let transport = Arc::new(RecordingTransport::new());
	let definition = format_with(&transport).from_json(&text)?;
	let result = SagaEngine::new(EngineConfig::default())
		.run_definition(definition)
		.await?;

	assert_eq!(result.outcome, SagaOutcome::Committed);
	for service in ["aaa", "bbb", "ccc"] {
		assert_eq!(transport.calls_to(service, &Method::POST), 1);
	}
	assert_eq!(transport.calls_to("aaa", &Method::DELETE), 0);
	assert_eq!(
		transport.services_called(&Method::POST).last().map(String::as_str),
		Some("ccc")
	);

	let json = serde_json::to_value(&result)?;
	assert_eq!(json["outcome"], "SAGA_COMMITTED");
	assert_eq!(json["requests"]["request-ccc"]["state"], "COMMITTED");

	Ok(())
}

/// A and B commit, C exhausts its attempts without a fallback
#[tokio::test]
async fn test_failing_join_compensates_parents() -> anyhow::Result<()> {
	let transport = Arc::new(RecordingTransport::new());
	transport.always_fail("ccc", Method::POST);

	let definition = format_with(&transport).from_json(THREE_REQUESTS)?;
	let result = SagaEngine::default().run_definition(definition).await?;

	assert_eq!(result.outcome, SagaOutcome::Compensated);
	assert_eq!(result.failed_request.as_deref(), Some("request-ccc"));
	assert_eq!(transport.calls_to("ccc", &Method::POST), 2);
	assert_eq!(transport.calls_to("ccc", &Method::DELETE), 0);
	assert_eq!(result.state("request-ccc"), Some(NodeState::Failed));
	assert_eq!(result.state("request-aaa"), Some(NodeState::Compensated));
	assert_eq!(result.state("request-bbb"), Some(NodeState::Compensated));

	// compensation mirrors the order the parents committed in
	let committed_first = if result.report("request-aaa").unwrap().committed_seq
		< result.report("request-bbb").unwrap().committed_seq
	{
		["request-bbb", "request-aaa"]
	} else {
		["request-aaa", "request-bbb"]
	};
	assert_eq!(result.compensation_order(), committed_first);
	let deleted = transport.services_called(&Method::DELETE);
	assert_eq!(deleted.len(), 2);

	Ok(())
}

#[test]
fn test_malformed_definition_carries_text() {
	let transport = Arc::new(RecordingTransport::new());
	let text = "{ \"requests\": [ oops";

	let err = format_with(&transport).from_json(text).unwrap_err();

	assert_eq!(err.to_string(), format!("Failed to interpret JSON {text}"));
	assert_matches!(err, DefinitionError::InvalidJson { raw, .. } if raw == text);
}

#[tokio::test]
async fn test_unknown_parent_fails_before_any_call() {
	let transport = Arc::new(RecordingTransport::new());
	let text = r#"{
		"requests": [
			{
				"id": "a",
				"type": "rest",
				"serviceName": "aaa",
				"transaction": { "method": "post", "path": "/a" }
			},
			{
				"id": "b",
				"type": "rest",
				"serviceName": "bbb",
				"parents": ["missing"],
				"transaction": { "method": "post", "path": "/b" }
			}
		]
	}"#;

	let definition = format_with(&transport).from_json(text).unwrap();
	let result = SagaEngine::default().run_definition(definition).await;

	assert_matches!(
		result,
		Err(DefinitionError::UnknownParent { request, parent }) if request == "b" && parent == "missing"
	);
	assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_cyclic_definition_is_rejected() {
	let transport = Arc::new(RecordingTransport::new());
	let text = r#"{
		"requests": [
			{
				"id": "a", "type": "rest", "serviceName": "aaa", "parents": ["b"],
				"transaction": { "method": "post", "path": "/a" }
			},
			{
				"id": "b", "type": "rest", "serviceName": "bbb", "parents": ["a"],
				"transaction": { "method": "post", "path": "/b" }
			}
		]
	}"#;

	let definition = format_with(&transport).from_json(text).unwrap();
	let err = SagaEngine::default()
		.run_definition(definition)
		.await
		.unwrap_err();

	assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
	assert_eq!(transport.call_count(), 0);
}
