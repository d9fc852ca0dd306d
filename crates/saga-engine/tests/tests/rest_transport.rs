// Integration tests for the REST transport against a mock HTTP server

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use assert_matches::assert_matches;
use http::Method;
use saga_engine::transport::RestTransport;
use saga_engine::{
	EngineConfig, JsonFormat, Params, RestConfig, SagaEngine, SagaOutcome, Transport,
	TransportError, TransportRegistry,
};
use url::Url;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> RestConfig {
	RestConfig {
		services: HashMap::from([("aaa".to_string(), Url::parse(&server.uri()).unwrap())]),
		request_timeout: Some(Duration::from_secs(5)),
	}
}

fn params(channels: &[(&str, &[(&str, &str)])]) -> Params {
	channels
		.iter()
		.map(|(channel, entries)| {
			let entries: BTreeMap<String, String> = entries
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			(channel.to_string(), entries)
		})
		.collect()
}

#[tokio::test]
async fn test_form_channel_is_sent_as_body() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/rest/as"))
		.and(body_string("foo=as"))
		.respond_with(ResponseTemplate::new(200).set_body_string("created"))
		.expect(1)
		.mount(&server)
		.await;

	let transport = RestTransport::new(&config(&server))?;
	let response = transport
		.invoke("aaa", "/rest/as", &Method::POST, &params(&[("form", &[("foo", "as")])]))
		.await?;

	assert_eq!(response.body, "created");
	assert_eq!(response.status, Some(200));
	Ok(())
}

#[tokio::test]
async fn test_query_and_json_channels() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/rest/bs"))
		.and(query_param("foo", "bs"))
		.and(header("content-type", "application/json"))
		.and(body_string(r#"{ "bar": "bs" }"#))
		.respond_with(ResponseTemplate::new(201))
		.expect(1)
		.mount(&server)
		.await;

	let transport = RestTransport::new(&config(&server))?;
	let response = transport
		.invoke(
			"aaa",
			"/rest/bs",
			&Method::POST,
			&params(&[
				("query", &[("foo", "bs")]),
				("json", &[("body", r#"{ "bar": "bs" }"#)]),
			]),
		)
		.await?;

	assert_eq!(response.status, Some(201));
	Ok(())
}

#[tokio::test]
async fn test_non_success_status_is_an_error() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("DELETE"))
		.and(path("/rest/as"))
		.respond_with(ResponseTemplate::new(503).set_body_string("busy"))
		.mount(&server)
		.await;

	let transport = RestTransport::new(&config(&server))?;
	let err = transport
		.invoke("aaa", "/rest/as", &Method::DELETE, &Params::new())
		.await
		.unwrap_err();

	assert_matches!(err, TransportError::Status { code: 503, ref body, .. } if body == "busy");
	Ok(())
}

#[tokio::test]
async fn test_unknown_service_is_an_error() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	let transport = RestTransport::new(&config(&server))?;

	let err = transport
		.invoke("zzz", "/x", &Method::GET, &Params::new())
		.await
		.unwrap_err();

	assert_eq!(err, TransportError::UnknownService("zzz".to_string()));
	Ok(())
}

/// Retries hit the server until it recovers
#[tokio::test]
async fn test_saga_over_http_retries_then_commits() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(500))
		.up_to_n_times(2)
		.expect(2)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(200).set_body_string("order-1"))
		.expect(1)
		.mount(&server)
		.await;

	let registry = TransportRegistry::rest(&config(&server))?;
	let definition = JsonFormat::new(registry).from_json(
		r#"{
			"requests": [{
				"id": "order",
				"type": "rest",
				"serviceName": "aaa",
				"transaction": { "method": "post", "path": "/orders", "retries": 2 },
				"compensation": { "method": "delete", "path": "/orders" }
			}]
		}"#,
	)?;
	let result = SagaEngine::new(EngineConfig::default())
		.run_definition(definition)
		.await?;

	assert_eq!(result.outcome, SagaOutcome::Committed);
	let report = result.report("order").unwrap();
	assert_eq!(report.attempts.len(), 3);
	assert_eq!(
		report.response.as_ref().map(|r| r.body.as_str()),
		Some("order-1")
	);
	Ok(())
}
