//! REST transport backed by `reqwest`.

use std::collections::HashMap;

use async_trait::async_trait;
use http::Method;
use http::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use super::Transport;
use crate::config::RestConfig;
use crate::error::{ConfigError, TransportError};
use crate::operation::{Params, SagaResponse};

/// Parameter channel appended to the URL query string.
pub const QUERY_CHANNEL: &str = "query";
/// Parameter channel sent as an urlencoded form body.
pub const FORM_CHANNEL: &str = "form";
/// Parameter channel whose `body` entry is sent verbatim as JSON. A request
/// carries either a form or a json body, never both.
pub const JSON_CHANNEL: &str = "json";
const JSON_BODY_KEY: &str = "body";

/// Calls services resolved through a static name to address map.
#[derive(Debug, Clone)]
pub struct RestTransport {
	client: reqwest::Client,
	services: HashMap<String, Url>,
}

impl RestTransport {
	pub fn new(config: &RestConfig) -> Result<Self, ConfigError> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = config.request_timeout {
			builder = builder.timeout(timeout);
		}
		let client = builder
			.build()
			.map_err(|e| ConfigError::Client(e.to_string()))?;
		Ok(Self {
			client,
			services: config.services.clone(),
		})
	}

	fn url_for(&self, service_name: &str, path: &str, params: &Params) -> Result<Url, TransportError> {
		let base = self
			.services
			.get(service_name)
			.ok_or_else(|| TransportError::UnknownService(service_name.to_string()))?;

		let joined = format!(
			"{}/{}",
			base.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);
		let mut url = Url::parse(&joined).map_err(|e| TransportError::request(service_name, e))?;

		if let Some(query) = params.get(QUERY_CHANNEL)
			&& !query.is_empty()
		{
			url.query_pairs_mut().extend_pairs(query.iter());
		}
		Ok(url)
	}
}

#[async_trait]
impl Transport for RestTransport {
	async fn invoke(
		&self,
		service_name: &str,
		path: &str,
		method: &Method,
		params: &Params,
	) -> Result<SagaResponse, TransportError> {
		let url = self.url_for(service_name, path, params)?;
		debug!(service = %service_name, %method, %url, "sending rest request");

		let form = params.get(FORM_CHANNEL).filter(|form| !form.is_empty());
		let json = params
			.get(JSON_CHANNEL)
			.and_then(|json| json.get(JSON_BODY_KEY));

		let mut request = self.client.request(method.clone(), url);
		match (form, json) {
			(Some(_), Some(_)) => {
				return Err(TransportError::request(
					service_name,
					"form and json parameters cannot share one request body",
				));
			},
			(Some(form), None) => request = request.form(form),
			(None, Some(body)) => {
				request = request
					.header(CONTENT_TYPE, "application/json")
					.body(body.clone());
			},
			(None, None) => {},
		}

		let response = request
			.send()
			.await
			.map_err(|e| TransportError::request(service_name, e))?;
		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| TransportError::request(service_name, e))?;

		if status.is_success() {
			Ok(SagaResponse::new(body).with_status(status.as_u16()))
		} else {
			Err(TransportError::status(service_name, status.as_u16(), body))
		}
	}
}
