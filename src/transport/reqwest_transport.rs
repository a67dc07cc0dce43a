//! Production transport over `reqwest`.

use std::error::Error as _;

use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::config::CoordinatorConfig;
use crate::resilience::abort::CancellationToken;
use crate::transport::{
    RawResponse, ResponseBody, Transport, TransportBinding, TransportError, TransportRequest,
};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from configuration (connect timeout, user agent).
    ///
    /// Request deadlines are not set on the client; the coordinator owns them.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .user_agent(config.api.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn binding(&self) -> TransportBinding {
        TransportBinding::Reqwest
    }

    fn send(
        &self,
        request: TransportRequest,
        _cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request.request_id.to_string());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        // Dropping this future drops the in-flight hyper request.
        Box::pin(async move {
            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            Ok(RawResponse::new(status, Box::new(ReqwestBody(response))))
        })
    }
}

struct ReqwestBody(reqwest::Response);

impl ResponseBody for ReqwestBody {
    fn read_text(self: Box<Self>) -> BoxFuture<'static, Result<String, TransportError>> {
        Box::pin(async move { self.0.text().await.map_err(map_reqwest_error) })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    let name = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else if error.is_body() {
        "body"
    } else if error.is_decode() {
        "decode"
    } else if error.is_request() {
        "request"
    } else {
        "reqwest"
    };

    // The interesting part (e.g. hyper's "operation was canceled") is
    // usually further down the source chain.
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let mapped = TransportError::new(TransportBinding::Reqwest, name, message);
    match error.status() {
        Some(status) => mapped.with_status(status.as_u16()),
        None => mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[tokio::test]
    async fn test_connection_refused_maps_to_network_error() {
        let config = CoordinatorConfig::default();
        let transport = ReqwestTransport::from_config(&config).unwrap();

        // Port 9 (discard) is almost never listening locally.
        let url = url::Url::parse("http://127.0.0.1:9/api/auth/login").unwrap();
        let request = TransportRequest::new(Method::POST, url);
        let err = transport
            .send(request, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.binding, TransportBinding::Reqwest);
        assert!(!crate::resilience::signatures::is_cancellation(&err));
    }
}
