use crate::error::TransportError;
use log::trace;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use wxcore::net::{HttpClient, HttpRequest, HttpResponse};
use wxcore::protocol::decode_json;

/// Thin layer over an [`HttpClient`] that applies the headers and timeouts
/// every backend call shares and turns bodies into typed values.
///
/// Cookie continuity is the `HttpClient`'s job; the same instance must be
/// used for the whole session.
#[derive(Clone)]
pub struct Transport {
    http: Arc<dyn HttpClient>,
    user_agent: String,
    timeout: Duration,
}

impl Transport {
    pub fn new(http: Arc<dyn HttpClient>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut request = request.with_header("user-agent", self.user_agent.as_str());
        if request.timeout.is_none() {
            request.timeout = Some(self.timeout);
        }
        trace!(target: "Client/Transport", "{} {}", request.method.as_str(), request.url);
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(TransportError::Status(response.status_code));
        }
        Ok(response)
    }

    /// GET returning the body as text. A 3xx is returned as-is when the
    /// request disabled redirects.
    pub async fn get_text(&self, request: HttpRequest) -> Result<String, TransportError> {
        Ok(self.execute(request).await?.body_string())
    }

    /// POSTs `body` as JSON and decodes a response carrying `BaseResponse`.
    pub async fn post_json<B, R>(&self, url: String, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let request = HttpRequest::post(url)
            .with_header("content-type", "application/json; charset=UTF-8")
            .with_body(payload);
        let response = self.execute(request).await?;
        Ok(decode_json(&response.body)?)
    }
}
