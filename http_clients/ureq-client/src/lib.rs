use anyhow::Result;
use async_trait::async_trait;
use log::trace;
use std::time::Duration;
use ureq::Agent;
use wxcore::net::{HttpClient, HttpMethod, HttpRequest, HttpResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client implementation using `ureq` for synchronous HTTP requests.
/// Since `ureq` is blocking, all requests are wrapped in `tokio::task::spawn_blocking`.
///
/// One agent is shared by every request, so the cookie jar it keeps carries
/// the session cookies set during login into all later calls.
#[derive(Debug, Clone)]
pub struct UreqHttpClient {
    agent: Agent,
}

impl UreqHttpClient {
    pub fn new() -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn execute_blocking(agent: &Agent, request: HttpRequest) -> Result<HttpResponse> {
    let redirects = if request.follow_redirects { 10 } else { 0 };
    let timeout = request.timeout.or(Some(DEFAULT_TIMEOUT));

    let response = match request.method {
        HttpMethod::Get => {
            let mut req = agent.get(&request.url);
            for (key, value) in &request.headers {
                req = req.header(key, value);
            }
            req.config()
                .max_redirects(redirects)
                .timeout_global(timeout)
                .build()
                .call()?
        }
        HttpMethod::Post => {
            let mut req = agent.post(&request.url);
            for (key, value) in &request.headers {
                req = req.header(key, value);
            }
            let req = req
                .config()
                .max_redirects(redirects)
                .timeout_global(timeout)
                .build();
            match request.body {
                Some(body) => req.send(&body[..])?,
                None => req.send_empty()?,
            }
        }
    };

    let status_code = response.status().as_u16();
    // Read the response body
    let mut body = response.into_body();
    let body_bytes = body.read_to_vec()?;
    trace!(
        "{} {} -> {} ({} bytes)",
        request.method.as_str(),
        request.url,
        status_code,
        body_bytes.len()
    );

    Ok(HttpResponse {
        status_code,
        body: body_bytes,
    })
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        // Since ureq is blocking, we must use spawn_blocking
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request)).await?
    }
}
