// GitHub API HTTP client.
// Handles per-request authentication, timeouts, rate limiting, and response status mapping.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, IF_NONE_MATCH, USER_AGENT},
};

use crate::error::{Result, RunwatchError};
use crate::session::Credential;

use super::types::RateLimit;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client with rate limit tracking.
///
/// The client holds no credential of its own; every request is authenticated
/// with the credential of the session it is made for.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    runs_per_page: u32,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a client for the given API base URL with a per-request timeout.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("runwatch"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(RunwatchError::Api)?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            runs_per_page: 5,
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Set how many runs a recent-runs request asks for.
    pub fn with_runs_per_page(mut self, per_page: u32) -> Self {
        self.runs_per_page = per_page;
        self
    }

    pub fn runs_per_page(&self) -> u32 {
        self.runs_per_page
    }

    /// Get the current rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .map(|limit| limit.clone())
            .unwrap_or_default()
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, credential: &Credential, endpoint: &str) -> Result<Response> {
        let request = self.request(credential, endpoint);
        self.send(request).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        credential: &Credential,
        endpoint: &str,
        params: &T,
    ) -> Result<Response> {
        let request = self.request(credential, endpoint).query(params);
        self.send(request).await
    }

    /// Make a GET request guarded by an `If-None-Match` precondition.
    ///
    /// A `304 Not Modified` reply is returned as a successful response; callers
    /// inspect the status to tell it apart from fresh content.
    pub async fn get_conditional<T: serde::Serialize + ?Sized>(
        &self,
        credential: &Credential,
        endpoint: &str,
        params: &T,
        validator: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.request(credential, endpoint).query(params);
        if let Some(validator) = validator {
            let value = HeaderValue::from_str(validator)
                .map_err(|e| RunwatchError::Other(format!("Invalid validator: {}", e)))?;
            request = request.header(IF_NONE_MATCH, value);
        }
        self.send(request).await
    }

    fn request(&self, credential: &Credential, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_base, endpoint);
        self.client.get(&url).bearer_auth(credential.token())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;

        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let Ok(mut rate_limit) = self.rate_limit.lock() else {
            return;
        };

        if let Some(limit) = header_u64(response, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_u64(response, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_u64(response, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::ACCEPTED
            | StatusCode::NOT_MODIFIED => Ok(response),
            StatusCode::UNAUTHORIZED => Err(RunwatchError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(RunwatchError::NotFound(url))
            }
            status @ (StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) => {
                let rate_limit = self.rate_limit();
                let exhausted = rate_limit.limit > 0 && rate_limit.remaining == 0;
                if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
                    let reset_at = chrono::DateTime::from_timestamp(rate_limit.reset as i64, 0)
                        .map(|dt| dt.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    Err(RunwatchError::RateLimited { reset_at })
                } else {
                    Err(RunwatchError::Other(format!(
                        "Forbidden: {}",
                        response.text().await.unwrap_or_default()
                    )))
                }
            }
            status => Err(RunwatchError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

/// Map a reqwest transport or body error, keeping timeouts distinct.
pub(crate) fn transport_error(err: reqwest::Error) -> RunwatchError {
    if err.is_timeout() {
        RunwatchError::Timeout
    } else {
        RunwatchError::Api(err)
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Build a raw HTTP/1.1 response with the given status line, headers and body.
    pub fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", status);
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        out
    }

    /// Serve one canned response on a loopback port.
    ///
    /// Returns the base URL and a handle resolving to the raw request head.
    /// With `reply` set to `None` the connection is held open without answering.
    pub async fn serve_once(reply: Option<String>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            match reply {
                Some(reply) => {
                    socket.write_all(reply.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => tokio::time::sleep(std::time::Duration::from_secs(5)).await,
            }

            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }
}
