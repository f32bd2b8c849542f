//! HTTP request/response values and the transport seam.
//!
//! # Design
//! The client describes every call as an `HttpRequest` value and hands it to
//! a `Transport`, which performs the round-trip and returns an `HttpResponse`
//! or a `TransportError`. Request building stays pure and inspectable; only
//! the transport touches the network.
//!
//! `UreqTransport` is the default transport. It keeps a single `ureq::Agent`
//! so connections are pooled across calls.

use std::fmt;

use thiserror::Error;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `path` is the absolute URL without the query string; `query` pairs are
/// appended by the transport in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a query parameter by exact name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Failure reported by a transport before the client looks at the status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a status the transport treats as an error.
    #[error("http status: {status}")]
    Status { status: u16, body: String },

    /// The request never produced a response (DNS, connect, TLS, read).
    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// The response body attached to the failure, if the server sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } => Some(body),
            TransportError::Io(_) => None,
        }
    }
}

/// Executes one `HttpRequest`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a pooled `ureq::Agent`.
///
/// 4xx responses are surfaced as `TransportError::Status`. All other statuses
/// are returned as data so the client can branch on them.
///
/// If the body of a 4xx/5xx response cannot be read (truncated, over ureq's
/// size limit), the status is kept and the body is treated as empty. A body
/// read failure on any other status is a `TransportError::Io`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn decorate<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.path.as_str();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => decorate(self.agent.get(url), request).call(),
            HttpMethod::Delete => decorate(self.agent.delete(url), request).call(),
            HttpMethod::Post => {
                let builder = decorate(self.agent.post(url), request);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = decorate(self.agent.put(url), request);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| TransportError::Io(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = match response.body_mut().read_to_string() {
            Ok(body) => body,
            Err(e) if status >= 400 => {
                tracing::warn!(status, error = %e, "discarding unreadable error body");
                String::new()
            }
            Err(e) => return Err(TransportError::Io(e.to_string())),
        };

        if (400..500).contains(&status) {
            return Err(TransportError::Status { status, body });
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
