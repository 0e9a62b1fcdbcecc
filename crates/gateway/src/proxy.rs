//! Single-upstream reverse proxy
//!
//! Forwards admitted requests to one fixed origin:
//! - Joins the upstream base path with the request path, keeps the query
//! - Points `Host` at the upstream authority
//! - Strips hop-by-hop headers both ways and appends `X-Forwarded-For`
//! - Streams the upstream response back unchanged
//!
//! Failures are never retried. Timeouts surface as 504, everything else as 502.

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Request, Response, Uri,
    },
};
use gateway_common::{config::UpstreamConfig, errors::AppError, metrics};
use reqwest::Url;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Largest request body buffered for forwarding
pub const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream url `{url}`: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("upstream connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("upstream transport failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream response could not be relayed: {0}")]
    InvalidResponse(#[source] axum::http::Error),
}

impl ProxyError {
    fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidUpstream { .. } | ProxyError::Client(_) => "config",
            ProxyError::RequestBody(_) => "request_body",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Connect(_) => "connect",
            ProxyError::Transport(_) => "transport",
            ProxyError::InvalidResponse(_) => "invalid_response",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProxyError::Connect(err)
        } else {
            ProxyError::Transport(err)
        }
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::RequestBody(e) => AppError::BadRequest { message: e.to_string() },
            ProxyError::Timeout(message) => AppError::UpstreamTimeout { message },
            ProxyError::Connect(_) | ProxyError::Transport(_) | ProxyError::InvalidResponse(_) => {
                AppError::UpstreamUnavailable { message: err.to_string() }
            }
            ProxyError::InvalidUpstream { .. } | ProxyError::Client(_) => AppError::Configuration {
                message: err.to_string(),
            },
        }
    }
}

/// Reverse proxy bound to one upstream origin
pub struct ReverseProxy {
    client: reqwest::Client,
    target: Url,
    response_header_timeout: Duration,
}

impl ReverseProxy {
    /// Build the proxy and its pooled upstream client.
    ///
    /// reqwest's connect phase includes the TLS handshake, so its connect
    /// budget is the dial timeout plus the handshake timeout.
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let target = Url::parse(&config.url).map_err(|e| ProxyError::InvalidUpstream {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout() + config.tls_handshake_timeout())
            .tcp_keepalive(config.keepalive())
            .pool_idle_timeout(config.idle_conn_timeout())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ProxyError::Client)?;

        Ok(Self {
            client,
            target,
            response_header_timeout: config.response_header_timeout(),
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Forward `request` upstream and relay the response
    pub async fn forward(
        &self,
        request: Request<Body>,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let result = self.try_forward(request, client_ip).await;

        match &result {
            // The client's fault, not the upstream's
            Err(e @ ProxyError::RequestBody(_)) => {
                warn!(error = %e, "Failed to read request body");
            }
            Err(e) => {
                metrics::record_upstream_error(e.kind());
                error!(upstream = %self.target, kind = e.kind(), error = %e, "Upstream request failed");
            }
            Ok(_) => {}
        }

        result
    }

    async fn try_forward(
        &self,
        request: Request<Body>,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(&parts.uri);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        let body = to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(ProxyError::RequestBody)?;

        debug!(method = %parts.method, url = %url, "Forwarding request");

        let pending = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send();

        // `send` resolves once the response head has arrived
        let upstream = tokio::time::timeout(self.response_header_timeout, pending)
            .await
            .map_err(|_| {
                ProxyError::Timeout(format!(
                    "no response headers within {}ms",
                    self.response_header_timeout.as_millis()
                ))
            })?
            .map_err(ProxyError::from_reqwest)?;

        let mut response = Response::builder()
            .status(upstream.status())
            .version(upstream.version());

        if let Some(response_headers) = response.headers_mut() {
            response_headers.extend(upstream.headers().clone());
            strip_hop_by_hop(response_headers);
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(ProxyError::InvalidResponse)
    }

    /// Join the upstream base path with the request path and merge queries
    fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();

        let base = self.target.path().trim_end_matches('/');
        let path = uri.path().trim_start_matches('/');
        url.set_path(&format!("{}/{}", base, path));

        let query: Vec<&str> = [self.target.query(), uri.query()]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect();
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&query.join("&")));
        }

        url
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
