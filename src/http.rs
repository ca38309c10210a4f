//! HTTP client utilities for talking to the model server.
//!
//! Client construction and request decoration shared by every endpoint.

use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::{HttpTransport, SecretString, TransportOptions};

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Join an API path onto the configured base URL.
///
/// # Example
/// ```
/// use ollachat::http::endpoint;
/// use ollachat::options::HttpTransport;
///
/// let transport = HttpTransport::new("http://gpu-box:11434/");
/// assert_eq!(endpoint(&transport, "/api/chat"), "http://gpu-box:11434/api/chat");
/// assert_eq!(endpoint(&HttpTransport::default(), "/api/tags"), "http://localhost:11434/api/tags");
/// ```
pub fn endpoint(transport: &HttpTransport, path: &str) -> String {
    let base = transport
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/');
    format!("{base}{path}")
}

/// Add a bearer token if one is configured.
pub fn add_auth(request: RequestBuilder, api_key: &Option<SecretString>) -> RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key.expose_secret()),
        None => request,
    }
}

/// Add extra headers to a request if specified in transport options.
///
/// # Example
/// ```ignore
/// let mut req = client.post(url);
/// req = add_extra_headers(req, &transport_options.provider.extra_headers);
/// ```
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Build a request for `path` with auth and extra headers applied.
pub fn prepare(
    http_client: &Client,
    method: reqwest::Method,
    transport: &HttpTransport,
    path: &str,
) -> RequestBuilder {
    let request = http_client.request(method, endpoint(transport, path));
    let request = add_auth(request, &transport.api_key);
    add_extra_headers(request, &transport.extra_headers)
}
