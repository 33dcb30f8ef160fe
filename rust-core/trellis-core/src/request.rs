//! # HTTP Request
//!
//! Per-request value object handed through middleware, router and handlers.
//!
//! Besides the usual method/path/headers/body accessors the request owns the
//! **URI prefix stack**: nested dispatchers push the mount point they were
//! reached through, and [`Request::uri`] returns the path relative to the
//! concatenation of that stack. The stack lives here and never on a shared
//! dispatcher, so concurrent requests cannot observe each other's prefixes.

use crate::error::{BoxError, Error, Result};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use hyper::Method;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Route metadata copied onto the request when a route matches
pub type Extra = Map<String, Value>;

const METHOD_OVERRIDE: &str = "x-http-method-override";

/// HTTP request wrapper
///
/// Cloning is cheap enough for tests; the dispatch pipeline itself only ever
/// borrows the request mutably.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method (after `X-HTTP-Method-Override`)
    method: Method,
    /// Decoded request path, trailing slash trimmed
    path: String,
    /// Raw query string (without the leading `?`)
    query_string: Option<String>,
    /// Parsed query parameters
    options: HashMap<String, String>,
    /// Parsed body parameters (form or JSON object)
    data: Map<String, Value>,
    /// Request headers
    headers: HeaderMap,
    /// Cookies sent with the request
    cookies: HashMap<String, String>,
    /// Address of the peer the request came from
    remote_addr: Option<SocketAddr>,
    /// Request body (collected)
    body: Option<Bytes>,
    /// Metadata of the route that matched
    extra: Extra,
    /// Mount points of the dispatchers this request went through
    uri_prefix: Vec<String>,
}

impl Request {
    /// Create a request for `method` and `uri` (path plus optional query string)
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query_string) = match uri.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (uri, None),
        };

        let path = percent_decode_str(path).decode_utf8_lossy();
        let path = path.trim_end_matches('/').to_string();
        let options = parse_query_string(query_string.as_deref());

        Self {
            method,
            path,
            query_string,
            options,
            data: Map::new(),
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
            remote_addr: None,
            body: None,
            extra: Extra::new(),
            uri_prefix: Vec::new(),
        }
    }

    /// Shorthand for a GET request
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Shorthand for a POST request
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Add a header
    ///
    /// `Cookie` headers are parsed into [`Request::cookie`] and
    /// `X-HTTP-Method-Override` replaces the request method.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Attach a body; form and JSON bodies are parsed into [`Request::data`]
    ///
    /// Set `Content-Type` before calling this.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.parse_body();
        self
    }

    /// Record the peer address
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Create from hyper request with body size limit
    ///
    /// The body is read through a [`Limited`] wrapper, so reading stops as
    /// soon as more than `max_body_size` bytes have arrived, whether or not
    /// the client sent a `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the body exceeds the limit and
    /// `Error::Body` when it cannot be read.
    pub async fn from_hyper<B>(
        req: hyper::Request<B>,
        remote_addr: SocketAddr,
        max_body_size: usize,
    ) -> Result<Self>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let uri = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_string(), ToString::to_string);

        let mut request = Self::new(req.method().clone(), &uri).with_remote_addr(remote_addr);
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                request.set_header(name.as_str(), value);
            }
        }

        let declared = request
            .header(CONTENT_LENGTH.as_str())
            .and_then(|len| len.parse::<usize>().ok());
        if declared.is_some_and(|len| len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
            });
        }

        let bytes = Limited::new(req.into_body(), max_body_size)
            .collect()
            .await
            .map_err(|err| {
                if err.is::<LengthLimitError>() {
                    Error::PayloadTooLarge {
                        limit: max_body_size,
                    }
                } else {
                    Error::Body(err)
                }
            })?
            .to_bytes();
        if !bytes.is_empty() {
            request.body = Some(bytes);
            request.parse_body();
        }

        Ok(request)
    }

    /// The request method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request path relative to the current URI prefix stack
    ///
    /// The prefix is the concatenation of the stack with repeated slashes
    /// collapsed. A path equal to the prefix is the root, `"/"`.
    #[must_use]
    pub fn uri(&self) -> String {
        let prefix = collapse_slashes(&self.uri_prefix.concat());

        if self.path == prefix {
            return "/".to_string();
        }

        let relative = self.path.strip_prefix(prefix.as_str()).unwrap_or(&self.path);
        if relative.is_empty() {
            "/".to_string()
        } else {
            relative.to_string()
        }
    }

    /// Full request path, ignoring any prefix
    #[must_use]
    pub fn full_uri(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }

    /// Push a mount point onto the prefix stack
    pub fn push_uri_prefix(&mut self, prefix: impl Into<String>) {
        self.uri_prefix.push(prefix.into());
    }

    /// Pop the most recent mount point
    pub fn pop_uri_prefix(&mut self) -> Option<String> {
        self.uri_prefix.pop()
    }

    /// Drop every mount point above `depth`
    pub fn truncate_uri_prefix(&mut self, depth: usize) {
        self.uri_prefix.truncate(depth);
    }

    /// Replace the whole prefix stack
    pub fn set_uri_prefix(&mut self, prefixes: Vec<String>) {
        self.uri_prefix = prefixes;
    }

    /// Current prefix stack, outermost first
    #[must_use]
    pub fn uri_prefix(&self) -> &[String] {
        &self.uri_prefix
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Query parameter by name
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// All query parameters
    #[must_use]
    pub const fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    /// Body parameter by name
    #[must_use]
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// All body parameters
    #[must_use]
    pub const fn data_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Get a header value by name
    ///
    /// Names are case-insensitive and `_` or spaces match `-`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = normalise_header_name(name);
        self.headers.get(name.as_str()).and_then(|v| v.to_str().ok())
    }

    /// All request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = normalise_header_name(name);
        let (Ok(header), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            return;
        };

        if header == COOKIE {
            self.cookies.extend(parse_cookies(value));
        }
        if header.as_str() == METHOD_OVERRIDE && !value.is_empty() {
            if let Ok(method) = Method::from_bytes(value.to_ascii_uppercase().as_bytes()) {
                self.method = method;
            }
        }

        self.headers.insert(header, header_value);
    }

    /// Cookie value by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Address of the connected peer
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Client IP address
    ///
    /// Behind a local reverse proxy (peer is loopback) the first
    /// `X-Forwarded-For` entry is used.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        let peer = self.remote_addr.map(|addr| addr.ip());
        match (peer, self.header("x-forwarded-for")) {
            (Some(ip), Some(forwarded)) if ip.is_loopback() => forwarded
                .split(',')
                .next()
                .and_then(|first| first.trim().parse().ok())
                .or(Some(ip)),
            (peer, _) => peer,
        }
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Metadata value of the matched route
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// All metadata of the matched route
    #[must_use]
    pub const fn extras(&self) -> &Extra {
        &self.extra
    }

    /// Replace the route metadata
    pub fn set_extra(&mut self, extra: Extra) {
        self.extra = extra;
    }

    /// Whether this is a GET request
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether this is a POST request
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// Whether this is a PUT request
    #[must_use]
    pub fn is_put(&self) -> bool {
        self.method == Method::PUT
    }

    /// Whether this is a DELETE request
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.method == Method::DELETE
    }

    /// Whether the request was made by `XMLHttpRequest`
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// Whether the request arrived over TLS (as reported by the proxy)
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.header("x-forwarded-proto")
            .is_some_and(|v| v.eq_ignore_ascii_case("https"))
    }

    /// Whether the user agent looks like a crawler
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.header("user-agent").is_some_and(|ua| {
            let ua = ua.to_ascii_lowercase();
            ["bot", "crawl", "slurp", "spider", "archive"]
                .iter()
                .any(|needle| ua.contains(needle))
        })
    }

    fn parse_body(&mut self) {
        let Some(body) = self.body_str() else {
            return;
        };
        let content_type = self
            .header(CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let data = if content_type.starts_with("application/json") {
            match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            parse_query_string(Some(body))
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        } else {
            return;
        };

        self.data = data;
    }
}

/// Parse query string into `HashMap`
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Form-style decoding (`+` is a space)
fn url_decode(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

fn parse_cookies(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        (!name.is_empty()).then(|| (name.to_string(), url_decode(value.trim())))
    })
}

fn normalise_header_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '_' | ' ' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Collapse runs of `/` into one
pub(crate) fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
