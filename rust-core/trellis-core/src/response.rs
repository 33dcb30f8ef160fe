//! # HTTP Response
//!
//! Mutable outbound response produced by handlers and middleware.

use crate::error::Result;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::StatusCode;
use serde::Serialize;

const DEFAULT_CHARSET: &str = "UTF-8";

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    status: StatusCode,
    /// Response headers
    headers: HeaderMap,
    /// Response body
    body: Bytes,
    /// Charset appended to textual content types
    charset: String,
    /// Path prepended to relative redirects
    redirect_prefix: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        let mut response = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            charset: DEFAULT_CHARSET.to_string(),
            redirect_prefix: None,
        };
        response.set_header(CONTENT_TYPE.as_str(), "text/html");
        response
    }
}

impl Response {
    /// Create an empty `200 OK` HTML response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new().with_body(body)
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new()
            .with_header(CONTENT_TYPE.as_str(), "text/plain")
            .with_body(body)
    }

    /// Create a JSON response from a serializable value
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new()
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(body))
    }

    /// Create an empty response with the given status
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self::new().with_status(status)
    }

    /// HTTP status code
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Set status code
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Get a header value by name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All response headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set or override a header
    ///
    /// A textual `Content-Type` without a charset gets the response charset
    /// appended. Invalid names or values are ignored.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return;
        };

        let value = if name == CONTENT_TYPE && is_textual(value) && !value.contains("charset") {
            format!("{value}; charset={}", self.charset)
        } else {
            value.to_string()
        };

        if let Ok(value) = HeaderValue::from_str(&value) {
            self.headers.insert(name, value);
        }
    }

    /// Set or override a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Response body as UTF-8, if it is valid
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    /// Charset appended to textual content types
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Change the charset, rewriting the current `Content-Type`
    pub fn set_charset(&mut self, charset: &str) {
        self.charset = charset.to_ascii_uppercase();
        let current = self
            .header(CONTENT_TYPE.as_str())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string());
        if let Some(content_type) = current {
            self.set_header(CONTENT_TYPE.as_str(), &content_type);
        }
    }

    /// Set the path prepended to relative redirects
    #[must_use]
    pub fn with_redirect_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.redirect_prefix = Some(prefix.into());
        self
    }

    /// Turn this response into a redirect to `url`
    ///
    /// With a redirect prefix configured, `url` is prefixed unless it is
    /// absolute (`http(s)://`) or already starts with the prefix.
    #[must_use]
    pub fn redirect(mut self, url: &str, permanent: bool) -> Self {
        let location = match &self.redirect_prefix {
            Some(prefix)
                if !url.starts_with("http://")
                    && !url.starts_with("https://")
                    && !url.starts_with(prefix.as_str()) =>
            {
                format!("{prefix}{url}")
            }
            _ => url.to_string(),
        };

        self.status = if permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };
        self.set_header(LOCATION.as_str(), &location);
        self
    }

    /// Whether the status is a redirect that carries a `Location`
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.as_u16(), 301 | 302 | 303 | 307 | 308)
    }

    /// Convert to hyper Response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/") || ct.contains("json") || ct.contains("xml") || ct.contains("javascript")
}
