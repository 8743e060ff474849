use std::fmt;

use crate::http::parser::parse_content_length;

/// HTTP request methods.
///
/// The method is a token on the wire. Common methods get their own variant,
/// anything else is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other method token
    Other(String),
}

/// Represents a parsed HTTP request from a client.
///
/// Immutable once the parser hands it out. Headers keep wire order and
/// duplicates are preserved as separate entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Raw request target, path plus query, unparsed
    pub url: String,
    /// HTTP version as sent (e.g. "HTTP/1.1")
    pub version: String,
    /// Request headers as name/value pairs, in wire order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    version: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Matching is case-sensitive, as method tokens are on the wire.
    ///
    /// # Example
    ///
    /// ```
    /// # use loophttp::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Method::GET);
    /// assert_eq!(Method::parse("get"), Method::Other("get".to_string()));
    /// ```
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            url: None,
            version: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends a header; earlier headers with the same name are kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            url: self.url.ok_or("url missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

/// ASCII-only case-insensitive comparison for header field names.
pub fn header_name_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Request {
    /// Retrieves the first header value with the given name.
    ///
    /// Field names are compared ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| header_name_eq(n, name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over every value of headers with the given name, in wire order.
    pub fn headers_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| header_name_eq(n, name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length. The last Content-Length header wins; 0 if it
    /// is missing or not plain ASCII digits, the same rule the parser uses.
    pub fn content_length(&self) -> usize {
        self.headers_named("Content-Length")
            .last()
            .and_then(|v| parse_content_length(v).ok())
            .unwrap_or(0)
    }

    /// The url up to (not including) the first `?`.
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    /// Everything after the first `?` in the url, if there is one.
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}
