/// Status codes the engine and its handlers commonly send.
///
/// Converts into a [`Status`]; any other code and reason can be built with
/// [`Status::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    ServiceUnavailable,
}

impl StatusCode {
    fn parts(self) -> (u16, &'static str) {
        match self {
            StatusCode::Ok => (200, "OK"),
            StatusCode::Created => (201, "Created"),
            StatusCode::NoContent => (204, "No Content"),
            StatusCode::BadRequest => (400, "Bad Request"),
            StatusCode::NotFound => (404, "Not Found"),
            StatusCode::MethodNotAllowed => (405, "Method Not Allowed"),
            StatusCode::InternalServerError => (500, "Internal Server Error"),
            StatusCode::ServiceUnavailable => (503, "Service Unavailable"),
        }
    }

    /// ```
    /// # use loophttp::http::response::StatusCode;
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.parts().0
    }

    /// ```
    /// # use loophttp::http::response::StatusCode;
    /// assert_eq!(StatusCode::MethodNotAllowed.reason_phrase(), "Method Not Allowed");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        self.parts().1
    }
}

/// Status line contents: numeric code and reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: String,
}

impl Status {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        StatusCode::Ok.into()
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self::new(code.as_u16(), code.reason_phrase())
    }
}

/// An HTTP response as populated by a request handler.
///
/// Headers go out in insertion order and are never deduplicated. A
/// `Content-Length` header is synthesized from the body when the response is
/// serialized; any user-supplied `Content-Length` is sent as-is alongside it,
/// so don't add one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Status code and reason phrase, `200 OK` by default
    pub status: Status,
    /// HTTP headers as name/value pairs
    pub headers: Vec<(String, String)>,
    /// Response body as bytes
    pub body: Vec<u8>,
}

/// Fluent construction of a [`Response`], mostly for [`ResponseHandle::send`].
///
/// ```
/// # use loophttp::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Created)
///     .header("Location", "/items/7")
///     .body("{}")
///     .build();
/// assert_eq!(response.status.code, 201);
/// ```
///
/// [`ResponseHandle::send`]: crate::http::outbox::ResponseHandle::send
pub struct ResponseBuilder {
    status: Status,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status.
    pub fn new(status: impl Into<Status>) -> Self {
        Self {
            status: status.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header; repeated names are kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status: impl Into<Status>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(body).build()
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .body(b"404 Not Found".to_vec())
            .build()
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .body(b"500 Internal Server Error".to_vec())
            .build()
    }

    pub fn set_status(&mut self, status: impl Into<Status>) {
        self.status = status.into();
    }

    /// Appends a header.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }
}
