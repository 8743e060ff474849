use std::fmt;
use std::mem;

use crate::http::request::{Method, Request, header_name_eq};

/// Longest request or header line accepted, CRLF included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line without two spaces separating method, url and version
    InvalidRequestLine,
    /// Version does not start with `HTTP/1.`
    UnsupportedVersion,
    /// Header line without a colon
    InvalidHeader,
    /// Continuation line before any header
    OrphanContinuation,
    /// Content-Length that is not a decimal number
    InvalidContentLength,
    /// Request or header line that is not valid UTF-8
    InvalidEncoding,
    /// Line longer than [`MAX_LINE_LEN`]
    LineTooLong,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::InvalidRequestLine => "malformed request line",
            ParseError::UnsupportedVersion => "unsupported http version",
            ParseError::InvalidHeader => "header line without colon",
            ParseError::OrphanContinuation => "continuation line with no header to continue",
            ParseError::InvalidContentLength => "invalid content-length",
            ParseError::InvalidEncoding => "request head is not valid utf-8",
            ParseError::LineTooLong => "line too long",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    HeaderLine,
    Body,
}

/// Incremental HTTP/1.x request parser.
///
/// Bytes can be fed in arbitrary chunks; every time a request is complete
/// it is handed to the callback and the parser resets for the next one. At
/// most one request is in flight at a time.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    line: Vec<u8>,
    method: String,
    url: String,
    version: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    body_remaining: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            line: Vec::new(),
            method: String::new(),
            url: String::new(),
            version: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            body_remaining: 0,
        }
    }

    /// True when no partial request is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::RequestLine && self.line.is_empty()
    }

    /// Consumes `bytes`, calling `on_request` once per completed request.
    ///
    /// On error the parser state is unspecified and the connection must be
    /// closed; requests completed earlier in the same chunk have already
    /// been delivered.
    pub fn feed<F>(&mut self, mut bytes: &[u8], mut on_request: F) -> Result<(), ParseError>
    where
        F: FnMut(Request),
    {
        while !bytes.is_empty() {
            match self.state {
                ParseState::RequestLine | ParseState::HeaderLine => {
                    let take = match bytes.iter().position(|&b| b == b'\n') {
                        Some(i) => i + 1,
                        None => bytes.len(),
                    };
                    self.line.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];

                    if self.line.len() > MAX_LINE_LEN {
                        return Err(ParseError::LineTooLong);
                    }
                    if self.line.ends_with(b"\r\n") {
                        self.line.truncate(self.line.len() - 2);
                        let line = mem::take(&mut self.line);
                        let line = String::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;
                        self.parse_line(&line, &mut on_request)?;
                    }
                }
                ParseState::Body => {
                    let take = self.body_remaining.min(bytes.len());
                    self.body.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];
                    self.body_remaining -= take;

                    if self.body_remaining == 0 {
                        self.finish(&mut on_request);
                    }
                }
            }
        }

        Ok(())
    }

    fn parse_line<F>(&mut self, line: &str, on_request: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(Request),
    {
        match self.state {
            ParseState::RequestLine => {
                // stray CRLFs before a request are ignored
                if line.is_empty() {
                    return Ok(());
                }
                let (method, rest) = line.split_once(' ').ok_or(ParseError::InvalidRequestLine)?;
                let (url, version) = rest.split_once(' ').ok_or(ParseError::InvalidRequestLine)?;
                if !version.starts_with("HTTP/1.") {
                    return Err(ParseError::UnsupportedVersion);
                }
                self.method = method.to_string();
                self.url = url.to_string();
                self.version = version.to_string();
                self.state = ParseState::HeaderLine;
            }
            ParseState::HeaderLine if line.is_empty() => {
                for (_, value) in &mut self.headers {
                    *value = fold_header_value(value);
                }

                self.body_remaining = 0;
                for (name, value) in &self.headers {
                    if header_name_eq(name, "Content-Length") {
                        self.body_remaining = parse_content_length(value)?;
                    }
                }

                self.state = ParseState::Body;
                if self.body_remaining == 0 {
                    self.finish(on_request);
                }
            }
            ParseState::HeaderLine => {
                if line.starts_with([' ', '\t']) {
                    let (_, value) = self.headers.last_mut().ok_or(ParseError::OrphanContinuation)?;
                    value.push_str(line);
                } else {
                    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
                    self.headers.push((name.to_string(), value.to_string()));
                }
            }
            ParseState::Body => unreachable!("body bytes are never line-parsed"),
        }

        Ok(())
    }

    fn finish<F>(&mut self, on_request: &mut F)
    where
        F: FnMut(Request),
    {
        let parser = mem::take(self);
        on_request(Request {
            method: Method::parse(&parser.method),
            url: parser.url,
            version: parser.version,
            headers: parser.headers,
            body: parser.body,
        });
    }
}

/// Collapses runs of spaces and tabs into one space, dropping a leading run
/// and a trailing space.
pub fn fold_header_value(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for c in value.chars() {
        if c == ' ' || c == '\t' {
            if !folded.is_empty() && !folded.ends_with(' ') {
                folded.push(' ');
            }
        } else {
            folded.push(c);
        }
    }
    if folded.ends_with(' ') {
        folded.pop();
    }
    folded
}

pub(crate) fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value.parse().map_err(|_| ParseError::InvalidContentLength)
}
