use bytes::{BufMut, BytesMut};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response into its exact wire form.
///
/// Status line, user headers in insertion order, a synthesized
/// `Content-Length` measured from the body, blank line, body. This is the
/// only place the body size is measured.
pub fn serialize_response(resp: &Response) -> BytesMut {
    let content_length = resp.body.len().to_string();

    let head_len = HTTP_VERSION.len()
        + resp.status.reason.len()
        + resp
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len() + 4)
            .sum::<usize>()
        + content_length.len()
        + 40;
    let mut buf = BytesMut::with_capacity(head_len + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION, resp.status.code, resp.status.reason
    );
    buf.put_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"Content-Length: ");
    buf.put_slice(content_length.as_bytes());
    buf.put_slice(b"\r\n");

    // Header/body separator
    buf.put_slice(b"\r\n");

    // Body
    buf.put_slice(&resp.body);

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{ResponseBuilder, Status, StatusCode};

    #[test]
    fn serializes_not_found_exactly() {
        let resp = ResponseBuilder::new(StatusCode::NotFound).body("nope").build();

        assert_eq!(
            &serialize_response(&resp)[..],
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\nnope"
        );
    }

    #[test]
    fn default_response_is_empty_200() {
        assert_eq!(
            &serialize_response(&Response::default())[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn user_headers_precede_content_length_in_order() {
        let resp = ResponseBuilder::new(Status::new(299, "Custom Thing"))
            .header("X-B", "2")
            .header("X-A", "1")
            .header("X-B", "3")
            .body("hi")
            .build();

        assert_eq!(
            &serialize_response(&resp)[..],
            &b"HTTP/1.1 299 Custom Thing\r\nX-B: 2\r\nX-A: 1\r\nX-B: 3\r\nContent-Length: 2\r\n\r\nhi"[..]
        );
    }
}
