use loophttp::http::response::{Response, ResponseBuilder, Status, StatusCode};
use loophttp::http::writer::serialize_response;

#[test]
fn test_status_codes_and_reasons() {
    let table = [
        (StatusCode::Ok, 200, "OK"),
        (StatusCode::Created, 201, "Created"),
        (StatusCode::NoContent, 204, "No Content"),
        (StatusCode::BadRequest, 400, "Bad Request"),
        (StatusCode::NotFound, 404, "Not Found"),
        (StatusCode::MethodNotAllowed, 405, "Method Not Allowed"),
        (StatusCode::InternalServerError, 500, "Internal Server Error"),
        (StatusCode::ServiceUnavailable, 503, "Service Unavailable"),
    ];

    for (code, number, reason) in table {
        assert_eq!(code.as_u16(), number);
        assert_eq!(code.reason_phrase(), reason);
        assert_eq!(Status::from(code), Status::new(number, reason));
    }
}

#[test]
fn test_response_defaults_to_200_ok() {
    let response = Response::default();

    assert_eq!(response.status, Status::new(200, "OK"));
    assert!(response.headers.is_empty());
    assert!(response.body.is_empty());
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, Status::from(StatusCode::Ok));
    assert_eq!(response.body, b"Hello, World!".to_vec());
}

#[test]
fn test_response_builder_keeps_header_order_and_duplicates() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Set-Cookie", "a=1")
        .header("Content-Type", "text/plain")
        .header("Set-Cookie", "b=2")
        .build();

    assert_eq!(
        response.headers,
        vec![
            ("Set-Cookie".to_string(), "a=1".to_string()),
            ("Content-Type".to_string(), "text/plain".to_string()),
            ("Set-Cookie".to_string(), "b=2".to_string()),
        ]
    );
}

#[test]
fn test_response_builder_adds_no_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok).body("body").build();

    assert!(response.headers.is_empty());
}

#[test]
fn test_serialize_synthesizes_content_length() {
    let response = ResponseBuilder::new(StatusCode::NotFound).body("nope").build();

    assert_eq!(
        &serialize_response(&response)[..],
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\nnope"
    );
}

#[test]
fn test_serialize_ignores_user_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "999")
        .body("test")
        .build();

    // sent verbatim; the synthesized one follows it
    assert_eq!(
        &serialize_response(&response)[..],
        &b"HTTP/1.1 200 OK\r\nContent-Length: 999\r\nContent-Length: 4\r\n\r\ntest"[..]
    );
}

#[test]
fn test_serialize_custom_status() {
    let mut response = Response::new(Status::new(418, "I'm a teapot"));
    response.add_header("X-Kind", "teapot");

    assert_eq!(
        &serialize_response(&response)[..],
        &b"HTTP/1.1 418 I'm a teapot\r\nX-Kind: teapot\r\nContent-Length: 0\r\n\r\n"[..]
    );
}

#[test]
fn test_response_setters() {
    let mut response = Response::default();
    response.set_status(StatusCode::Created);
    response.set_body(vec![1, 2, 3]);

    assert_eq!(response.status.code, 201);
    assert_eq!(response.status.reason, "Created");
    assert_eq!(response.body, vec![1, 2, 3]);
}

#[test]
fn test_response_ok_helper() {
    let response = Response::ok(b"test content".to_vec());

    assert_eq!(response.status, Status::from(StatusCode::Ok));
    assert_eq!(response.body, b"test content".to_vec());
}

#[test]
fn test_response_not_found_helper() {
    let response = Response::not_found();

    assert_eq!(response.status.code, 404);
    assert_eq!(response.body, b"404 Not Found".to_vec());
}

#[test]
fn test_response_internal_error_helper() {
    let response = Response::internal_error();

    assert_eq!(response.status.code, 500);
    assert_eq!(response.body, b"500 Internal Server Error".to_vec());
}
