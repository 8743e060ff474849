use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use loophttp::{Request, ResponseHandle, Server, StatusCode};

const TICK: Duration = Duration::from_millis(5);
const DEADLINE: Duration = Duration::from_secs(10);

fn connect(server: &Server) -> TcpStream {
    let client = TcpStream::connect(server.local_addr()).unwrap();
    client.set_nonblocking(true).unwrap();
    client
}

/// Reads whatever is available. Returns false once the peer has closed.
fn read_available(client: &mut TcpStream, out: &mut Vec<u8>) -> bool {
    let mut buf = [0u8; 64 * 1024];
    loop {
        match client.read(&mut buf) {
            Ok(0) => return false,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return false,
            Err(e) => panic!("client read failed: {e}"),
        }
    }
}

/// Ticks the server until `want` bytes arrived at the client.
fn pump_for<H>(server: &mut Server, handler: &mut H, client: &mut TcpStream, want: usize) -> Vec<u8>
where
    H: FnMut(&Request, ResponseHandle),
{
    let start = Instant::now();
    let mut received = Vec::new();
    while received.len() < want {
        assert!(start.elapsed() < DEADLINE, "timed out with {} of {want} bytes", received.len());
        server.poll(&mut *handler, TICK).unwrap();
        read_available(client, &mut received);
    }
    received
}

/// Ticks the server until the client sees the connection close.
fn pump_until_closed<H>(server: &mut Server, handler: &mut H, client: &mut TcpStream) -> Vec<u8>
where
    H: FnMut(&Request, ResponseHandle),
{
    let start = Instant::now();
    let mut received = Vec::new();
    loop {
        assert!(start.elapsed() < DEADLINE, "connection never closed");
        server.poll(&mut *handler, TICK).unwrap();
        if !read_available(client, &mut received) {
            return received;
        }
    }
}

fn hello(request: &Request, mut response: ResponseHandle) {
    if request.path() == "/" {
        response.set_body("hello");
    } else {
        response.set_status(StatusCode::NotFound);
        response.set_body("nope");
    }
}

#[test]
fn test_server_answers_simple_get() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
    let received = pump_for(&mut server, &mut hello, &mut client, expected.len());

    assert_eq!(received, expected.to_vec());
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_server_callback_sees_parsed_request() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    let mut seen = Vec::new();
    let mut handler = |request: &Request, _response: ResponseHandle| seen.push(request.clone());
    pump_for(&mut server, &mut handler, &mut client, 1);

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method.as_str(), "GET");
    assert_eq!(seen[0].url, "/");
    assert!(seen[0].headers.is_empty());
    assert!(seen[0].body.is_empty());
}

#[test]
fn test_server_body_split_across_writes() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let (tx, rx) = mpsc::channel();
    let mut handler = move |request: &Request, response: ResponseHandle| {
        tx.send(request.body.clone()).unwrap();
        drop(response);
    };

    client
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello")
        .unwrap();
    for _ in 0..20 {
        server.poll(&mut handler, TICK).unwrap();
    }
    assert!(rx.try_recv().is_err());

    client.write_all(b" world").unwrap();
    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
    pump_for(&mut server, &mut handler, &mut client, expected.len());

    assert_eq!(rx.try_recv().unwrap(), b"hello world".to_vec());
}

#[test]
fn test_server_pipelined_responses_keep_request_order() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let (tx, rx) = mpsc::channel();
    let mut handler = move |request: &Request, response: ResponseHandle| {
        tx.send((request.url.clone(), response)).unwrap();
    };

    client
        .write_all(b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n")
        .unwrap();

    let start = Instant::now();
    let mut handles = Vec::new();
    while handles.len() < 2 {
        assert!(start.elapsed() < DEADLINE);
        server.poll(&mut handler, TICK).unwrap();
        handles.extend(rx.try_iter());
    }
    assert_eq!(handles[0].0, "/first");
    assert_eq!(handles[1].0, "/second");
    assert_eq!(server.pending_responses(), 2);

    let (_, mut first) = handles.remove(0);
    let (_, mut second) = handles.remove(0);

    second.set_body("2");
    assert!(second.finish());
    for _ in 0..10 {
        server.poll(&mut handler, TICK).unwrap();
    }
    let mut early = Vec::new();
    read_available(&mut client, &mut early);
    assert!(early.is_empty(), "second response overtook the first");

    first.set_body("1");
    assert!(first.finish());

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n1HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n2";
    let received = pump_for(&mut server, &mut handler, &mut client, expected.len());
    assert_eq!(received, expected.to_vec());
    assert_eq!(server.pending_responses(), 0);
}

#[test]
fn test_server_finish_after_disconnect_is_noop() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let (tx, rx) = mpsc::channel();
    let mut handler = move |_: &Request, response: ResponseHandle| tx.send(response).unwrap();

    client.write_all(b"GET /slow HTTP/1.1\r\n\r\n").unwrap();
    let start = Instant::now();
    let handle = loop {
        assert!(start.elapsed() < DEADLINE);
        server.poll(&mut handler, TICK).unwrap();
        if let Ok(handle) = rx.try_recv() {
            break handle;
        }
    };

    drop(client);
    let start = Instant::now();
    while server.connection_count() > 0 {
        assert!(start.elapsed() < DEADLINE, "server never noticed the close");
        server.poll(&mut handler, TICK).unwrap();
    }

    assert_eq!(server.pending_responses(), 0);
    assert!(!handle.finish());
    server.poll(&mut handler, TICK).unwrap();
    assert_eq!(server.pending_responses(), 0);
}

#[test]
fn test_server_closes_on_missing_second_space() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let mut called = false;
    let mut handler = |_: &Request, _: ResponseHandle| called = true;

    client.write_all(b"GET /\r\n\r\n").unwrap();
    let received = pump_until_closed(&mut server, &mut handler, &mut client);

    assert!(received.is_empty());
    assert!(!called);
}

#[test]
fn test_server_closes_on_colonless_header() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);

    client.write_all(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n").unwrap();
    let received = pump_until_closed(&mut server, &mut hello, &mut client);

    assert!(received.is_empty());
}

#[test]
fn test_server_bad_client_does_not_affect_others() {
    let mut server = Server::bind(0).unwrap();
    let mut bad = connect(&server);
    let mut good = connect(&server);

    bad.write_all(b"NONSENSE\r\n").unwrap();
    good.write_all(b"GET /missing HTTP/1.1\r\n\r\n").unwrap();

    let expected = b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\nnope";
    let received = pump_for(&mut server, &mut hello, &mut good, expected.len());
    assert_eq!(received, expected.to_vec());

    let from_bad = pump_until_closed(&mut server, &mut hello, &mut bad);
    assert!(from_bad.is_empty());
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_server_flushes_large_response_across_ticks() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let body: Vec<u8> = (0..4_000_000u32).map(|i| (i % 251) as u8).collect();
    let sent = body.clone();
    let mut handler = move |_: &Request, response: ResponseHandle| {
        response.send(loophttp::Response::ok(sent.clone()));
    };

    client.write_all(b"GET /big HTTP/1.1\r\n\r\n").unwrap();

    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
    let received = pump_for(&mut server, &mut handler, &mut client, head.len() + body.len());

    assert_eq!(&received[..head.len()], head.as_bytes());
    assert_eq!(&received[head.len()..], &body[..]);
}

#[test]
fn test_server_wakes_for_response_finished_on_other_thread() {
    let mut server = Server::bind(0).unwrap();
    let mut client = connect(&server);
    let mut handler = |_: &Request, mut response: ResponseHandle| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            response.set_body("late");
            response.finish();
        });
    };

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nlate";
    let start = Instant::now();
    let mut received = Vec::new();
    while received.len() < expected.len() {
        // long waits: only the wake channel can make this finish quickly
        server.poll(&mut handler, Duration::from_secs(20)).unwrap();
        read_available(&mut client, &mut received);
        assert!(start.elapsed() < DEADLINE, "loop was not woken");
    }

    assert_eq!(received, expected.to_vec());
}

#[test]
fn test_server_idle_poll_returns_after_timeout() {
    let mut server = Server::bind(0).unwrap();
    let start = Instant::now();

    server.poll(hello, Duration::from_millis(20)).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(15));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_server_notifier_interrupts_wait() {
    let mut server = Server::bind(0).unwrap();
    let notifier = server.notifier();

    let poker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        notifier.notify();
    });

    let start = Instant::now();
    server.poll(hello, Duration::from_secs(20)).unwrap();
    assert!(start.elapsed() < DEADLINE);
    poker.join().unwrap();
}

#[test]
fn test_server_bind_conflict_is_an_error() {
    let server = Server::bind(0).unwrap();
    let port = server.local_addr().port();

    // reuse-address does not allow two live listeners on one port
    assert!(Server::bind(port).is_err());
}
