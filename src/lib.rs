//! loophttp - embeddable single-threaded HTTP/1.1 server
//!
//! A readiness-driven event loop multiplexes client connections on one
//! thread. Responses are filled in through handles that may be finished
//! later, from any thread, and still go out in request order.

pub mod config;
pub mod http;
pub mod server;
pub mod tweak;

pub use http::{Method, Request, Response, ResponseHandle, Status, StatusCode};
pub use server::{Notifier, Server};
