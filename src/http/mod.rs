//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 pieces the event loop is built from:
//! an incremental request parser, response serialization, and the ordered
//! per-connection queue of outbound responses.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: One client socket with its parser and response queue
//! - **`parser`**: Incrementally parses requests from arbitrary byte chunks
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`outbox`**: Response slots and the handles that complete them
//! - **`writer`**: Serializes a response to its wire form
//!
//! # Response Lifecycle
//!
//! ```text
//!        ┌──────────────────┐
//!        │     Parsed       │ ← request complete, slot appended to the queue
//!        └──────┬───────────┘
//!               │ handle given to the callback
//!               ▼
//!        ┌──────────────────┐
//!        │     Pending      │ ← handle held, maybe moved to another thread
//!        └──────┬───────────┘
//!               │ finish() or drop
//!               ▼
//!        ┌──────────────────┐
//!        │     Ready        │ ← serialized bytes wait for their turn
//!        └──────┬───────────┘
//!               │ head of queue and socket writable
//!               ▼
//!        ┌──────────────────┐
//!        │     Flushed      │ ← slot removed, next one becomes head
//!        └──────────────────┘
//! ```
//!
//! If the connection dies first, its slots are discarded and finishing a
//! leftover handle does nothing.

pub mod connection;
pub mod outbox;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use outbox::ResponseHandle;
pub use request::{Method, Request};
pub use response::{Response, Status, StatusCode};
