use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, error, info};

use crate::config::TweakConfig;
use crate::http::outbox::ResponseHandle;
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;
use crate::server::{Notifier, Server};
use crate::tweak::registry::TweakRegistry;

/// Page served at `GET /`.
pub const UI_PAGE: &str = include_str!("ui.html");

struct Parked {
    serial: u64,
    deadline: Instant,
    handle: ResponseHandle,
}

/// Request handling for the tweak UI, including parked long-polls.
pub struct TweakService {
    registry: TweakRegistry,
    long_poll_timeout: Duration,
    parked: Vec<Parked>,
}

impl TweakService {
    pub fn new(registry: TweakRegistry, long_poll_timeout: Duration) -> Self {
        Self {
            registry,
            long_poll_timeout,
            parked: Vec::new(),
        }
    }

    /// Number of long-polls waiting for a state change.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    pub fn handle(&mut self, request: &Request, mut response: ResponseHandle) {
        debug!(method = %request.method, url = %request.url, "tweak request");

        match (request.path(), &request.method) {
            ("/", Method::GET) => {
                response.add_header("Content-Type", "text/html; charset=utf-8");
                response.set_body(UI_PAGE);
            }
            ("/resource", Method::GET) => match request.query().filter(|q| !q.is_empty()) {
                None => self.respond_state(response),
                Some(query) => match query.parse::<u64>() {
                    Ok(serial) if serial == self.registry.serial() => self.parked.push(Parked {
                        serial,
                        deadline: Instant::now() + self.long_poll_timeout,
                        handle: response,
                    }),
                    Ok(_) => self.respond_state(response),
                    Err(_) => {
                        response.set_status(StatusCode::BadRequest);
                        response.set_body("serial must be a number");
                    }
                },
            },
            ("/resource", Method::POST) => {
                match serde_json::from_slice::<BTreeMap<String, String>>(&request.body) {
                    Ok(updates) => {
                        debug!(count = updates.len(), "tweak updates received");
                        self.registry.receive(updates);
                        response.add_header("Content-Type", "application/json");
                        response.set_body("{}");
                    }
                    Err(e) => {
                        response.set_status(StatusCode::BadRequest);
                        response.set_body(format!("expected a flat JSON object of strings: {e}"));
                    }
                }
            }
            ("/", _) | ("/resource", _) => {
                response.set_status(StatusCode::MethodNotAllowed);
            }
            _ => {
                response.set_status(StatusCode::NotFound);
                response.set_body("Not Found");
            }
        }
    }

    /// Answers parked long-polls whose serial is stale or whose wait ran out.
    pub fn release_parked(&mut self) -> usize {
        if self.parked.is_empty() {
            return 0;
        }

        let serial = self.registry.serial();
        let now = Instant::now();
        let (release, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|p| p.serial != serial || now >= p.deadline);
        self.parked = keep;

        let released = release.len();
        for parked in release {
            self.respond_state(parked.handle);
        }
        released
    }

    /// Answers every parked long-poll with 503 so the page retries later.
    pub fn shutdown(&mut self) {
        for mut parked in self.parked.drain(..) {
            parked.handle.set_status(StatusCode::ServiceUnavailable);
        }
    }

    fn respond_state(&self, mut response: ResponseHandle) {
        response.add_header("Content-Type", "application/json");
        response.add_header("Cache-Control", "no-cache");
        response.set_body(self.registry.state_json());
        response.finish();
    }
}

/// The tweak UI server running on its own thread.
///
/// Dropping it stops the loop and joins the thread.
pub struct TweakServer {
    local_addr: SocketAddr,
    notifier: Notifier,
    registry: TweakRegistry,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TweakServer {
    /// Binds the loopback port from `cfg` and starts serving `registry`.
    pub fn spawn(registry: TweakRegistry, cfg: &TweakConfig) -> anyhow::Result<Self> {
        let mut server = Server::bind(cfg.port).context("failed to start tweak server")?;
        let local_addr = server.local_addr();
        let notifier = server.notifier();
        registry.attach(notifier.clone());

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let tick = cfg.poll_timeout();
        let mut service = TweakService::new(registry.clone(), cfg.long_poll_timeout());

        let thread = thread::Builder::new()
            .name("tweak-server".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    server.poll(|request, response| service.handle(request, response), tick)?;
                    service.release_parked();
                }
                service.shutdown();
                server.poll(|_, _| {}, Duration::ZERO)
            })
            .context("failed to spawn tweak server thread")?;

        info!(port = local_addr.port(), "tweak server listening");

        Ok(Self {
            local_addr,
            notifier,
            registry,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TweakServer {
    fn drop(&mut self) {
        self.registry.detach();
        self.shutdown.store(true, Ordering::Release);
        self.notifier.notify();

        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(Ok(())) => info!("tweak server stopped"),
                Ok(Err(e)) => error!(error = %e, "tweak server failed"),
                Err(_) => error!("tweak server thread panicked"),
            }
        }
    }
}
