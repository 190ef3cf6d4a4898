//! Executing requests and owning response bodies.
//!
//! # Design
//! A `Transport` turns an `HttpRequest` into an `HttpResponse` and does not
//! interpret the status. Every response body holds a `PoolLease` taken from
//! the shared `ConnectionPool` when the request was issued. The lease goes
//! back exactly once: when the body is closed, or when it is dropped
//! (including while unwinding from a failed parse). `UreqTransport` keeps
//! the idle connections themselves in its `ureq::Agent`; a connection is
//! reusable once its body reader has been dropped.

use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpRequest;

/// Counts connections checked out by in-flight calls.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPool {
    in_flight: Arc<AtomicUsize>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout(&self) -> PoolLease {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        PoolLease {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Leases not yet returned.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// One checked-out connection; returned to the pool on drop.
#[derive(Debug)]
pub struct PoolLease {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A response body stream that owns its connection.
pub struct ResponseBody {
    reader: Option<Box<dyn Read + Send>>,
    lease: Option<PoolLease>,
}

impl ResponseBody {
    pub fn new(reader: Box<dyn Read + Send>, lease: Option<PoolLease>) -> Self {
        Self {
            reader: Some(reader),
            lease,
        }
    }

    /// In-memory body, mostly for tests and fakes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, lease: Option<PoolLease>) -> Self {
        Self::new(Box::new(io::Cursor::new(bytes.into())), lease)
    }

    /// Drop the reader and return the connection. Idempotent.
    pub fn close(&mut self) {
        self.reader = None;
        if self.lease.take().is_some() {
            tracing::trace!("released pooled connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Read the rest of the body as UTF-8 and close it.
    pub fn into_string(mut self) -> Result<String, ApiError> {
        let mut text = String::new();
        let read = self.read_to_string(&mut text);
        self.close();
        read?;
        Ok(text)
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("closed", &self.is_closed())
            .field("leased", &self.lease.is_some())
            .finish()
    }
}

/// Status line plus body of an executed request.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: ResponseBody,
}

/// Executes plain-data requests. Implementations must not treat 4xx/5xx as
/// errors; status interpretation belongs to the dispatcher.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;

    fn pool(&self) -> &ConnectionPool;
}

/// Blocking transport over a pooled `ureq::Agent`.
pub struct UreqTransport {
    agent: ureq::Agent,
    pool: ConnectionPool,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(config.connect_timeout_ms.map(Duration::from_millis))
            .timeout_global(config.timeout_ms.map(Duration::from_millis))
            .max_idle_connections(config.max_idle_connections)
            .max_idle_connections_per_host(config.max_idle_connections)
            .build()
            .new_agent();
        Self {
            agent,
            pool: ConnectionPool::new(),
        }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let lease = self.pool.checkout();

        let mut builder = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send(&request.body[..])
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let reader = response.into_body().into_reader();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            body: ResponseBody::new(Box::new(reader), Some(lease)),
        })
    }

    fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("in_flight", &self.pool.in_flight())
            .finish()
    }
}
