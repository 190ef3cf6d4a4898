//! Blocking client core for the legacy platform REST API.
//!
//! # Overview
//! Every call is a POST of signed parameters to one endpoint. The pipeline
//! assembles the parameters for a method, signs them with the shared secret,
//! sends them form-encoded (or multipart for uploads) and parses the XML
//! response into a typed value or an `error_response`.
//!
//! # Design
//! - `Dispatcher` renders plain-data `HttpRequest`s; a `Transport` executes
//!   them. `UreqTransport` is the default, tests substitute their own.
//! - The method catalog is a static table built once.
//! - Response bodies own their pooled connection and release it on close or
//!   drop.
//! - Response parsing is a single forward pass whose outcome is decided by
//!   the root element.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch protocol drift.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod method;
pub mod params;
pub mod response;
pub mod session;
pub mod signature;
pub mod transport;

pub use client::RestClient;
pub use config::{ClientConfig, API_VERSION};
pub use dispatch::{Credentials, Dispatcher};
pub use error::{ApiError, ErrorResponse};
pub use http::{FileUpload, HttpRequest};
pub use method::{Method, MethodDescriptor};
pub use params::{ParameterSet, ResponseFormat};
pub use response::Parsed;
pub use session::{AppCredentials, AuthState, AuthToken, Expiry, Session};
pub use transport::{ConnectionPool, HttpResponse, ResponseBody, Transport, UreqTransport};
