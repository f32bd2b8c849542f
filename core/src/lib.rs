//! Synchronous client for the TeamUp calendar events API.
//!
//! # Overview
//! `TeamUpClient` turns each calendar operation into an `HttpRequest`, sends
//! it through a `Transport` carrying the `Teamup-Token` header, and returns
//! the decoded JSON or a `TeamUpError`.
//!
//! # Design
//! - The client holds only its `TeamUpConfig` and a transport; nothing is
//!   written after construction, so one client can serve many threads.
//! - `build_*` methods expose the request for each operation without I/O.
//! - Responses stay `serde_json::Value`; the upstream schema is not reshaped.
//! - One HTTP call per operation. No retries, no caching.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use client::{handle_response, TeamUpClient, TOKEN_HEADER};
pub use config::TeamUpConfig;
pub use error::{ConfigError, TeamUpError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};
pub use types::EventDraft;
