//! Arena API Library
//!
//! This library provides the HTTP front controller for the Arena Gateway system.
//! All routing and fleet logic lives in `arena-fleet` and `arena-relay`; this
//! layer parses requests, maps the error taxonomy to HTTP responses, and pipes
//! streamed bytes through.

pub mod app;
pub mod router;

pub use app::{create_app, start_server, AppState};
