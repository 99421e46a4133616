//! Arena Relay Library
//!
//! This library provides request relay functionality for the Arena Gateway system including:
//! - The HTTP request forwarder
//! - The routing orchestrator tying fleet selection to forwarding

pub mod relay;

// Re-export commonly used types
pub use relay::forwarder::HttpForwarder;
pub use relay::router::{RoutedResponse, RoutedStream, Router};
