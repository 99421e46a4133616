pub mod forwarder;
pub mod router;

pub use forwarder::HttpForwarder;
pub use router::{RoutedResponse, RoutedStream, Router};
