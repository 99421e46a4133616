//! Arena Gateway Core Library
//!
//! This library provides core functionality for the Arena Gateway system including:
//! - Configuration management
//! - Worker fleet types and statistics
//! - Error taxonomy with stable error codes
//! - The request forwarding seam

pub mod config;
pub mod error;
pub mod forward;
pub mod worker;

// Re-export commonly used types
pub use config::loader::{load_config, load_config_from_path};
pub use config::model::{
    FleetSettings, ForwardSettings, GatewayConfig, LoadBalanceStrategy, ServerSettings,
};
pub use error::{GatewayError, RateLimitReason};
pub use forward::{
    probe_payload, ByteChunkStream, ForwardError, ForwardOutcome, ForwardTarget, Forwarder,
    PROBE_PAYLOAD_KIND,
};
pub use worker::{
    HealthLevel, RateLimitConfig, Registration, RegistrationRequest, Worker, WorkerId,
    WorkerStats, WorkerStatus,
};
