//! Arena Fleet Library
//!
//! This library provides worker fleet management for the Arena Gateway system including:
//! - Worker registry with durable persistence
//! - Per-worker rate limiting
//! - Load scoring and worker selection strategies
//! - Health checking
//! - Fleet service composition

pub mod fleet;

// Re-export commonly used types
pub use fleet::{
    FleetService, FleetStore, HealthChecker, HealthResult, LoadScorer, RateDecision, RateLimiter,
    RoutingStats, SelectedWorker, WorkerEntry, WorkerRegistry, WorkerSelector,
};
