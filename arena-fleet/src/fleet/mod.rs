pub mod health;
pub mod rate_limit;
pub mod registry;
pub mod scorer;
pub mod selector;
pub mod service;
pub mod store;

pub use health::{HealthChecker, HealthResult};
pub use rate_limit::{RateDecision, RateLimiter};
pub use registry::{WorkerEntry, WorkerRegistry};
pub use scorer::LoadScorer;
pub use selector::{SelectedWorker, WorkerSelector};
pub use service::{FleetService, RoutingStats};
pub use store::FleetStore;
