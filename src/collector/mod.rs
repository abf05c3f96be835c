//! The Collector Core: multi-credential, multi-strategy harvesting under
//! per-account API quotas, with durable dedup and watermark filtering.

pub mod credentials;
pub mod dedup;
pub mod harvester;
pub mod planner;
pub mod rate_gate;
pub mod service;
pub mod watermark;

pub use credentials::{CredentialLease, CredentialPool, RotationState};
pub use dedup::DedupIndex;
pub use harvester::Harvester;
pub use planner::{SamplingStrategy, plan};
pub use rate_gate::RateGate;
pub use service::{CollectorService, HarvestSummary};
pub use watermark::WatermarkStore;
