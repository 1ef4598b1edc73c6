// Per-receiver bandwidth allocator for a selective forwarding video unit.
//
// Computes, for one conference receiver, which simulcast/SVC layer to
// forward for each of the conference's media sources under a shifting
// bandwidth estimate, receiver-declared priorities, and last-N policy.

pub mod allocation;
pub mod allocator;
pub mod config;
pub mod constraints;
pub mod effective_constraints;
pub mod endpoint;
pub mod error;
pub mod layer;
pub mod predictor;
pub mod prioritizer;
pub mod scheduling;
pub mod settings;
pub mod stats;

pub use allocator::{Allocator, BandwidthAllocation, EventHandler, SingleAllocation};
pub use config::AllocatorConfig;
pub use constraints::VideoConstraints;
pub use error::{AllocatorError, Result};
pub use layer::{EndpointId, LayerDesc, MediaSourceDesc, SourceName};
pub use settings::{AllocationSettings, LastN};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes process-wide structured logging, honoring `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();
}
