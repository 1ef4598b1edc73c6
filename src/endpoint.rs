// External collaborators referenced only by interface.
//
// RTP transceiver / layer-discovery code populates `ConferenceEndpoint`;
// the bandwidth estimator drives `Allocator::bandwidth_changed`. Neither
// is implemented here.

use std::sync::Arc;

use crate::layer::{EndpointId, MediaSourceDesc};

/// Transceiver statistics for one conference endpoint, consumed by the
/// stats collector (C7).
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointTransceiverStats {
    pub rtt_ms: u32,
    pub jitter_ms: f32,
    pub packets_lost: u64,
    pub packets_received: u64,
}

/// A participant in the conference, as exposed by the RTP transceiver /
/// session layer.
pub trait ConferenceEndpoint: Send + Sync {
    fn id(&self) -> EndpointId;
    fn media_sources(&self) -> Vec<MediaSourceDesc>;
    fn transceiver_stats(&self) -> EndpointTransceiverStats;
}

/// Supplies the current endpoint list for a conference. Implementations
/// typically return endpoints in most-recent-speaker order.
pub trait EndpointSupplier: Send + Sync {
    fn endpoints(&self) -> Vec<Arc<dyn ConferenceEndpoint>>;
}

/// Observable bandwidth-estimation trust policy: when false, the
/// allocator budget is treated as unbounded.
pub trait TrustBwePolicy: Send + Sync {
    fn trust_bwe(&self) -> bool;
}

impl<F: Fn() -> bool + Send + Sync> TrustBwePolicy for F {
    fn trust_bwe(&self) -> bool {
        self()
    }
}

/// Always-trust policy, useful as a default / in tests.
pub struct AlwaysTrustBwe;

impl TrustBwePolicy for AlwaysTrustBwe {
    fn trust_bwe(&self) -> bool {
        true
    }
}

/// A static endpoint list, useful for tests and the demo binary.
pub struct StaticEndpoint {
    pub id: EndpointId,
    pub sources: Vec<MediaSourceDesc>,
    pub stats: EndpointTransceiverStats,
}

impl ConferenceEndpoint for StaticEndpoint {
    fn id(&self) -> EndpointId {
        self.id.clone()
    }

    fn media_sources(&self) -> Vec<MediaSourceDesc> {
        self.sources.clone()
    }

    fn transceiver_stats(&self) -> EndpointTransceiverStats {
        self.stats
    }
}

pub struct StaticEndpointSupplier {
    pub endpoints: Vec<Arc<dyn ConferenceEndpoint>>,
}

impl EndpointSupplier for StaticEndpointSupplier {
    fn endpoints(&self) -> Vec<Arc<dyn ConferenceEndpoint>> {
        self.endpoints.clone()
    }
}
