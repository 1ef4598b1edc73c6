// Stats collector (C7)
//
// Assembles the structured snapshot sent to the external predictor.
// Absent or zero numerics are reported as 0 rather than omitted, per
// spec.md §4.5.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::allocation::SingleSourceAllocation;
use crate::constraints::VideoConstraints;
use crate::endpoint::EndpointTransceiverStats;
use crate::layer::{EndpointId, LayerDesc, MediaSourceDesc};

#[derive(Debug, Clone, Serialize)]
pub struct LayerStats {
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub height: u32,
    pub framerate: f32,
    pub bitrate: u32,
}

impl From<&LayerDesc> for LayerStats {
    fn from(l: &LayerDesc) -> Self {
        Self {
            temporal_id: l.temporal_id,
            spatial_id: l.spatial_id,
            height: l.height,
            framerate: l.frame_rate,
            bitrate: l.bitrate_bps,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationStats {
    pub index: i64,
    pub height: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerStats {
    pub jitter_ms: f32,
    pub round_trip_time_ms: u32,
    pub pkt_lost: u64,
    pub pkt_received: u64,
    pub video_constraints: VideoConstraintsWire,
    pub layers: HashMap<usize, LayerStats>,
    #[serde(rename = "Allocations")]
    pub allocations: PeerAllocations,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoConstraintsWire {
    #[serde(rename = "maxHeight")]
    pub max_height: u32,
    #[serde(rename = "maxFramerate")]
    pub max_framerate: f32,
}

impl From<VideoConstraints> for VideoConstraintsWire {
    fn from(c: VideoConstraints) -> Self {
        Self { max_height: c.max_height, max_framerate: c.max_framerate }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerAllocations {
    pub target: AllocationStats,
    pub ideal: AllocationStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    #[serde(rename = "Available_BW")]
    pub available_bw: i64,
    pub timestamp: i64,
}

/// Builds the per-cycle predictor document for one receiver.
///
/// `receiver_endpoint_id` keys the outer object; each source's owning
/// endpoint keys the inner object, alongside a sibling `Summary` key.
pub fn build_stats_document(
    receiver_endpoint_id: &EndpointId,
    ssas: &[SingleSourceAllocation],
    sources_by_name: &HashMap<&str, &MediaSourceDesc>,
    peer_stats: &HashMap<EndpointId, EndpointTransceiverStats>,
    available_bw_bps: i64,
    timestamp_unix_ms: i64,
) -> Value {
    let mut peers = serde_json::Map::new();

    for ssa in ssas {
        let source = sources_by_name.get(ssa.source_name.as_str());
        let layers: HashMap<usize, LayerStats> = source
            .map(|s| s.layers.iter().map(|l| (l.index, LayerStats::from(l))).collect())
            .unwrap_or_default();

        let stats = peer_stats.get(&ssa.owner_endpoint_id).copied().unwrap_or_default();

        let target_height = ssa
            .target_index()
            .try_into()
            .ok()
            .and_then(|i: usize| source.and_then(|s| s.layers.get(i)))
            .map(|l| l.height)
            .unwrap_or(0);
        let ideal_height = ssa
            .ideal_index()
            .try_into()
            .ok()
            .and_then(|i: usize| source.and_then(|s| s.layers.get(i)))
            .map(|l| l.height)
            .unwrap_or(0);

        let peer = PeerStats {
            jitter_ms: stats.jitter_ms,
            round_trip_time_ms: stats.rtt_ms,
            pkt_lost: stats.packets_lost,
            pkt_received: stats.packets_received,
            video_constraints: ssa.constraints.into(),
            layers,
            allocations: PeerAllocations {
                target: AllocationStats { index: ssa.target_index(), height: target_height, bitrate: ssa.target_bitrate() },
                ideal: AllocationStats { index: ssa.ideal_index(), height: ideal_height, bitrate: ssa.ideal_bitrate() },
            },
        };

        peers.insert(
            ssa.owner_endpoint_id.to_string(),
            serde_json::to_value(peer).unwrap_or(Value::Null),
        );
    }

    peers.insert(
        "Summary".to_string(),
        json!({ "Available_BW": available_bw_bps, "timestamp": timestamp_unix_ms }),
    );

    json!({ receiver_endpoint_id.to_string(): Value::Object(peers) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{PreferredLayer, SingleSourceAllocation};
    use crate::layer::LayerDesc;

    #[test]
    fn missing_peer_stats_report_as_zero() {
        let source = MediaSourceDesc::new(
            "a",
            "ep-a",
            vec![LayerDesc { index: 0, temporal_id: 0, spatial_id: 0, height: 180, frame_rate: 15.0, bitrate_bps: 150_000 }],
        );
        let ssa = SingleSourceAllocation::new(
            &source,
            VideoConstraints::new(720, 30.0),
            true,
            PreferredLayer { height: 360, frame_rate: 30.0 },
        );
        let mut by_name = HashMap::new();
        by_name.insert("a", &source);

        let doc = build_stats_document(
            &EndpointId::new("receiver"),
            std::slice::from_ref(&ssa),
            &by_name,
            &HashMap::new(),
            1_000_000,
            0,
        );

        let peer = &doc["receiver"]["ep-a"];
        assert_eq!(peer["jitter_ms"], 0.0);
        assert_eq!(peer["pkt_lost"], 0);
    }
}
