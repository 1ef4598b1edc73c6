// Layer model for the allocator
//
// Describes the forwardable layers of a remote media source. Populated
// upstream by RTP transceiver / layer-discovery code (out of scope here).

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Globally-unique name of a media source within the conference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceName(Arc<str>);

impl Serialize for SourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SourceName::new)
    }
}

impl SourceName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Arc<str>>> From<T> for SourceName {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Identifier of the conference endpoint (participant) owning a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Arc<str>);

impl Serialize for EndpointId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(EndpointId::new)
    }
}

impl EndpointId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Arc<str>>> From<T> for EndpointId {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// A single forwardable layer of a simulcast/scalable video source.
///
/// `index` is dense, 0-based, and monotone in quality: a higher index is
/// never a lower-quality encoding than a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerDesc {
    pub index: usize,
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub height: u32,
    pub frame_rate: f32,
    /// Running bitrate estimate in bits per second; may be zero if the
    /// sender has not produced this layer recently.
    pub bitrate_bps: u32,
}

/// A remote video source as discovered by the transceiver layer.
#[derive(Debug, Clone)]
pub struct MediaSourceDesc {
    pub source_name: SourceName,
    pub owner_endpoint_id: EndpointId,
    /// Layers ordered by ascending `index`.
    pub layers: Vec<LayerDesc>,
}

impl MediaSourceDesc {
    pub fn new(
        source_name: impl Into<SourceName>,
        owner_endpoint_id: impl Into<EndpointId>,
        mut layers: Vec<LayerDesc>,
    ) -> Self {
        layers.sort_by_key(|l| l.index);
        Self {
            source_name: source_name.into(),
            owner_endpoint_id: owner_endpoint_id.into(),
            layers,
        }
    }

    /// Whether the source is currently producing any video at all.
    pub fn has_video(&self) -> bool {
        !self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_are_sorted_by_index_on_construction() {
        let source = MediaSourceDesc::new(
            "src-1",
            "ep-1",
            vec![
                LayerDesc { index: 2, temporal_id: 0, spatial_id: 2, height: 720, frame_rate: 30.0, bitrate_bps: 2_000_000 },
                LayerDesc { index: 0, temporal_id: 0, spatial_id: 0, height: 180, frame_rate: 15.0, bitrate_bps: 150_000 },
                LayerDesc { index: 1, temporal_id: 0, spatial_id: 1, height: 360, frame_rate: 30.0, bitrate_bps: 500_000 },
            ],
        );
        let indices: Vec<usize> = source.layers.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn source_name_equality_is_by_value() {
        let a = SourceName::new("alice-video");
        let b = SourceName::new("alice-video".to_string());
        assert_eq!(a, b);
    }
}
