//! JSON metadata block of the subtree format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubtreeHeader {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<BufferJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffer_views: Vec<BufferViewJson>,
    pub tile_availability: AvailabilityJson,
    pub content_availability: Vec<AvailabilityJson>,
    pub child_subtree_availability: AvailabilityJson,
    pub subtree_levels: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BufferJson {
    pub byte_length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BufferViewJson {
    pub buffer: usize,
    pub byte_offset: u64,
    pub byte_length: u64,
}

/// Either `{"constant": 0|1}` or `{"bufferView": i}`.
///
/// `availableCount` is informative only and ignored when decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AvailabilityJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_view: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_count: Option<u64>,
}
