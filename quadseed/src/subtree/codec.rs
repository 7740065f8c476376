//! Binary subtree encoding.
//!
//! Layout (little-endian):
//!
//! ```text
//! ┌────────┬─────────┬──────────────┬──────────────┬────────────┬──────────────┐
//! │ magic  │ version │ json length  │ bin length   │ JSON block │ binary block │
//! │ 4 B    │ u32 = 1 │ u64 (padded) │ u64 (padded) │ ' ' padded │ 0x00 padded  │
//! └────────┴─────────┴──────────────┴──────────────┴────────────┴──────────────┘
//! ```
//!
//! The JSON block is padded to a multiple of 8 so the binary block starts
//! 8-aligned. Bitstreams are laid out in the fixed order tile, content,
//! child subtree; each starts on an 8-byte boundary and constant
//! availabilities contribute no bytes.

use crate::availability::{Availability, AvailabilityClass, Bitstream};
use crate::coord::MAX_LEVEL;
use crate::error::TilesError;

use super::header::{AvailabilityJson, BufferJson, BufferViewJson, SubtreeHeader};
use super::SubtreeArtifact;

/// Format tag, `"subt"`.
pub const MAGIC: [u8; 4] = *b"subt";

/// Format version.
pub const VERSION: u32 = 1;

/// Size of the fixed header preceding the JSON block.
pub const HEADER_LEN: usize = 24;

const ALIGNMENT: usize = 8;

/// Encode an artifact to the binary subtree format.
///
/// Fails with [`TilesError::MalformedArtifact`] if the artifact's bitstream
/// lengths do not match its level count.
pub fn encode(artifact: &SubtreeArtifact) -> Result<Vec<u8>, TilesError> {
    artifact.validate()?;
    let levels = artifact.subtree_levels;

    let mut binary = Vec::new();
    let mut views = Vec::new();

    let tile = place(
        &artifact.tile_availability,
        AvailabilityClass::Tile,
        levels,
        &mut binary,
        &mut views,
    );
    let content = artifact
        .content_availability
        .iter()
        .map(|a| place(a, AvailabilityClass::Content, levels, &mut binary, &mut views))
        .collect();
    let child = place(
        &artifact.child_subtree_availability,
        AvailabilityClass::ChildSubtree,
        levels,
        &mut binary,
        &mut views,
    );

    let buffers = if binary.is_empty() {
        Vec::new()
    } else {
        vec![BufferJson {
            byte_length: binary.len() as u64,
        }]
    };
    pad(&mut binary, 0x00);

    let header = SubtreeHeader {
        buffers,
        buffer_views: views,
        tile_availability: tile,
        content_availability: content,
        child_subtree_availability: child,
        subtree_levels: levels,
    };
    let mut json = serde_json::to_vec(&header)
        .map_err(|e| TilesError::MalformedArtifact(format!("JSON encoding failed: {}", e)))?;
    pad(&mut json, b' ');

    let mut out = Vec::with_capacity(HEADER_LEN + json.len() + binary.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(json.len() as u64).to_le_bytes());
    out.extend_from_slice(&(binary.len() as u64).to_le_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(&binary);

    Ok(out)
}

/// Decode the binary subtree format.
///
/// Fails with [`TilesError::MalformedArtifact`] on a wrong magic tag or
/// version, declared lengths that disagree with the byte count, invalid
/// JSON, or bitstreams of the wrong size.
pub fn decode(bytes: &[u8]) -> Result<SubtreeArtifact, TilesError> {
    if bytes.len() < HEADER_LEN {
        return Err(malformed(format!(
            "{} bytes is shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    if bytes[0..4] != MAGIC {
        return Err(malformed(format!("bad magic {:02x?}", &bytes[0..4])));
    }

    let version = u32::from_le_bytes(le_array(&bytes[4..8]));
    if version != VERSION {
        return Err(malformed(format!("unsupported version {}", version)));
    }

    let json_len = u64::from_le_bytes(le_array(&bytes[8..16]));
    let bin_len = u64::from_le_bytes(le_array(&bytes[16..24]));
    let remaining = (bytes.len() - HEADER_LEN) as u64;
    if json_len.checked_add(bin_len) != Some(remaining) {
        return Err(malformed(format!(
            "declared lengths json={} bin={} do not match {} remaining bytes",
            json_len, bin_len, remaining
        )));
    }

    let json_end = HEADER_LEN + json_len as usize;
    let json = &bytes[HEADER_LEN..json_end];
    let binary = &bytes[json_end..];

    let header: SubtreeHeader = serde_json::from_slice(json)
        .map_err(|e| malformed(format!("invalid JSON block: {}", e)))?;

    // Cell counts shift by 2 * levels; bound it before any count is taken.
    let levels = header.subtree_levels;
    if levels == 0 || levels > MAX_LEVEL {
        return Err(malformed(format!(
            "subtree levels {} outside 1..={}",
            levels, MAX_LEVEL
        )));
    }
    let read = |json: &AvailabilityJson, class: AvailabilityClass| {
        read_availability(json, class, levels, &header.buffer_views, binary)
    };

    let tile_availability = read(&header.tile_availability, AvailabilityClass::Tile)?;
    let content_availability = header
        .content_availability
        .iter()
        .map(|c| read(c, AvailabilityClass::Content))
        .collect::<Result<Vec<_>, _>>()?;
    let child_subtree_availability = read(
        &header.child_subtree_availability,
        AvailabilityClass::ChildSubtree,
    )?;

    let artifact = SubtreeArtifact {
        subtree_levels: levels,
        tile_availability,
        content_availability,
        child_subtree_availability,
    };
    artifact.validate()?;

    Ok(artifact)
}

/// Append a bitstream to the binary block and describe it in JSON.
fn place(
    availability: &Availability,
    class: AvailabilityClass,
    levels: u8,
    binary: &mut Vec<u8>,
    views: &mut Vec<BufferViewJson>,
) -> AvailabilityJson {
    let available_count = Some(availability.available_count(class.cell_count(levels)));

    match availability {
        Availability::Always | Availability::Never => AvailabilityJson {
            constant: availability.constant(),
            buffer_view: None,
            available_count,
        },
        Availability::Bitstream(bits) => {
            pad(binary, 0x00);
            let byte_offset = binary.len() as u64;
            binary.extend_from_slice(bits.as_bytes());
            views.push(BufferViewJson {
                buffer: 0,
                byte_offset,
                byte_length: bits.byte_len() as u64,
            });

            AvailabilityJson {
                constant: None,
                buffer_view: Some(views.len() - 1),
                available_count,
            }
        }
    }
}

fn read_availability(
    json: &AvailabilityJson,
    class: AvailabilityClass,
    levels: u8,
    views: &[BufferViewJson],
    binary: &[u8],
) -> Result<Availability, TilesError> {
    match (json.constant, json.buffer_view) {
        (Some(1), None) => Ok(Availability::Always),
        (Some(0), None) => Ok(Availability::Never),
        (Some(c), None) => Err(malformed(format!(
            "{} availability constant must be 0 or 1, got {}",
            class.name(),
            c
        ))),
        (None, Some(index)) => {
            let view = views.get(index).ok_or_else(|| {
                malformed(format!(
                    "{} availability references missing buffer view {}",
                    class.name(),
                    index
                ))
            })?;
            if view.buffer != 0 {
                return Err(malformed(format!(
                    "buffer view {} references unknown buffer {}",
                    index, view.buffer
                )));
            }

            let start = view.byte_offset as usize;
            let end = view
                .byte_offset
                .checked_add(view.byte_length)
                .map(|e| e as usize)
                .filter(|&e| e <= binary.len())
                .ok_or_else(|| {
                    malformed(format!(
                        "buffer view {} ({}+{}) exceeds binary block of {} bytes",
                        index,
                        view.byte_offset,
                        view.byte_length,
                        binary.len()
                    ))
                })?;

            let expected = crate::availability::byte_len_for(class.cell_count(levels));
            if end - start != expected {
                return Err(malformed(format!(
                    "{} bitstream has {} bytes, expected {}",
                    class.name(),
                    end - start,
                    expected
                )));
            }

            Ok(Availability::Bitstream(Bitstream::from_bytes(
                binary[start..end].to_vec(),
            )))
        }
        _ => Err(malformed(format!(
            "{} availability must have exactly one of constant or bufferView",
            class.name()
        ))),
    }
}

fn pad(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % ALIGNMENT;
    if rem != 0 {
        buf.resize(buf.len() + ALIGNMENT - rem, fill);
    }
}

fn le_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

fn malformed(msg: String) -> TilesError {
    TilesError::MalformedArtifact(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::byte_len_for;
    use proptest::prelude::*;

    fn bitstream(cells: u64, set: &[u64]) -> Availability {
        let mut bits = Bitstream::zeroed(cells);
        for &i in set {
            bits.set(i);
        }
        Availability::Bitstream(bits)
    }

    fn header_lengths(bytes: &[u8]) -> (u64, u64) {
        (
            u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
        )
    }

    #[test]
    fn test_all_constant_has_empty_binary_block() {
        let artifact = SubtreeArtifact::new(
            2,
            Availability::Always,
            Availability::Always,
            Availability::Never,
        )
        .unwrap();

        let bytes = encode(&artifact).unwrap();
        let (json_len, bin_len) = header_lengths(&bytes);

        assert_eq!(&bytes[0..4], b"subt");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        assert_eq!(bin_len, 0);
        assert_eq!(json_len % 4, 0);
        assert_eq!(bytes.len() as u64, HEADER_LEN as u64 + json_len);

        let json: serde_json::Value =
            serde_json::from_slice(&bytes[HEADER_LEN..HEADER_LEN + json_len as usize]).unwrap();
        assert_eq!(json["tileAvailability"]["constant"], 1);
        assert_eq!(json["contentAvailability"][0]["constant"], 1);
        assert_eq!(json["childSubtreeAvailability"]["constant"], 0);
        assert!(json.get("bufferViews").is_none());

        assert_eq!(decode(&bytes).unwrap(), artifact);
    }

    #[test]
    fn test_json_padding_is_spaces() {
        let artifact = SubtreeArtifact::empty(1);
        let bytes = encode(&artifact).unwrap();
        let (json_len, _) = header_lengths(&bytes);
        let json = &bytes[HEADER_LEN..HEADER_LEN + json_len as usize];

        let trimmed = json.iter().rposition(|&b| b == b'}').unwrap();
        assert!(json[trimmed + 1..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_bitstreams_in_fixed_order_and_aligned() {
        let tile = bitstream(21, &[0, 1, 7]);
        let content = bitstream(21, &[7]);
        let child = bitstream(64, &[63]);
        let artifact =
            SubtreeArtifact::new(3, tile.clone(), content.clone(), child.clone()).unwrap();

        let bytes = encode(&artifact).unwrap();
        let (json_len, bin_len) = header_lengths(&bytes);
        assert_eq!(bin_len % 8, 0);

        let json: serde_json::Value =
            serde_json::from_slice(&bytes[HEADER_LEN..HEADER_LEN + json_len as usize]).unwrap();
        let views = json["bufferViews"].as_array().unwrap();
        assert_eq!(views.len(), 3);
        assert_eq!(json["tileAvailability"]["bufferView"], 0);
        assert_eq!(json["contentAvailability"][0]["bufferView"], 1);
        assert_eq!(json["childSubtreeAvailability"]["bufferView"], 2);

        let offsets: Vec<u64> = views
            .iter()
            .map(|v| v["byteOffset"].as_u64().unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert!(offsets.iter().all(|o| o % 8 == 0));
        assert_eq!(views[2]["byteLength"], byte_len_for(64) as u64);

        assert_eq!(decode(&bytes).unwrap(), artifact);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = encode(&SubtreeArtifact::empty(2)).unwrap();
        bytes[0] = b'x';
        assert!(matches!(
            decode(&bytes),
            Err(TilesError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        let mut bytes = encode(&SubtreeArtifact::empty(2)).unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(TilesError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut bytes = encode(&SubtreeArtifact::empty(2)).unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());

        let bytes = encode(&SubtreeArtifact::empty(2)).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        assert!(decode(&[]).is_err());
        assert!(decode(b"subt").is_err());
    }

    /// Assemble a container around a raw JSON block and binary block.
    fn container(json: &[u8], binary: &[u8]) -> Vec<u8> {
        let mut json = json.to_vec();
        pad(&mut json, b' ');

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(json.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(binary.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&json);
        bytes.extend_from_slice(binary);
        bytes
    }

    #[test]
    fn test_decode_rejects_short_bitstream() {
        // Hand-build a subtree whose child bitstream is one byte too short
        let json = br#"{"buffers":[{"byteLength":1}],"bufferViews":[{"buffer":0,"byteOffset":0,"byteLength":1}],"tileAvailability":{"constant":1},"contentAvailability":[{"constant":1}],"childSubtreeAvailability":{"bufferView":0},"subtreeLevels":2}"#;
        let bytes = container(json, &[0xFF, 0, 0, 0, 0, 0, 0, 0]);

        assert!(matches!(
            decode(&bytes),
            Err(TilesError::MalformedArtifact(msg)) if msg.contains("child subtree")
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range_levels() {
        for levels in [0u8, MAX_LEVEL + 1, 40, u8::MAX] {
            let json = format!(
                r#"{{"buffers":[{{"byteLength":8}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":8}}],"tileAvailability":{{"bufferView":0}},"contentAvailability":[{{"constant":0}}],"childSubtreeAvailability":{{"constant":0}},"subtreeLevels":{}}}"#,
                levels
            );
            let bytes = container(json.as_bytes(), &[0xFF; 8]);

            assert!(
                matches!(
                    decode(&bytes),
                    Err(TilesError::MalformedArtifact(msg)) if msg.contains("subtree levels")
                ),
                "levels={}",
                levels
            );
        }
    }

    #[test]
    fn test_encode_rejects_invalid_artifact() {
        let artifact = SubtreeArtifact {
            subtree_levels: 2,
            tile_availability: bitstream(64, &[]),
            content_availability: vec![Availability::Never],
            child_subtree_availability: Availability::Never,
        };
        assert!(encode(&artifact).is_err());
    }

    fn availability_strategy(cells: u64) -> impl Strategy<Value = Availability> {
        let len = byte_len_for(cells);
        prop_oneof![
            Just(Availability::Always),
            Just(Availability::Never),
            proptest::collection::vec(any::<u8>(), len)
                .prop_map(|bytes| Availability::Bitstream(Bitstream::from_bytes(bytes))),
        ]
    }

    fn artifact_strategy() -> impl Strategy<Value = SubtreeArtifact> {
        (1u8..=3).prop_flat_map(|levels| {
            (
                availability_strategy(AvailabilityClass::Tile.cell_count(levels)),
                availability_strategy(AvailabilityClass::Content.cell_count(levels)),
                availability_strategy(AvailabilityClass::ChildSubtree.cell_count(levels)),
            )
                .prop_map(move |(tile, content, child)| SubtreeArtifact {
                    subtree_levels: levels,
                    tile_availability: tile,
                    content_availability: vec![content],
                    child_subtree_availability: child,
                })
        })
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(artifact in artifact_strategy()) {
            let bytes = encode(&artifact).unwrap();
            let (json_len, bin_len) = header_lengths(&bytes);
            prop_assert_eq!(json_len % 4, 0);
            prop_assert_eq!(bin_len % 4, 0);
            prop_assert_eq!(decode(&bytes).unwrap(), artifact);
        }
    }
}
