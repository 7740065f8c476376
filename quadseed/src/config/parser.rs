//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module is the single place where INI key names are mapped to struct
//! fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::MAX_SUBTREE_LEVELS;
use super::file::ConfigFileError;
use super::settings::{CollectionSettings, ConfigFile};
use crate::coord::{BoundingBox, MAX_LEVEL};
use crate::dataset::LevelFilter;

/// Prefix of per-collection section names.
const COLLECTION_PREFIX: &str = "collection.";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
    }

    // [dataset] section
    if let Some(section) = ini.section(Some("dataset")) {
        if let Some(v) = section.get("id") {
            let v = v.trim();
            if !is_identifier(v) {
                return Err(invalid(
                    "dataset",
                    "id",
                    v,
                    "must be a non-empty name without path separators",
                ));
            }
            config.dataset.id = v.to_string();
        }
        if let Some(v) = section.get("bbox") {
            config.dataset.bbox = parse_bbox(v).ok_or_else(|| {
                invalid(
                    "dataset",
                    "bbox",
                    v,
                    "expected 'minx,miny,maxx,maxy' with min below max",
                )
            })?;
        }
    }

    // [tiling] section
    if let Some(section) = ini.section(Some("tiling")) {
        if let Some(v) = section.get("max_level") {
            let level: u8 = number("tiling", "max_level", v)?;
            if level > MAX_LEVEL {
                return Err(invalid(
                    "tiling",
                    "max_level",
                    v,
                    &format!("must be at most {}", MAX_LEVEL),
                ));
            }
            config.tiling.max_level = level;
        }
        if let Some(v) = section.get("subtree_levels") {
            let levels: u8 = number("tiling", "subtree_levels", v)?;
            if levels == 0 || levels > MAX_SUBTREE_LEVELS {
                return Err(invalid(
                    "tiling",
                    "subtree_levels",
                    v,
                    &format!("must be between 1 and {}", MAX_SUBTREE_LEVELS),
                ));
            }
            config.tiling.subtree_levels = levels;
        }
        if let Some(v) = section.get("first_level_with_content") {
            config.tiling.first_level_with_content =
                number("tiling", "first_level_with_content", v)?;
        }
    }

    // [seeding] section
    if let Some(section) = ini.section(Some("seeding")) {
        if let Some(v) = section.get("partitions") {
            config.seeding.partitions = positive("seeding", "partitions", v)?;
        }
        if let Some(v) = section.get("purge") {
            config.seeding.purge = parse_bool(v);
        }
        if let Some(v) = section.get("force") {
            config.seeding.force = parse_bool(v);
        }
        if let Some(v) = section.get("poll_interval_ms") {
            config.seeding.poll_interval_ms = positive("seeding", "poll_interval_ms", v)?;
        }
        if let Some(v) = section.get("max_poll_attempts") {
            config.seeding.max_poll_attempts = positive("seeding", "max_poll_attempts", v)?;
        }
        if let Some(v) = section.get("purge_grace_ms") {
            config.seeding.purge_grace_ms = number("seeding", "purge_grace_ms", v)?;
        }
        if let Some(v) = section.get("content_concurrency") {
            config.seeding.content_concurrency = positive("seeding", "content_concurrency", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    // [collection.<id>] sections
    for (name, section) in ini.iter() {
        let Some(id) = name.and_then(|n| n.strip_prefix(COLLECTION_PREFIX)) else {
            continue;
        };
        let name = name.unwrap_or_default();
        if !is_identifier(id) {
            return Err(invalid(
                name,
                "",
                id,
                "collection name must be non-empty without path separators",
            ));
        }
        if config.collections.iter().any(|c| c.id == id) {
            return Err(invalid(name, "", id, "collection declared twice"));
        }
        config.collections.push(parse_collection(name, id, section)?);
    }

    if config.tiling.max_level as u32 + config.tiling.subtree_levels as u32 > MAX_LEVEL as u32 + 1 {
        return Err(invalid(
            "tiling",
            "max_level",
            &config.tiling.max_level.to_string(),
            "max_level plus subtree_levels exceeds the addressable depth",
        ));
    }

    Ok(config)
}

/// Parse one collection section.
///
/// `tile_filter` / `content_filter` apply on every level; keys suffixed with
/// `.<min>-<max>` apply on that level range and take precedence.
fn parse_collection(
    section_name: &str,
    id: &str,
    section: &Properties,
) -> Result<CollectionSettings, ConfigFileError> {
    let mut tile_ranged = Vec::new();
    let mut content_ranged = Vec::new();
    let mut tile_all = None;
    let mut content_all = None;

    for (key, value) in section.iter() {
        let value = value.trim();
        let (base, range) = match key.split_once('.') {
            Some((base, range)) => (base, Some(range)),
            None => (key, None),
        };

        let filter = match range {
            Some(range) => {
                let (min, max) = parse_level_range(range).ok_or_else(|| {
                    invalid(
                        section_name,
                        key,
                        value,
                        "level range must look like '<min>-<max>' with min <= max",
                    )
                })?;
                Some(LevelFilter::levels(min, max, value))
            }
            None => None,
        };

        match (base, filter) {
            ("tile_filter", Some(f)) => tile_ranged.push(f),
            ("content_filter", Some(f)) => content_ranged.push(f),
            ("tile_filter", None) => tile_all = Some(LevelFilter::all_levels(value)),
            ("content_filter", None) => content_all = Some(LevelFilter::all_levels(value)),
            _ => {
                return Err(invalid(
                    section_name,
                    key,
                    value,
                    "unknown key, expected tile_filter or content_filter",
                ))
            }
        }
    }

    tile_ranged.extend(tile_all);
    content_ranged.extend(content_all);

    Ok(CollectionSettings {
        id: id.to_string(),
        tile_filters: tile_ranged,
        content_filters: content_ranged,
    })
}

fn parse_level_range(range: &str) -> Option<(u8, u8)> {
    let (min, max) = range.split_once('-')?;
    let min: u8 = min.trim().parse().ok()?;
    let max: u8 = max.trim().parse().ok()?;
    (min <= max).then_some((min, max))
}

fn parse_bbox(value: &str) -> Option<BoundingBox> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [min_x, min_y, max_x, max_y] = parts.as_slice() else {
        return None;
    };
    let bbox = BoundingBox::new(*min_x, *min_y, *max_x, *max_y);
    bbox.is_valid().then_some(bbox)
}

fn number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn positive<T: FromStr + PartialEq + Default>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigFileError> {
    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(invalid(section, key, value, "must be a positive integer")),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
