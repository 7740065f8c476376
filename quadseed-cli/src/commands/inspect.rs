//! Inspect command - decode a subtree file and print its availability.

use std::path::Path;

use quadseed::availability::{Availability, AvailabilityClass};
use quadseed::subtree::SubtreeArtifact;
use serde_json::{json, Value};

use crate::error::CliError;

/// Run the inspect command.
pub fn run(file: &Path) -> Result<(), CliError> {
    let bytes = std::fs::read(file).map_err(|e| CliError::FileRead {
        path: file.display().to_string(),
        error: e,
    })?;
    let artifact = SubtreeArtifact::from_bytes(&bytes)?;

    println!("{}", render(&summary(&artifact, bytes.len())));
    Ok(())
}

/// JSON availability summary of a subtree.
pub fn summary(artifact: &SubtreeArtifact, encoded_len: usize) -> Value {
    let levels = artifact.subtree_levels;
    let content: Vec<Value> = artifact
        .content_availability
        .iter()
        .map(|a| describe(a, AvailabilityClass::Content, levels))
        .collect();

    json!({
        "subtree_levels": levels,
        "encoded_bytes": encoded_len,
        "empty": artifact.is_empty(),
        "tile_availability": describe(&artifact.tile_availability, AvailabilityClass::Tile, levels),
        "content_availability": content,
        "child_subtree_availability": describe(
            &artifact.child_subtree_availability,
            AvailabilityClass::ChildSubtree,
            levels,
        ),
    })
}

fn describe(availability: &Availability, class: AvailabilityClass, levels: u8) -> Value {
    let cells = class.cell_count(levels);
    let kind = match availability.constant() {
        Some(1) => "always",
        Some(_) => "never",
        None => "bitstream",
    };
    json!({
        "kind": kind,
        "cells": cells,
        "available": availability.available_count(cells),
    })
}

pub fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
