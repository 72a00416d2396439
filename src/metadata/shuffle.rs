//! Grid-descriptor ("shuffle") codec: how decoded channels fuse back
//! into named output grids.

use serde_json::{json, Map, Value};

use crate::frame::GridDescriptor;
use crate::grid::VoxelType;

fn voxel_type_tag(voxel_type: VoxelType) -> &'static str {
    match voxel_type {
        VoxelType::Float1 => "Float1",
        VoxelType::Float3 => "Float3",
    }
}

fn voxel_type_from_tag(tag: &str) -> Option<VoxelType> {
    match tag {
        "Float1" => Some(VoxelType::Float1),
        "Float3" => Some(VoxelType::Float3),
        _ => None,
    }
}

/// Serializes descriptors as the `chShuffle` JSON array.
///
/// Layout per entry: `gridName`, `voxelType` tag, and `chSource0` through
/// `chSource3` with `null` for absent sources.
pub fn serialize_grid_shuffle(descriptors: &[GridDescriptor]) -> String {
    let entries: Vec<Value> = descriptors
        .iter()
        .map(|descriptor| {
            let mut entry = Map::new();
            entry.insert("gridName".into(), Value::from(descriptor.name.as_str()));
            entry.insert(
                "voxelType".into(),
                Value::from(voxel_type_tag(descriptor.voxel_type)),
            );
            for (i, source) in descriptor.ch_source.iter().enumerate() {
                let value = match source {
                    Some(name) => Value::from(name.as_str()),
                    None => Value::Null,
                };
                entry.insert(format!("chSource{}", i), value);
            }
            Value::Object(entry)
        })
        .collect();
    json!(entries).to_string()
}

/// Parses a `chShuffle` payload; malformed entries are skipped.
pub fn parse_grid_shuffle(text: &str) -> Vec<GridDescriptor> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(text) else {
        log::warn!("[shuffle] chShuffle payload is not a JSON array, ignoring");
        return Vec::new();
    };

    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let Some(name) = object.get("gridName").and_then(Value::as_str) else {
            continue;
        };
        let Some(voxel_type) = object
            .get("voxelType")
            .and_then(Value::as_str)
            .and_then(voxel_type_from_tag)
        else {
            log::debug!("[shuffle] Skipping '{}': unknown voxel type", name);
            continue;
        };

        let mut ch_source: [Option<String>; 4] = Default::default();
        for (i, slot) in ch_source.iter_mut().enumerate() {
            *slot = object
                .get(&format!("chSource{}", i))
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
        result.push(GridDescriptor { name: name.to_owned(), voxel_type, ch_source });
    }
    result
}
