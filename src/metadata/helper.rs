//! Well-known frame-metadata keys: composing entries on the encode path
//! and reading them back from compressed frame containers.

use crate::engine::FrameContainer;
use crate::frame::{EncodingMetadata, GridDescriptor};

use super::attributes::{
    decode_attributes_v1, decode_attributes_v2, encode_attributes_v2, AttributeSet,
};
use super::shuffle::{parse_grid_shuffle, serialize_grid_shuffle};

/// Frame-level attributes (current format).
pub const KEY_DETAIL_ATTRIBUTES_V2: &str = "houdiniDetailAttributesV2";
/// Frame-level attributes (legacy, read-only).
pub const KEY_DETAIL_ATTRIBUTES_V1: &str = "houdiniDetailAttributes";
/// Grid-descriptor list consumed by the decoder.
pub const KEY_GRID_SHUFFLE: &str = "chShuffle";
/// Origin offset of the frame in voxels.
pub const KEY_DECODE_METADATA: &str = "houdiniDecodeMetadata";

pub fn grid_attributes_key_v2(grid_name: &str) -> String {
    format!("houdiniPrimitiveAttributesV2_{}", grid_name)
}

pub fn grid_attributes_key_v1(grid_name: &str) -> String {
    format!("houdiniPrimitiveAttributes_{}", grid_name)
}

fn visualization_key(grid_name: &str, suffix: &str) -> String {
    format!("houdiniVisualizationAttributes_{}_{}", grid_name, suffix)
}

/// Per-grid display hints carried as four sibling metadata keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizationAttributes {
    pub mode: i32,
    pub iso: f32,
    pub density: f32,
    pub lod: i32,
}

impl VisualizationAttributes {
    fn entries(&self, grid_name: &str) -> Vec<(String, String)> {
        vec![
            (visualization_key(grid_name, "mode"), self.mode.to_string()),
            (visualization_key(grid_name, "iso"), self.iso.to_string()),
            (visualization_key(grid_name, "density"), self.density.to_string()),
            (visualization_key(grid_name, "lod"), self.lod.to_string()),
        ]
    }
}

/// Attribute payload of one grid on the encode path.
#[derive(Debug, Clone, Default)]
pub struct GridMetadata {
    pub attributes: AttributeSet,
    pub visualization: Option<VisualizationAttributes>,
}

/// Composes the flat metadata dictionary attached to one compressed
/// frame: detail attributes, per-grid attributes and display hints, the
/// shuffle table and the decode offsets.
pub fn compose_frame_metadata(
    detail_attributes: &AttributeSet,
    grids: &[(String, GridMetadata)],
    shuffle: &[GridDescriptor],
    encoding_metadata: &EncodingMetadata,
) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for (grid_name, metadata) in grids {
        entries.push((
            grid_attributes_key_v2(grid_name),
            encode_attributes_v2(&metadata.attributes),
        ));
        if let Some(visualization) = &metadata.visualization {
            entries.extend(visualization.entries(grid_name));
        }
    }
    entries.push((
        KEY_DETAIL_ATTRIBUTES_V2.to_owned(),
        encode_attributes_v2(detail_attributes),
    ));
    entries.push((KEY_GRID_SHUFFLE.to_owned(), serialize_grid_shuffle(shuffle)));
    entries.push((
        KEY_DECODE_METADATA.to_owned(),
        encoding_metadata.to_metadata_string(),
    ));
    entries
}

/// Frame-level attributes; V2 preferred, V1 fallback.
pub fn read_detail_attributes(container: &dyn FrameContainer) -> AttributeSet {
    if let Some(payload) = container.metadata_by_key(KEY_DETAIL_ATTRIBUTES_V2) {
        return decode_attributes_v2(&payload);
    }
    if let Some(payload) = container.metadata_by_key(KEY_DETAIL_ATTRIBUTES_V1) {
        return decode_attributes_v1(&payload);
    }
    AttributeSet::new()
}

/// Per-grid attributes; V2 preferred, V1 fallback.
pub fn read_grid_attributes(container: &dyn FrameContainer, grid_name: &str) -> AttributeSet {
    if let Some(payload) = container.metadata_by_key(&grid_attributes_key_v2(grid_name)) {
        return decode_attributes_v2(&payload);
    }
    if let Some(payload) = container.metadata_by_key(&grid_attributes_key_v1(grid_name)) {
        return decode_attributes_v1(&payload);
    }
    AttributeSet::new()
}

/// Display hints for one grid; applied only when all four keys are
/// present and parse.
pub fn read_visualization_attributes(
    container: &dyn FrameContainer,
    grid_name: &str,
) -> Option<VisualizationAttributes> {
    let mode = container.metadata_by_key(&visualization_key(grid_name, "mode"))?;
    let iso = container.metadata_by_key(&visualization_key(grid_name, "iso"))?;
    let density = container.metadata_by_key(&visualization_key(grid_name, "density"))?;
    let lod = container.metadata_by_key(&visualization_key(grid_name, "lod"))?;
    Some(VisualizationAttributes {
        mode: mode.trim().parse().ok()?,
        iso: iso.trim().parse().ok()?,
        density: density.trim().parse().ok()?,
        lod: lod.trim().parse().ok()?,
    })
}

/// Shuffle table of the frame; empty when absent or malformed.
pub fn read_grid_shuffle(container: &dyn FrameContainer) -> Vec<GridDescriptor> {
    container
        .metadata_by_key(KEY_GRID_SHUFFLE)
        .map(|payload| parse_grid_shuffle(&payload))
        .unwrap_or_default()
}

/// Origin offset of the frame, when recorded by the encoder.
pub fn read_encoding_metadata(container: &dyn FrameContainer) -> Option<EncodingMetadata> {
    container
        .metadata_by_key(KEY_DECODE_METADATA)
        .and_then(|payload| EncodingMetadata::parse(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::FrameInfo;
    use crate::metadata::attributes::{Attribute, AttributeStorage};
    use std::collections::BTreeMap;

    /// Container stub backed by a plain dictionary.
    struct DictContainer {
        entries: BTreeMap<String, String>,
    }

    impl FrameContainer for DictContainer {
        fn info(&self) -> FrameInfo {
            FrameInfo::default()
        }
        fn metadata_by_key(&self, key: &str) -> Option<String> {
            self.entries.get(key).cloned()
        }
        fn metadata_count(&self) -> usize {
            self.entries.len()
        }
        fn metadata_by_index(&self, index: usize) -> Option<(String, String)> {
            self.entries.iter().nth(index).map(|(k, v)| (k.clone(), v.clone()))
        }
    }

    fn container_from(entries: Vec<(String, String)>) -> DictContainer {
        DictContainer { entries: entries.into_iter().collect() }
    }

    #[test]
    fn composed_metadata_reads_back() {
        let mut detail = AttributeSet::new();
        detail.insert("frame".into(), Attribute::int(AttributeStorage::Int32, vec![7]));

        let mut grid_attributes = AttributeSet::new();
        grid_attributes.insert("label".into(), Attribute::string(vec!["fuel".into()]));
        let grid_metadata = GridMetadata {
            attributes: grid_attributes.clone(),
            visualization: Some(VisualizationAttributes {
                mode: 1,
                iso: 0.5,
                density: 2.0,
                lod: 0,
            }),
        };

        let shuffle = vec![GridDescriptor::scalar("density", "density")];
        let encoding = EncodingMetadata { offset_x: 8, offset_y: -8, offset_z: 0 };

        let entries = compose_frame_metadata(
            &detail,
            &[("density".to_owned(), grid_metadata)],
            &shuffle,
            &encoding,
        );
        let container = container_from(entries);

        assert_eq!(read_detail_attributes(&container), detail);
        assert_eq!(read_grid_attributes(&container, "density"), grid_attributes);
        assert_eq!(
            read_visualization_attributes(&container, "density"),
            Some(VisualizationAttributes { mode: 1, iso: 0.5, density: 2.0, lod: 0 })
        );
        assert_eq!(read_grid_shuffle(&container), shuffle);
        assert_eq!(read_encoding_metadata(&container), Some(encoding));
    }

    #[test]
    fn v1_fallback_applies_when_v2_is_absent() {
        let container = container_from(vec![(
            KEY_DETAIL_ATTRIBUTES_V1.to_owned(),
            r#"{"count": {"t": "int32", "v": [3]}}"#.to_owned(),
        )]);
        let decoded = read_detail_attributes(&container);
        assert_eq!(
            decoded.get("count"),
            Some(&Attribute::int(AttributeStorage::Int32, vec![3]))
        );
    }

    #[test]
    fn partial_visualization_keys_yield_none() {
        let container = container_from(vec![
            (visualization_key("fire", "mode"), "1".to_owned()),
            (visualization_key("fire", "iso"), "0.1".to_owned()),
        ]);
        assert_eq!(read_visualization_attributes(&container, "fire"), None);
    }

    #[test]
    fn absent_keys_read_as_empty_defaults() {
        let container = container_from(Vec::new());
        assert!(read_detail_attributes(&container).is_empty());
        assert!(read_grid_attributes(&container, "x").is_empty());
        assert!(read_grid_shuffle(&container).is_empty());
        assert_eq!(read_encoding_metadata(&container), None);
    }
}
