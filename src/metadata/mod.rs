//! Typed attribute dictionaries and the frame-metadata key families.

pub mod attributes;
pub mod helper;
pub mod shuffle;

pub use attributes::{
    decode_attributes_v1, decode_attributes_v2, encode_attributes_v2, Attribute, AttributeData,
    AttributeSet, AttributeStorage,
};
pub use helper::VisualizationAttributes;
pub use shuffle::{parse_grid_shuffle, serialize_grid_shuffle};
