//! Lossless round-tripping of typed attribute dictionaries through a
//! self-describing JSON sidecar.
//!
//! Two wire formats exist. V2 is written and read: each attribute is
//! `{"t": <integer storage code>, "v": [values...]}`. V1 is read-only
//! legacy: the type tag is a short string, scalar strings are not arrays
//! and bool/uint8/dict do not exist.
//!
//! Decode failures never escalate: a broken attribute is skipped, a fully
//! malformed document decodes to an empty set.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Storage kind codes of the V2 wire format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeStorage {
    Bool = 0,
    Uint8 = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Float16 = 6,
    Float32 = 7,
    Float64 = 8,
    String = 9,
    Dict = 10,
}

impl AttributeStorage {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Bool),
            1 => Some(Self::Uint8),
            2 => Some(Self::Int8),
            3 => Some(Self::Int16),
            4 => Some(Self::Int32),
            5 => Some(Self::Int64),
            6 => Some(Self::Float16),
            7 => Some(Self::Float32),
            8 => Some(Self::Float64),
            9 => Some(Self::String),
            10 => Some(Self::Dict),
            _ => None,
        }
    }

    /// V1 string tag, as written by legacy encoders.
    pub fn from_v1_tag(tag: &str) -> Option<Self> {
        match tag {
            "bool" => Some(Self::Bool),
            "uint8" => Some(Self::Uint8),
            "int8" => Some(Self::Int8),
            "int16" => Some(Self::Int16),
            "int32" => Some(Self::Int32),
            "int64" => Some(Self::Int64),
            "float16" => Some(Self::Float16),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            "string" => Some(Self::String),
            "dict" => Some(Self::Dict),
            _ => None,
        }
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Uint8 | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }
}

/// Tuple payload of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
    /// Each entry is a nested JSON object kept as its serialized text;
    /// the double encoding is intentional to keep the outer schema
    /// uniform.
    Dict(Vec<String>),
}

/// One typed attribute: storage kind plus tuple values.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub storage: AttributeStorage,
    pub data: AttributeData,
}

impl Attribute {
    pub fn int(storage: AttributeStorage, values: Vec<i64>) -> Self {
        debug_assert!(storage.is_integer());
        Self { storage, data: AttributeData::Int(values) }
    }

    pub fn float(storage: AttributeStorage, values: Vec<f64>) -> Self {
        debug_assert!(storage.is_float());
        Self { storage, data: AttributeData::Float(values) }
    }

    pub fn string(values: Vec<String>) -> Self {
        Self { storage: AttributeStorage::String, data: AttributeData::String(values) }
    }

    pub fn dict(values: Vec<String>) -> Self {
        Self { storage: AttributeStorage::Dict, data: AttributeData::Dict(values) }
    }
}

/// Name-ordered attribute dictionary.
pub type AttributeSet = BTreeMap<String, Attribute>;

/// Serializes an attribute set into the V2 JSON document.
///
/// Int64 values are written as decimal strings: JSON numbers are doubles
/// on the wire and lose integers past 2^53.
pub fn encode_attributes_v2(attributes: &AttributeSet) -> String {
    let mut document = Map::new();
    for (name, attribute) in attributes {
        let values: Vec<Value> = match (&attribute.data, attribute.storage) {
            (AttributeData::Int(values), AttributeStorage::Int64) => {
                values.iter().map(|v| Value::from(v.to_string())).collect()
            }
            (AttributeData::Int(values), _) => values.iter().map(|&v| json!(v)).collect(),
            (AttributeData::Float(values), _) => values.iter().map(|&v| json!(v)).collect(),
            (AttributeData::String(values), _) | (AttributeData::Dict(values), _) => {
                values.iter().map(|v| Value::from(v.as_str())).collect()
            }
        };
        document.insert(
            name.clone(),
            json!({ "t": attribute.storage.code(), "v": values }),
        );
    }
    Value::Object(document).to_string()
}

fn parse_document(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            log::warn!("[attributes] Metadata payload is not a JSON object, ignoring");
            None
        }
        Err(e) => {
            log::warn!("[attributes] Malformed metadata payload ignored: {}", e);
            None
        }
    }
}

fn integer_values(container: &Value, storage: AttributeStorage) -> Option<Vec<i64>> {
    let array = container.as_array()?;
    let mut values = Vec::with_capacity(array.len());
    for value in array {
        if storage == AttributeStorage::Int64 {
            // Int64 travels as decimal strings; plain integers from older
            // writers are tolerated.
            if let Some(text) = value.as_str() {
                values.push(text.parse::<i64>().ok()?);
                continue;
            }
        }
        // Uint8 intentionally shares this signed path with no range
        // check; writers that sign-extended keep their bytes verbatim
        // until the format is re-versioned.
        values.push(value.as_i64()?);
    }
    Some(values)
}

fn float_values(container: &Value) -> Option<Vec<f64>> {
    let array = container.as_array()?;
    array.iter().map(|v| v.as_f64()).collect()
}

fn string_values(container: &Value) -> Option<Vec<String>> {
    let array = container.as_array()?;
    array.iter().map(|v| v.as_str().map(str::to_owned)).collect()
}

fn dict_values(container: &Value) -> Option<Vec<String>> {
    let array = container.as_array()?;
    let mut values = Vec::with_capacity(array.len());
    for value in array {
        let text = value.as_str()?;
        // Each entry must itself parse as a JSON object.
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(_)) => values.push(text.to_owned()),
            _ => return None,
        }
    }
    Some(values)
}

/// Decodes a V2 document. Attributes with an unknown storage code or a
/// value of the wrong shape are skipped.
pub fn decode_attributes_v2(text: &str) -> AttributeSet {
    let mut result = AttributeSet::new();
    let Some(document) = parse_document(text) else {
        return result;
    };

    for (name, container) in document {
        let Some(entry) = container.as_object() else {
            continue;
        };
        let (Some(type_value), Some(values)) = (entry.get("t"), entry.get("v")) else {
            continue;
        };
        let Some(code) = type_value.as_u64() else {
            continue;
        };
        let Some(storage) = AttributeStorage::from_code(code) else {
            log::debug!("[attributes] Skipping '{}': unknown storage code {}", name, code);
            continue;
        };

        let data = if storage.is_integer() {
            integer_values(values, storage).map(AttributeData::Int)
        } else if storage.is_float() {
            float_values(values).map(AttributeData::Float)
        } else if storage == AttributeStorage::String {
            string_values(values).map(AttributeData::String)
        } else {
            dict_values(values).map(AttributeData::Dict)
        };

        match data {
            Some(data) => {
                result.insert(name, Attribute { storage, data });
            }
            None => {
                log::debug!("[attributes] Skipping '{}': value shape mismatch", name);
            }
        }
    }
    result
}

/// Decodes a legacy V1 document (read-only compatibility).
pub fn decode_attributes_v1(text: &str) -> AttributeSet {
    let mut result = AttributeSet::new();
    let Some(document) = parse_document(text) else {
        return result;
    };

    for (name, container) in document {
        let Some(entry) = container.as_object() else {
            continue;
        };
        let (Some(type_value), Some(values)) = (entry.get("t"), entry.get("v")) else {
            continue;
        };
        let Some(tag) = type_value.as_str() else {
            continue;
        };
        let Some(storage) = AttributeStorage::from_v1_tag(tag) else {
            continue;
        };

        let attribute = match storage {
            // Never written by V1 encoders; dict has no V1 form either.
            AttributeStorage::Bool | AttributeStorage::Uint8 | AttributeStorage::Dict => continue,
            AttributeStorage::Int8
            | AttributeStorage::Int16
            | AttributeStorage::Int32
            | AttributeStorage::Int64 => values
                .as_array()
                .and_then(|array| array.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>())
                .map(|data| Attribute::int(storage, data)),
            AttributeStorage::Float16 | AttributeStorage::Float32 | AttributeStorage::Float64 => {
                float_values(values).map(|data| Attribute::float(storage, data))
            }
            AttributeStorage::String => {
                // V1 stores scalar strings bare, not as arrays.
                values.as_str().map(|s| Attribute::string(vec![s.to_owned()]))
            }
        };
        if let Some(attribute) = attribute {
            result.insert(name, attribute);
        }
    }
    result
}
