//! Binary cache for bound rule tables.
//!
//! Binding walks every type and field of the schema; large schemas can skip
//! that work at startup by persisting the resulting [`RuleBindings`]. The
//! format is a 32-byte fixed header followed by a bincode-encoded payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"FGAT"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Crate format generation (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! ## Versioning
//!
//! The format version in the header must match exactly. If it does not,
//! deserialization fails immediately with [`DeserializeError::IncompatibleVersion`].
//!
//! A decoded table only names rules; it is checked against the live schema
//! and registry when handed to
//! [`PipelineBuilder::bindings`](crate::PipelineBuilder::bindings).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RuleBindings;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"FGAT";
const FORMAT_VERSION: u16 = 1;
const GENERATION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when serializing [`RuleBindings`] to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode rule bindings: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when deserializing [`RuleBindings`] from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a fieldgate binding cache: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, crate supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("cache was built from a different schema")]
    StaleSchema,

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedBindings {
    metadata: BindingsMetadata,
    /// Every distinct rule name; bindings refer to rules by slot.
    rule_names: Vec<String>,
    types: Vec<SerializedTypeBinding>,
    fields: Vec<SerializedFieldBinding>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BindingsMetadata {
    type_count: usize,
    field_count: usize,
    rule_count: usize,
    schema_digest: Option<[u8; 32]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedTypeBinding {
    type_name: String,
    rules: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedFieldBinding {
    parent: String,
    field: String,
    rules: Vec<u32>,
}

// ---------------------------------------------------------------------------
// RuleBindings -> SerializedBindings
// ---------------------------------------------------------------------------

/// Interns rule names in first-seen order.
#[derive(Default)]
struct RuleSlots {
    names: Vec<String>,
    slots: HashMap<String, u32>,
}

impl RuleSlots {
    #[allow(clippy::cast_possible_truncation)] // rule counts never approach u32::MAX
    fn slot(&mut self, name: &str) -> u32 {
        if let Some(slot) = self.slots.get(name) {
            return *slot;
        }
        let slot = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.slots.insert(name.to_owned(), slot);
        slot
    }

    fn slots_for(&mut self, rules: &[String]) -> Vec<u32> {
        rules.iter().map(|rule| self.slot(rule)).collect()
    }
}

fn digest(schema_text: &str) -> [u8; 32] {
    *blake3::hash(schema_text.as_bytes()).as_bytes()
}

fn bindings_to_serialized(bindings: &RuleBindings, schema_text: Option<&str>) -> SerializedBindings {
    let mut slots = RuleSlots::default();

    // Sorted for deterministic output
    let mut type_names: Vec<&String> = bindings.types.keys().collect();
    type_names.sort();
    let types: Vec<SerializedTypeBinding> = type_names
        .into_iter()
        .map(|ty| SerializedTypeBinding {
            type_name: ty.clone(),
            rules: slots.slots_for(bindings.type_rules(ty)),
        })
        .collect();

    let mut field_keys: Vec<(&String, &String)> = bindings
        .fields
        .iter()
        .flat_map(|(parent, fields)| fields.keys().map(move |field| (parent, field)))
        .collect();
    field_keys.sort();
    let fields: Vec<SerializedFieldBinding> = field_keys
        .into_iter()
        .map(|(parent, field)| SerializedFieldBinding {
            parent: parent.clone(),
            field: field.clone(),
            rules: slots.slots_for(bindings.field_rules(parent, field)),
        })
        .collect();

    SerializedBindings {
        metadata: BindingsMetadata {
            type_count: types.len(),
            field_count: fields.len(),
            rule_count: slots.names.len(),
            schema_digest: schema_text.map(digest),
        },
        rule_names: slots.names,
        types,
        fields,
    }
}

// ---------------------------------------------------------------------------
// SerializedBindings -> RuleBindings
// ---------------------------------------------------------------------------

fn serialized_to_bindings(ser: SerializedBindings) -> Result<RuleBindings, DeserializeError> {
    validate(&ser)?;

    let names = |rules: Vec<u32>| -> Vec<String> {
        rules
            .into_iter()
            .map(|slot| ser.rule_names[slot as usize].clone())
            .collect()
    };

    let mut bindings = RuleBindings::default();
    for binding in ser.types {
        bindings.types.insert(binding.type_name, names(binding.rules));
    }
    for binding in ser.fields {
        bindings
            .fields
            .entry(binding.parent)
            .or_default()
            .insert(binding.field, names(binding.rules));
    }
    Ok(bindings)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedBindings) -> Result<(), DeserializeError> {
    // Metadata consistency
    if ser.metadata.type_count != ser.types.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} bound types but payload has {}",
            ser.metadata.type_count,
            ser.types.len()
        )));
    }
    if ser.metadata.field_count != ser.fields.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} bound fields but payload has {}",
            ser.metadata.field_count,
            ser.fields.len()
        )));
    }
    if ser.metadata.rule_count != ser.rule_names.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} rules but payload has {}",
            ser.metadata.rule_count,
            ser.rule_names.len()
        )));
    }

    let rule_count = ser.rule_names.len();
    let lists = ser
        .types
        .iter()
        .map(|b| (b.type_name.clone(), &b.rules))
        .chain(
            ser.fields
                .iter()
                .map(|b| (format!("{}.{}", b.parent, b.field), &b.rules)),
        );
    for (location, rules) in lists {
        validate_rule_list(&location, rules, rule_count)?;
    }

    // Locations must be unique
    let mut seen_types = std::collections::HashSet::new();
    for binding in &ser.types {
        if !seen_types.insert(binding.type_name.as_str()) {
            return Err(DeserializeError::Validation(format!(
                "type '{}' is bound twice",
                binding.type_name
            )));
        }
    }
    let mut seen_fields = std::collections::HashSet::new();
    for binding in &ser.fields {
        if !seen_fields.insert((binding.parent.as_str(), binding.field.as_str())) {
            return Err(DeserializeError::Validation(format!(
                "field '{}.{}' is bound twice",
                binding.parent, binding.field
            )));
        }
    }

    Ok(())
}

fn validate_rule_list(
    location: &str,
    rules: &[u32],
    rule_count: usize,
) -> Result<(), DeserializeError> {
    if rules.is_empty() {
        return Err(DeserializeError::Validation(format!(
            "'{location}' has an empty rule list"
        )));
    }
    for (i, slot) in rules.iter().enumerate() {
        if *slot as usize >= rule_count {
            return Err(DeserializeError::Validation(format!(
                "'{location}' references rule slot {slot} but only {rule_count} rules exist"
            )));
        }
        if rules[..i].contains(slot) {
            return Err(DeserializeError::Validation(format!(
                "'{location}' lists rule slot {slot} twice"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) {
    let hash = blake3::hash(payload);
    let hash_bytes = hash.as_bytes();

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&GENERATION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    #[allow(clippy::cast_possible_truncation)] // payload will never exceed 4 GiB
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash_bytes[..16]);
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] is the generation (informational)
    // bytes[8..12] is flags (reserved)
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(
    bindings: &RuleBindings,
    schema_text: Option<&str>,
) -> Result<Vec<u8>, SerializeError> {
    let serialized = bindings_to_serialized(bindings, schema_text);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a cache blob. With `schema_text`, the blob must have been written
/// for exactly that schema source.
pub(crate) fn decode(
    bytes: &[u8],
    schema_text: Option<&str>,
) -> Result<RuleBindings, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_start = HEADER_SIZE;
    let payload_end = payload_start + payload_len as usize;
    if bytes.len() < payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[payload_start..payload_end];

    // Integrity check
    let computed_hash = blake3::hash(payload);
    if computed_hash.as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedBindings, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

    if let Some(text) = schema_text {
        if serialized.metadata.schema_digest != Some(digest(text)) {
            return Err(DeserializeError::StaleSchema);
        }
    }

    serialized_to_bindings(serialized)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
