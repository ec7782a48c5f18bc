//! Byte encodings whose byte-wise comparison equals value comparison.
//!
//! Every index key in this module is built from these encodings, so a
//! cursor walking keys in byte order walks them in numeric (or value)
//! order. The workhorse is the compressed unsigned encoding: one length
//! byte counting significant bytes, then the value big-endian with
//! leading zero bytes stripped. Shorter encodings sort before longer
//! ones and equal lengths compare big-endian, which together reproduce
//! unsigned numeric order.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

// ============================================================
// Compressed unsigned longs
// ============================================================

/// Appends the order-preserving compressed encoding of `value`.
pub fn write_compressed_u64(output: &mut Vec<u8>, value: u64) {
    let significant = (8 - value.leading_zeros() / 8) as usize;
    output.push(significant as u8);
    let bytes = value.to_be_bytes();
    output.extend_from_slice(&bytes[8 - significant..]);
}

/// Reads one compressed value from the front of `input`, advancing it
/// past the consumed bytes. `None` means the input is truncated or the
/// length byte is out of range.
pub fn read_compressed_u64(input: &mut &[u8]) -> Option<u64> {
    let (&length, rest) = input.split_first()?;
    let length = length as usize;
    if length > 8 || rest.len() < length {
        return None;
    }
    let mut value = 0_u64;
    for &byte in &rest[..length] {
        value = (value << 8) | u64::from(byte);
    }
    *input = &rest[length..];
    Some(value)
}

/// Compressed encoding of a non-negative `i64`.
///
/// Local ids, link ids and property ids are assigned non-negative, so
/// the unsigned encoding keeps their numeric order.
#[must_use]
pub fn encode_long(value: i64) -> Vec<u8> {
    let mut output = Vec::with_capacity(9);
    #[allow(clippy::cast_sign_loss)]
    write_compressed_u64(&mut output, value as u64);
    output
}

// ============================================================
// Composite link keys
// ============================================================

use super::entity_id::EntityId;

/// Key of the forward link index: `(source local id, link id)`.
/// Duplicate values under one key are the link's targets.
#[must_use]
pub fn link_key(source_local_id: i64, link_id: i32) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    #[allow(clippy::cast_sign_loss)]
    {
        write_compressed_u64(&mut key, source_local_id as u64);
        write_compressed_u64(&mut key, u64::from(link_id as u32));
    }
    key
}

/// Decodes a forward link key back into `(source local id, link id)`.
#[must_use]
pub fn decode_link_key(mut key: &[u8]) -> Option<(i64, i32)> {
    let source = read_compressed_u64(&mut key)?;
    let link = read_compressed_u64(&mut key)?;
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let decoded = (source as i64, link as u32 as i32);
    Some(decoded)
}

/// Key of the reverse link index: `(link id, target id)`. Duplicate
/// values under one key are the linking sources' local ids.
#[must_use]
pub fn reverse_link_key(link_id: i32, target: EntityId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    #[allow(clippy::cast_sign_loss)]
    {
        write_compressed_u64(&mut key, u64::from(link_id as u32));
        write_compressed_u64(&mut key, u64::from(target.type_id as u32));
        write_compressed_u64(&mut key, target.local_id as u64);
    }
    key
}

/// Entity id as an index value payload.
#[must_use]
pub fn encode_entity_id(id: EntityId) -> Vec<u8> {
    let mut value = Vec::with_capacity(12);
    #[allow(clippy::cast_sign_loss)]
    {
        write_compressed_u64(&mut value, u64::from(id.type_id as u32));
        write_compressed_u64(&mut value, id.local_id as u64);
    }
    value
}

/// Decodes an entity id payload.
#[must_use]
pub fn decode_entity_id(mut value: &[u8]) -> Option<EntityId> {
    let type_id = read_compressed_u64(&mut value)?;
    let local_id = read_compressed_u64(&mut value)?;
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let decoded = EntityId::new(type_id as u32 as i32, local_id as i64);
    Some(decoded)
}

/// Decodes a bare compressed local id.
#[must_use]
pub fn decode_long(mut value: &[u8]) -> Option<i64> {
    let raw = read_compressed_u64(&mut value)?;
    #[allow(clippy::cast_possible_wrap)]
    let decoded = raw as i64;
    Some(decoded)
}

// ============================================================
// Property values
// ============================================================

const TAG_BOOLEAN: u8 = 0;
const TAG_LONG: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_STRING: u8 = 3;

/// A typed property value with a stable total order.
///
/// Integers compare numerically, floats through `total_cmp`, strings
/// through natural string order. Values of different types order by a
/// fixed type rank (boolean, long, double, string), matching the byte
/// order of [`PropertyValue::to_key_bytes`].
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Boolean flag.
    Boolean(bool),
    /// Signed 64-bit integer; smaller widths widen on the way in.
    Long(i64),
    /// 64-bit float ordered by `total_cmp`.
    Double(f64),
    /// UTF-8 string in natural order.
    String(String),
}

impl PropertyValue {
    const fn rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => TAG_BOOLEAN,
            Self::Long(_) => TAG_LONG,
            Self::Double(_) => TAG_DOUBLE,
            Self::String(_) => TAG_STRING,
        }
    }

    /// Index key encoding: one type tag byte, then a payload whose byte
    /// order equals the value order within the type.
    ///
    /// Signed integers bias by the sign bit, floats use the monotone
    /// bit trick, strings terminate with a NUL so a prefix sorts before
    /// its extensions.
    #[must_use]
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(9);
        key.push(self.rank());
        match self {
            Self::Boolean(value) => key.push(u8::from(*value)),
            Self::Long(value) => {
                #[allow(clippy::cast_sign_loss)]
                let biased = (*value as u64) ^ (1 << 63);
                key.extend_from_slice(&biased.to_be_bytes());
            }
            Self::Double(value) => {
                let bits = value.to_bits();
                let monotone = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                key.extend_from_slice(&monotone.to_be_bytes());
            }
            Self::String(value) => {
                key.extend_from_slice(value.as_bytes());
                key.push(0);
            }
        }
        key
    }

    /// Decodes a key produced by [`Self::to_key_bytes`].
    #[must_use]
    pub fn from_key_bytes(key: &[u8]) -> Option<Self> {
        let (&tag, payload) = key.split_first()?;
        match tag {
            TAG_BOOLEAN => match payload {
                [0] => Some(Self::Boolean(false)),
                [1] => Some(Self::Boolean(true)),
                _ => None,
            },
            TAG_LONG => {
                let biased = u64::from_be_bytes(payload.try_into().ok()?);
                #[allow(clippy::cast_possible_wrap)]
                let value = (biased ^ (1 << 63)) as i64;
                Some(Self::Long(value))
            }
            TAG_DOUBLE => {
                let monotone = u64::from_be_bytes(payload.try_into().ok()?);
                let bits = if monotone >> 63 == 0 {
                    !monotone
                } else {
                    monotone ^ (1 << 63)
                };
                Some(Self::Double(f64::from_bits(bits)))
            }
            TAG_STRING => {
                let text = payload.strip_suffix(&[0])?;
                Some(Self::String(String::from_utf8(text.to_vec()).ok()?))
            }
            _ => None,
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PropertyValue {}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Boolean(left), Self::Boolean(right)) => left.cmp(right),
            (Self::Long(left), Self::Long(right)) => left.cmp(right),
            (Self::Double(left), Self::Double(right)) => left.total_cmp(right),
            (Self::String(left), Self::String(right)) => left.cmp(right),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Boolean(value) => value.hash(state),
            Self::Long(value) => value.hash(state),
            Self::Double(value) => value.to_bits().hash(state),
            Self::String(value) => value.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EntityId, PropertyValue, decode_entity_id, decode_link_key, encode_entity_id, link_key,
        read_compressed_u64, write_compressed_u64,
    };
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(255)]
    #[case(256)]
    #[case(u64::MAX)]
    fn test_compressed_round_trip(#[case] value: u64) {
        let mut encoded = Vec::new();
        write_compressed_u64(&mut encoded, value);
        let mut input = encoded.as_slice();
        assert_eq!(read_compressed_u64(&mut input), Some(value));
        assert!(input.is_empty());
    }

    #[rstest]
    fn test_link_key_round_trip() {
        let key = link_key(12_345, 7);
        assert_eq!(decode_link_key(&key), Some((12_345, 7)));
        let id = EntityId::new(3, 99);
        assert_eq!(decode_entity_id(&encode_entity_id(id)), Some(id));
    }

    proptest! {
        #[test]
        fn compressed_byte_order_matches_numeric_order(left: u64, right: u64) {
            let mut left_bytes = Vec::new();
            let mut right_bytes = Vec::new();
            write_compressed_u64(&mut left_bytes, left);
            write_compressed_u64(&mut right_bytes, right);
            prop_assert_eq!(left_bytes.cmp(&right_bytes), left.cmp(&right));
        }

        #[test]
        fn long_key_byte_order_matches_value_order(left: i64, right: i64) {
            let left_key = PropertyValue::Long(left).to_key_bytes();
            let right_key = PropertyValue::Long(right).to_key_bytes();
            prop_assert_eq!(left_key.cmp(&right_key), left.cmp(&right));
        }

        #[test]
        fn double_key_byte_order_matches_total_order(left: f64, right: f64) {
            let left_key = PropertyValue::Double(left).to_key_bytes();
            let right_key = PropertyValue::Double(right).to_key_bytes();
            prop_assert_eq!(left_key.cmp(&right_key), left.total_cmp(&right));
        }
    }

    #[rstest]
    fn test_property_value_round_trip() {
        for value in [
            PropertyValue::Boolean(true),
            PropertyValue::Long(-42),
            PropertyValue::Double(3.25),
            PropertyValue::String("issue2".to_string()),
        ] {
            let key = value.to_key_bytes();
            assert_eq!(PropertyValue::from_key_bytes(&key), Some(value));
        }
    }
}
