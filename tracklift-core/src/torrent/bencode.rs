//! Bencode value tree with canonical encoding
//!
//! Encoding always emits dictionary keys sorted by raw bytes, so the same
//! logical value produces the same bytes regardless of insertion order.
//! Decoding goes through `bencode-rs` and converts into owned values.

use std::collections::BTreeMap;
use std::ops::Range;

/// Owned bencode value.
///
/// Dictionaries use `BTreeMap<Vec<u8>, _>`, whose iteration order is the
/// lexicographic raw-byte order bencode requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

/// Errors produced while decoding bencode data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BencodeError {
    #[error("Bencode parsing failed: {reason}")]
    Parse { reason: String },

    #[error("Empty bencode data")]
    Empty,

    #[error("Expected {expected} at offset {offset}")]
    Unexpected {
        expected: &'static str,
        offset: usize,
    },

    #[error("Missing or invalid field: {field}")]
    Field { field: String },
}

impl Value {
    pub fn string(value: impl AsRef<str>) -> Self {
        Value::Bytes(value.as_ref().as_bytes().to_vec())
    }

    pub fn dict() -> Self {
        Value::Dict(BTreeMap::new())
    }

    /// Inserts into a dictionary value. No-op on other variants.
    pub fn insert(&mut self, key: &str, value: Value) {
        if let Value::Dict(map) = self {
            map.insert(key.as_bytes().to_vec(), value);
        }
    }

    /// Removes a key from a dictionary value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self {
            Value::Dict(map) => map.remove(key.as_bytes()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(map) => map.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Dict(map) => map.get_mut(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// Serializes to canonical bencode.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bytes(bytes) => {
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(bytes);
            }
            Value::Integer(value) => {
                out.push(b'i');
                out.extend_from_slice(value.to_string().as_bytes());
                out.push(b'e');
            }
            Value::List(values) => {
                out.push(b'l');
                for value in values {
                    value.encode_into(out);
                }
                out.push(b'e');
            }
            Value::Dict(map) => {
                out.push(b'd');
                for (key, value) in map {
                    out.extend_from_slice(key.len().to_string().as_bytes());
                    out.push(b':');
                    out.extend_from_slice(key);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }

    /// Decodes the first bencode value in `data`.
    ///
    /// # Errors
    ///
    /// - `BencodeError::Parse` - If the data is not valid bencode
    /// - `BencodeError::Empty` - If the data contains no value
    pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
        let parsed = bencode_rs::Value::parse(data).map_err(|e| BencodeError::Parse {
            reason: format!("{e:?}"),
        })?;

        let root = parsed.first().ok_or(BencodeError::Empty)?;
        Ok(Self::from_parsed(root))
    }

    fn from_parsed(value: &bencode_rs::Value<'_>) -> Value {
        match value {
            bencode_rs::Value::Bytes(bytes) => Value::Bytes(bytes.to_vec()),
            bencode_rs::Value::Integer(value) => Value::Integer(*value),
            bencode_rs::Value::List(values) => {
                Value::List(values.iter().map(Self::from_parsed).collect())
            }
            bencode_rs::Value::Dictionary(map) => Value::Dict(
                map.iter()
                    .map(|(key, value)| (key.to_vec(), Self::from_parsed(value)))
                    .collect(),
            ),
        }
    }
}

/// Locates the raw byte range of the top-level `info` dictionary.
///
/// Hashing the raw range keeps the infohash correct for torrents whose
/// producer did not sort keys canonically.
///
/// # Errors
///
/// - `BencodeError::Unexpected` - If the data is not a well-formed dictionary
/// - `BencodeError::Field` - If there is no `info` key
pub fn info_dict_span(data: &[u8]) -> Result<Range<usize>, BencodeError> {
    if data.first() != Some(&b'd') {
        return Err(BencodeError::Unexpected {
            expected: "dictionary start",
            offset: 0,
        });
    }

    let mut pos = 1;
    while pos < data.len() && data[pos] != b'e' {
        let (key, value_start) = read_bytes(data, pos)?;
        let value_end = skip_value(data, value_start)?;
        if key == b"info" {
            return Ok(value_start..value_end);
        }
        pos = value_end;
    }

    Err(BencodeError::Field {
        field: "info".to_string(),
    })
}

/// Reads a byte string at `pos`, returning it and the offset after it.
fn read_bytes(data: &[u8], pos: usize) -> Result<(&[u8], usize), BencodeError> {
    let colon = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|offset| pos + offset)
        .ok_or(BencodeError::Unexpected {
            expected: "string length",
            offset: pos,
        })?;

    let length: usize = std::str::from_utf8(&data[pos..colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(BencodeError::Unexpected {
            expected: "string length",
            offset: pos,
        })?;

    let start = colon + 1;
    let end = start
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or(BencodeError::Unexpected {
            expected: "string body",
            offset: start,
        })?;

    Ok((&data[start..end], end))
}

/// Skips one value starting at `pos`, returning the offset after it.
fn skip_value(data: &[u8], pos: usize) -> Result<usize, BencodeError> {
    match data.get(pos) {
        Some(b'i') => data[pos..]
            .iter()
            .position(|&b| b == b'e')
            .map(|offset| pos + offset + 1)
            .ok_or(BencodeError::Unexpected {
                expected: "integer end",
                offset: pos,
            }),
        Some(b'l') => {
            let mut cursor = pos + 1;
            while data.get(cursor).is_some_and(|&b| b != b'e') {
                cursor = skip_value(data, cursor)?;
            }
            expect_end(data, cursor)
        }
        Some(b'd') => {
            let mut cursor = pos + 1;
            while data.get(cursor).is_some_and(|&b| b != b'e') {
                let (_, value_start) = read_bytes(data, cursor)?;
                cursor = skip_value(data, value_start)?;
            }
            expect_end(data, cursor)
        }
        Some(b'0'..=b'9') => read_bytes(data, pos).map(|(_, end)| end),
        _ => Err(BencodeError::Unexpected {
            expected: "bencode value",
            offset: pos,
        }),
    }
}

fn expect_end(data: &[u8], pos: usize) -> Result<usize, BencodeError> {
    if data.get(pos) == Some(&b'e') {
        Ok(pos + 1)
    } else {
        Err(BencodeError::Unexpected {
            expected: "container end",
            offset: pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(Value::string("spam").encode(), b"4:spam");
        assert_eq!(Value::Integer(42).encode(), b"i42e");
        assert_eq!(Value::Integer(-3).encode(), b"i-3e");
        assert_eq!(Value::Bytes(Vec::new()).encode(), b"0:");
    }

    #[test]
    fn test_encode_sorts_dictionary_keys() {
        let mut dict = Value::dict();
        dict.insert("zebra", Value::Integer(1));
        dict.insert("piece length", Value::Integer(2));
        dict.insert("name", Value::string("x"));

        assert_eq!(
            dict.encode(),
            b"d4:name1:x12:piece lengthi2e5:zebrai1ee".to_vec()
        );
    }

    #[test]
    fn test_encode_nested_list() {
        let value = Value::List(vec![Value::string("a"), Value::List(vec![Value::Integer(0)])]);
        assert_eq!(value.encode(), b"l1:ali0eee");
    }

    #[test]
    fn test_decode_roundtrip_dictionary() {
        let data = b"d8:announce9:test.com:4:infod4:name4:teste3:numi7ee";
        let value = Value::decode(data).unwrap();

        assert_eq!(value.get("announce").and_then(Value::as_str), Some("test.com:"));
        assert_eq!(value.get("num").and_then(Value::as_integer), Some(7));
        assert_eq!(value.encode(), data.to_vec());
    }

    #[test]
    fn test_decode_preserves_every_value_kind() {
        let value = Value::decode(b"l3:abci-9eld1:kleeee").unwrap();

        let mut dict = Value::dict();
        dict.insert("k", Value::List(Vec::new()));
        assert_eq!(
            value,
            Value::List(vec![
                Value::string("abc"),
                Value::Integer(-9),
                Value::List(vec![dict]),
            ])
        );
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(Value::decode(b"").is_err());
    }

    #[test]
    fn test_info_dict_span_finds_info() {
        let data = b"d8:announce3:url4:infod4:name1:xe7:comment2:hie";
        let span = info_dict_span(data).unwrap();
        assert_eq!(&data[span], b"d4:name1:xe");
    }

    #[test]
    fn test_info_dict_span_ignores_info_inside_strings() {
        let data = b"d7:comment6:4:info4:infod1:ai1eee";
        let span = info_dict_span(data).unwrap();
        assert_eq!(&data[span], b"d1:ai1ee");
    }

    #[test]
    fn test_info_dict_span_errors() {
        assert!(info_dict_span(b"l4:teste").is_err());
        assert!(info_dict_span(b"d3:keyi1ee").is_err());
        assert!(info_dict_span(b"d4:infod3:key").is_err());
        assert!(info_dict_span(b"d4:info999:x").is_err());
    }

    proptest! {
        #[test]
        fn prop_encoding_ignores_insertion_order(keys in proptest::collection::btree_set("[a-z ]{1,12}", 1..16)) {
            let keys: Vec<String> = keys.into_iter().collect();

            let mut forward = Value::dict();
            for key in &keys {
                forward.insert(key, Value::string(key));
            }
            let mut reversed = Value::dict();
            for key in keys.iter().rev() {
                reversed.insert(key, Value::string(key));
            }

            prop_assert_eq!(forward.encode(), reversed.encode());
        }

        #[test]
        fn prop_encoded_dictionary_roundtrips(entries in proptest::collection::btree_map("[a-z]{1,8}", -1_000_000i64..1_000_000_000_000i64, 0..12)) {
            let mut dict = Value::dict();
            for (key, value) in &entries {
                dict.insert(key, Value::Integer(*value));
            }

            let encoded = dict.encode();
            prop_assert_eq!(Value::decode(&encoded).unwrap(), dict);
        }
    }
}
