//! rencode: the structured binary encoding spoken by the Deluge daemon.
//!
//! Small values get single-byte type codes that embed the value or length
//! directly; everything else uses a type code followed by a fixed-width
//! big-endian body or a terminator-delimited sequence.
//!
//! ```text
//!   0..=43    positive fixed int        102..=126  fixed dict (n < 25 pairs)
//!   44        float64                   127        terminator
//!   '0'..'9'  "<len>:<bytes>" string    128..=191  fixed string (n < 64 bytes)
//!   59 / 60   list / dict (terminated)  192..=255  fixed list (n < 64 items)
//!   61        decimal int (terminated)
//!   62..=65   int8 / int16 / int32 / int64
//!   66        float32
//!   67 68 69  true / false / none
//!   70..=101  negative fixed int (-1..=-32)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use bytes::BufMut;

use crate::error::{FrameError, Result};

const CHR_LIST: u8 = 59;
const CHR_DICT: u8 = 60;
const CHR_INT: u8 = 61;
const CHR_INT1: u8 = 62;
const CHR_INT2: u8 = 63;
const CHR_INT4: u8 = 64;
const CHR_INT8: u8 = 65;
const CHR_FLOAT32: u8 = 66;
const CHR_FLOAT64: u8 = 44;
const CHR_TRUE: u8 = 67;
const CHR_FALSE: u8 = 68;
const CHR_NONE: u8 = 69;
const CHR_TERM: u8 = 127;

const INT_POS_FIXED_START: u8 = 0;
const INT_POS_FIXED_COUNT: u8 = 44;
const INT_NEG_FIXED_START: u8 = 70;
const INT_NEG_FIXED_COUNT: u8 = 32;
const DICT_FIXED_START: u8 = 102;
const DICT_FIXED_COUNT: u8 = 25;
const STR_FIXED_START: u8 = 128;
const STR_FIXED_COUNT: u8 = 64;
const LIST_FIXED_START: u8 = STR_FIXED_START + STR_FIXED_COUNT;
const LIST_FIXED_COUNT: u8 = 64;

/// Longest accepted decimal literal (string length or big integer).
const MAX_LITERAL_DIGITS: usize = 20;

/// Maximum container nesting accepted by [`decode`].
pub const MAX_DEPTH: usize = 128;

/// A rencode value.
///
/// Tuples and lists share one wire representation and both decode as
/// [`Value::List`]. Strings decode as [`Value::Str`] when they are valid
/// UTF-8 and as [`Value::Bytes`] otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Dict(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Bytes(bytes) => write!(f, "b{:?}", String::from_utf8_lossy(bytes)),
            Value::Str(text) => write!(f, "{text:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Dict(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// How floats are written on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FloatWidth {
    /// Four bytes (code 66). The daemon's own encoder writes floats this way.
    #[default]
    F32,
    /// Eight bytes (code 44), keeping full `f64` precision.
    F64,
}

/// Encode a value, writing floats as float32 like the daemon does.
pub fn encode(value: &Value) -> Vec<u8> {
    encode_with(value, FloatWidth::default())
}

/// Encode a value with an explicit float width.
pub fn encode_with(value: &Value, floats: FloatWidth) -> Vec<u8> {
    let mut dst = Vec::with_capacity(64);
    encode_into_with(value, floats, &mut dst);
    dst
}

/// Encode a value, appending to `dst`.
pub fn encode_into(value: &Value, dst: &mut impl BufMut) {
    encode_into_with(value, FloatWidth::default(), dst)
}

/// Encode a value with an explicit float width, appending to `dst`.
pub fn encode_into_with(value: &Value, floats: FloatWidth, dst: &mut impl BufMut) {
    match value {
        Value::None => dst.put_u8(CHR_NONE),
        Value::Bool(true) => dst.put_u8(CHR_TRUE),
        Value::Bool(false) => dst.put_u8(CHR_FALSE),
        Value::Int(value) => encode_int(*value, dst),
        Value::Float(value) => match floats {
            FloatWidth::F32 => {
                dst.put_u8(CHR_FLOAT32);
                dst.put_f32(*value as f32);
            }
            FloatWidth::F64 => {
                dst.put_u8(CHR_FLOAT64);
                dst.put_f64(*value);
            }
        },
        Value::Bytes(bytes) => encode_str(bytes, dst),
        Value::Str(text) => encode_str(text.as_bytes(), dst),
        Value::List(items) => {
            if items.len() < LIST_FIXED_COUNT as usize {
                dst.put_u8(LIST_FIXED_START + items.len() as u8);
                for item in items {
                    encode_into_with(item, floats, dst);
                }
            } else {
                dst.put_u8(CHR_LIST);
                for item in items {
                    encode_into_with(item, floats, dst);
                }
                dst.put_u8(CHR_TERM);
            }
        }
        Value::Dict(map) => {
            let fixed = map.len() < DICT_FIXED_COUNT as usize;
            if fixed {
                dst.put_u8(DICT_FIXED_START + map.len() as u8);
            } else {
                dst.put_u8(CHR_DICT);
            }
            for (key, item) in map {
                encode_str(key.as_bytes(), dst);
                encode_into_with(item, floats, dst);
            }
            if !fixed {
                dst.put_u8(CHR_TERM);
            }
        }
    }
}

fn encode_int(value: i64, dst: &mut impl BufMut) {
    if (0..INT_POS_FIXED_COUNT as i64).contains(&value) {
        dst.put_u8(INT_POS_FIXED_START + value as u8);
    } else if (-(INT_NEG_FIXED_COUNT as i64)..0).contains(&value) {
        dst.put_u8((INT_NEG_FIXED_START as i64 - 1 - value) as u8);
    } else if let Ok(value) = i8::try_from(value) {
        dst.put_u8(CHR_INT1);
        dst.put_i8(value);
    } else if let Ok(value) = i16::try_from(value) {
        dst.put_u8(CHR_INT2);
        dst.put_i16(value);
    } else if let Ok(value) = i32::try_from(value) {
        dst.put_u8(CHR_INT4);
        dst.put_i32(value);
    } else {
        dst.put_u8(CHR_INT8);
        dst.put_i64(value);
    }
}

fn encode_str(bytes: &[u8], dst: &mut impl BufMut) {
    if bytes.len() < STR_FIXED_COUNT as usize {
        dst.put_u8(STR_FIXED_START + bytes.len() as u8);
    } else {
        dst.put_slice(bytes.len().to_string().as_bytes());
        dst.put_u8(b':');
    }
    dst.put_slice(bytes);
}

/// Decode exactly one value spanning all of `src`.
pub fn decode(src: &[u8]) -> Result<Value> {
    let mut decoder = Decoder { src, pos: 0 };
    let value = decoder.value(0)?;
    if decoder.pos != src.len() {
        return Err(FrameError::TrailingBytes {
            count: src.len() - decoder.pos,
        });
    }
    Ok(value)
}

struct Decoder<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(FrameError::TooDeep { max: MAX_DEPTH });
        }

        let offset = self.pos;
        let code = self.byte()?;
        let value = match code {
            CHR_NONE => Value::None,
            CHR_TRUE => Value::Bool(true),
            CHR_FALSE => Value::Bool(false),
            CHR_INT1 => Value::Int(i8::from_be_bytes(self.array()?).into()),
            CHR_INT2 => Value::Int(i16::from_be_bytes(self.array()?).into()),
            CHR_INT4 => Value::Int(i32::from_be_bytes(self.array()?).into()),
            CHR_INT8 => Value::Int(i64::from_be_bytes(self.array()?)),
            CHR_INT => Value::Int(self.decimal_int()?),
            CHR_FLOAT32 => Value::Float(f32::from_be_bytes(self.array()?).into()),
            CHR_FLOAT64 => Value::Float(f64::from_be_bytes(self.array()?)),
            b'0'..=b'9' => {
                self.pos = offset;
                let len = self.string_length()?;
                string_value(self.take(len)?)
            }
            CHR_LIST => {
                let mut items = Vec::new();
                while !self.eat_terminator()? {
                    items.push(self.value(depth + 1)?);
                }
                Value::List(items)
            }
            CHR_DICT => {
                let mut map = BTreeMap::new();
                while !self.eat_terminator()? {
                    let (key, item) = self.entry(depth)?;
                    map.insert(key, item);
                }
                Value::Dict(map)
            }
            code if code < INT_POS_FIXED_START + INT_POS_FIXED_COUNT => Value::Int(code.into()),
            code if (INT_NEG_FIXED_START..INT_NEG_FIXED_START + INT_NEG_FIXED_COUNT)
                .contains(&code) =>
            {
                Value::Int(INT_NEG_FIXED_START as i64 - 1 - code as i64)
            }
            code if (DICT_FIXED_START..DICT_FIXED_START + DICT_FIXED_COUNT).contains(&code) => {
                let mut map = BTreeMap::new();
                for _ in 0..code - DICT_FIXED_START {
                    let (key, item) = self.entry(depth)?;
                    map.insert(key, item);
                }
                Value::Dict(map)
            }
            code if (STR_FIXED_START..STR_FIXED_START + STR_FIXED_COUNT).contains(&code) => {
                string_value(self.take((code - STR_FIXED_START) as usize)?)
            }
            code if code >= LIST_FIXED_START => {
                let len = (code - LIST_FIXED_START) as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.value(depth + 1)?);
                }
                Value::List(items)
            }
            code => return Err(FrameError::InvalidTypeCode { code, offset }),
        };
        Ok(value)
    }

    fn entry(&mut self, depth: usize) -> Result<(String, Value)> {
        let offset = self.pos;
        let key = match self.value(depth + 1)? {
            Value::Str(key) => key,
            _ => return Err(FrameError::NonStringKey { offset }),
        };
        let item = self.value(depth + 1)?;
        Ok((key, item))
    }

    fn byte(&mut self) -> Result<u8> {
        let byte = *self
            .src
            .get(self.pos)
            .ok_or(FrameError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.src.len())
            .ok_or(FrameError::Truncated { offset: self.pos })?;
        let bytes = &self.src[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let offset = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_| FrameError::Truncated { offset })
    }

    fn eat_terminator(&mut self) -> Result<bool> {
        match self.src.get(self.pos) {
            Some(&CHR_TERM) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(FrameError::Truncated { offset: self.pos }),
        }
    }

    /// Read the digits of a literal up to (and consuming) `delimiter`.
    fn literal(&mut self, delimiter: u8) -> Result<&str> {
        let start = self.pos;
        let rel = self.src[start..]
            .iter()
            .take(MAX_LITERAL_DIGITS + 1)
            .position(|b| *b == delimiter);
        let Some(rel) = rel else {
            return if self.src.len() - start <= MAX_LITERAL_DIGITS {
                Err(FrameError::Truncated { offset: start })
            } else {
                Err(FrameError::InvalidLiteral {
                    offset: start,
                    reason: "literal too long",
                })
            };
        };
        self.pos = start + rel + 1;
        std::str::from_utf8(&self.src[start..start + rel]).map_err(|_| {
            FrameError::InvalidLiteral {
                offset: start,
                reason: "non-ascii digits",
            }
        })
    }

    fn string_length(&mut self) -> Result<usize> {
        let offset = self.pos;
        let digits = self.literal(b':')?;
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(FrameError::InvalidLiteral {
                offset,
                reason: "leading zero in string length",
            });
        }
        digits.parse().map_err(|_| FrameError::InvalidLiteral {
            offset,
            reason: "bad string length",
        })
    }

    fn decimal_int(&mut self) -> Result<i64> {
        let offset = self.pos;
        let digits = self.literal(CHR_TERM)?;
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty()
            || !unsigned.bytes().all(|b| b.is_ascii_digit())
            || (unsigned.starts_with('0') && (unsigned.len() > 1 || digits.starts_with('-')))
        {
            return Err(FrameError::InvalidLiteral {
                offset,
                reason: "bad integer literal",
            });
        }
        digits
            .parse()
            .map_err(|_| FrameError::IntegerOutOfRange { offset })
    }
}

fn string_value(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::Str(text.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, Value)]) -> Value {
        Value::Dict(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn small_ints_use_fixed_codes() {
        assert_eq!(encode(&Value::Int(0)), [0]);
        assert_eq!(encode(&Value::Int(43)), [43]);
        assert_eq!(encode(&Value::Int(-1)), [70]);
        assert_eq!(encode(&Value::Int(-32)), [101]);
    }

    #[test]
    fn ints_pick_the_narrowest_width() {
        assert_eq!(encode(&Value::Int(44)), [CHR_INT1, 44]);
        assert_eq!(encode(&Value::Int(-33)), [CHR_INT1, 0xdf]);
        assert_eq!(encode(&Value::Int(1000)), [CHR_INT2, 0x03, 0xe8]);
        assert_eq!(encode(&Value::Int(70_000)), [CHR_INT4, 0, 1, 0x11, 0x70]);
        assert_eq!(
            encode(&Value::Int(1 << 40)),
            [CHR_INT8, 0, 0, 1, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn ints_never_decode_as_floats() {
        for value in [0, 43, 44, -1, -32, -33, 127, -128, 40_000, -70_000, i64::MAX, i64::MIN] {
            assert_eq!(decode(&encode(&Value::Int(value))).unwrap(), Value::Int(value));
        }
    }

    #[test]
    fn strings_use_fixed_or_length_prefix() {
        assert_eq!(encode(&Value::from("abc")), [131, b'a', b'b', b'c']);

        let long = "x".repeat(64);
        let wire = encode(&Value::from(long.as_str()));
        assert_eq!(&wire[..3], b"64:");
        assert_eq!(decode(&wire).unwrap(), Value::Str(long));
    }

    #[test]
    fn non_utf8_strings_decode_as_bytes() {
        let raw = vec![0xff, 0xfe, 0x00];
        assert_eq!(
            decode(&encode(&Value::Bytes(raw.clone()))).unwrap(),
            Value::Bytes(raw)
        );
    }

    #[test]
    fn deluge_request_envelope_bytes() {
        // ((0, "daemon.info", (), {}),)
        let request = Value::List(vec![Value::List(vec![
            Value::Int(0),
            Value::from("daemon.info"),
            Value::List(vec![]),
            Value::Dict(BTreeMap::new()),
        ])]);
        let mut expected = vec![193, 196, 0, 128 + 11];
        expected.extend_from_slice(b"daemon.info");
        expected.extend_from_slice(&[192, 102]);
        assert_eq!(encode(&request), expected);
    }

    #[test]
    fn large_containers_use_terminated_form() {
        let items: Vec<Value> = (0..100).map(Value::Int).collect();
        let wire = encode(&Value::List(items.clone()));
        assert_eq!(wire[0], CHR_LIST);
        assert_eq!(*wire.last().unwrap(), CHR_TERM);
        assert_eq!(decode(&wire).unwrap(), Value::List(items));

        let map: BTreeMap<String, Value> =
            (0..30).map(|i| (format!("k{i}"), Value::Int(i))).collect();
        let wire = encode(&Value::Dict(map.clone()));
        assert_eq!(wire[0], CHR_DICT);
        assert_eq!(decode(&wire).unwrap(), Value::Dict(map));
    }

    #[test]
    fn nested_structures_round_trip() {
        let value = Value::List(vec![
            Value::Int(1),
            Value::Int(0),
            Value::List(vec![dict(&[
                ("id", Value::from("abc")),
                ("progress", Value::Float(42.5)),
                ("paused", Value::Bool(false)),
                ("label", Value::None),
            ])]),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn floats_encode_as_float32_unless_asked_otherwise() {
        let value = Value::Float(1.5);
        let mut expected = vec![CHR_FLOAT32];
        expected.extend_from_slice(&1.5f32.to_be_bytes());
        assert_eq!(encode(&value), expected);

        let precise = Value::Float(0.1);
        let wire = encode_with(&precise, FloatWidth::F64);
        assert_eq!(wire[0], CHR_FLOAT64);
        assert_eq!(decode(&wire).unwrap(), precise);
        assert_eq!(
            decode(&encode(&precise)).unwrap(),
            Value::Float(f64::from(0.1f32))
        );
    }

    #[test]
    fn decodes_float32_and_big_int_literals() {
        let mut wire = vec![CHR_FLOAT32];
        wire.extend_from_slice(&1.5f32.to_be_bytes());
        assert_eq!(decode(&wire).unwrap(), Value::Float(1.5));

        let mut wire = vec![CHR_INT];
        wire.extend_from_slice(b"-123456");
        wire.push(CHR_TERM);
        assert_eq!(decode(&wire).unwrap(), Value::Int(-123_456));
    }

    #[test]
    fn big_int_outside_i64_is_rejected() {
        let mut wire = vec![CHR_INT];
        wire.extend_from_slice(b"99999999999999999999");
        wire.push(CHR_TERM);
        assert!(matches!(
            decode(&wire),
            Err(FrameError::IntegerOutOfRange { .. })
        ));
    }

    #[test]
    fn malformed_literals_are_rejected() {
        for body in [&b"007"[..], b"-0", b"", b"1-2"] {
            let mut wire = vec![CHR_INT];
            wire.extend_from_slice(body);
            wire.push(CHR_TERM);
            assert!(
                matches!(decode(&wire), Err(FrameError::InvalidLiteral { .. })),
                "accepted {body:?}"
            );
        }
        assert!(matches!(
            decode(b"01:a"),
            Err(FrameError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn truncated_input_is_reported() {
        let wire = encode(&Value::from("hello"));
        assert!(matches!(
            decode(&wire[..3]),
            Err(FrameError::Truncated { .. })
        ));
        assert!(matches!(
            decode(&[CHR_LIST, 1, 2]),
            Err(FrameError::Truncated { .. })
        ));
        assert!(matches!(decode(b"12:abc"), Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            decode(&[1, 2]),
            Err(FrameError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn unused_codes_are_invalid() {
        for code in [45u8, 46, 47, CHR_TERM] {
            assert!(matches!(
                decode(&[code]),
                Err(FrameError::InvalidTypeCode { .. })
            ));
        }
    }

    #[test]
    fn dict_keys_must_be_strings() {
        let wire = [DICT_FIXED_START + 1, 5, 6];
        assert!(matches!(
            decode(&wire),
            Err(FrameError::NonStringKey { offset: 1 })
        ));
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let wire = vec![LIST_FIXED_START + 1; MAX_DEPTH + 2];
        assert!(matches!(decode(&wire), Err(FrameError::TooDeep { .. })));
    }

    #[test]
    fn display_is_readable() {
        let value = Value::List(vec![
            Value::from("InvalidURL"),
            Value::Int(3),
            Value::Bool(true),
            Value::None,
        ]);
        assert_eq!(value.to_string(), r#"["InvalidURL", 3, True, None]"#);
    }
}
