//! Autopack: derive a wire layout from field values and serialise them.
//!
//! Every packet type declares an ordered [`Schema`] of `(name, kind)`
//! pairs. When a packet is sent without a hand-written encoder, the
//! values it produces are matched against that schema and each one is
//! given the narrowest format that holds it:
//!
//! | value | format | descriptor |
//! |---|---|---|
//! | integer | smallest of i16 / i32 / i64 | `h` / `i` / `q` |
//! | float | f64 | `d` |
//! | text | one byte per UTF-8 byte | `{n}s` |
//! | bytes | one byte per element | `{n}c` |
//! | bool | one byte | `?` |
//!
//! The descriptor is prefixed with `!` (network byte order). Because the
//! integer width and the text/bytes lengths depend on the value, the
//! layout is recomputed for every packet instance; it is not a reusable
//! schema for decoding.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::{AutopackError, PacketId, SchemaError};

/// Byte-order marker that starts every descriptor.
pub const NETWORK_ORDER: char = '!';

/// The kind of value a schema field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    Float,
    Text,
    Bytes,
    Bool,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Bytes => "bytes",
            FieldKind::Bool => "bool",
        }
    }
}

/// One declared field of a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn bytes(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bytes)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Hidden fields are declared but never encoded: names starting with
    /// `_` (internal state) and `id` in any case (already in the header).
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('_') || self.name.eq_ignore_ascii_case("id")
    }
}

/// A runtime field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    /// Structured values have no autopack representation.
    List(Vec<Value>),
    Null,
}

impl Value {
    /// Name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Null => "null",
        }
    }

    fn field_kind(&self) -> Option<FieldKind> {
        match self {
            Value::Int(_) => Some(FieldKind::Int),
            Value::Float(_) => Some(FieldKind::Float),
            Value::Text(_) => Some(FieldKind::Text),
            Value::Bytes(_) => Some(FieldKind::Bytes),
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::List(_) | Value::Null => None,
        }
    }
}

macro_rules! int_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i128::from(v))
            }
        })*
    };
}

int_value_from!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// The wire format chosen for a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    I16,
    I32,
    I64,
    F64,
    Chars(usize),
    Bytes(usize),
    Bool,
}

impl Format {
    /// Number of bytes this format occupies on the wire.
    pub fn size(self) -> usize {
        match self {
            Format::I16 => 2,
            Format::I32 => 4,
            Format::I64 | Format::F64 => 8,
            Format::Chars(n) | Format::Bytes(n) => n,
            Format::Bool => 1,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::I16 => f.write_str("h"),
            Format::I32 => f.write_str("i"),
            Format::I64 => f.write_str("q"),
            Format::F64 => f.write_str("d"),
            Format::Chars(n) => write!(f, "{n}s"),
            Format::Bytes(n) => write!(f, "{n}c"),
            Format::Bool => f.write_str("?"),
        }
    }
}

/// Picks the narrowest signed width for `value`.
pub fn infer_int_format(value: i128) -> Result<Format, AutopackError> {
    if i16::try_from(value).is_ok() {
        Ok(Format::I16)
    } else if i32::try_from(value).is_ok() {
        Ok(Format::I32)
    } else if i64::try_from(value).is_ok() {
        Ok(Format::I64)
    } else {
        Err(AutopackError::Overflow(value))
    }
}

/// Picks the format for one value.
pub fn infer_format(value: &Value) -> Result<Format, AutopackError> {
    match value {
        Value::Int(v) => infer_int_format(*v),
        Value::Float(_) => Ok(Format::F64),
        Value::Text(s) => Ok(Format::Chars(s.len())),
        Value::Bytes(b) => Ok(Format::Bytes(b.len())),
        Value::Bool(_) => Ok(Format::Bool),
        other => Err(AutopackError::UnsupportedType(other.kind_name())),
    }
}

/// Result of an autopack run.
#[derive(Debug, Clone, PartialEq)]
pub struct Autopacked {
    /// Combined format descriptor, e.g. `!hd5s?`.
    pub descriptor: String,
    /// Serialised values, present when packing was requested.
    pub bytes: Option<Vec<u8>>,
}

/// Infers a layout for `values` in order and, if `pack` is set, serialises them.
pub fn autopack(values: &[Value], pack: bool) -> Result<Autopacked, AutopackError> {
    let formats = values
        .iter()
        .map(infer_format)
        .collect::<Result<Vec<_>, _>>()?;

    let descriptor = render_descriptor(&formats);
    if !pack {
        return Ok(Autopacked {
            descriptor,
            bytes: None,
        });
    }

    let values: Vec<&Value> = values.iter().collect();
    let bytes = write_values(&formats, &values)?;
    Ok(Autopacked {
        descriptor,
        bytes: Some(bytes),
    })
}

/// Descriptor for `values` without serialising them.
pub fn infer_descriptor(values: &[Value]) -> Result<String, AutopackError> {
    autopack(values, false).map(|a| a.descriptor)
}

/// Serialised bytes for `values`.
pub fn infer_pack(values: &[Value]) -> Result<Vec<u8>, AutopackError> {
    let formats = values
        .iter()
        .map(infer_format)
        .collect::<Result<Vec<_>, _>>()?;
    let values: Vec<&Value> = values.iter().collect();
    write_values(&formats, &values)
}

fn render_descriptor(formats: &[Format]) -> String {
    let mut out = String::with_capacity(1 + formats.len() * 2);
    out.push(NETWORK_ORDER);
    for format in formats {
        out.push_str(&format.to_string());
    }
    out
}

fn write_values(formats: &[Format], values: &[&Value]) -> Result<Vec<u8>, AutopackError> {
    let size = formats.iter().map(|f| f.size()).sum();
    let mut out = BytesMut::with_capacity(size);

    for (format, value) in formats.iter().zip(values) {
        match (format, value) {
            (Format::I16, Value::Int(v)) => {
                out.put_i16(i16::try_from(*v).map_err(|_| AutopackError::Overflow(*v))?);
            }
            (Format::I32, Value::Int(v)) => {
                out.put_i32(i32::try_from(*v).map_err(|_| AutopackError::Overflow(*v))?);
            }
            (Format::I64, Value::Int(v)) => {
                out.put_i64(i64::try_from(*v).map_err(|_| AutopackError::Overflow(*v))?);
            }
            (Format::F64, Value::Float(v)) => out.put_f64(*v),
            // Text and bytes are written element by element.
            (Format::Chars(_), Value::Text(s)) => {
                for b in s.bytes() {
                    out.put_u8(b);
                }
            }
            (Format::Bytes(_), Value::Bytes(bytes)) => {
                for b in bytes {
                    out.put_u8(*b);
                }
            }
            (Format::Bool, Value::Bool(b)) => out.put_u8(u8::from(*b)),
            (_, other) => return Err(AutopackError::UnsupportedType(other.kind_name())),
        }
    }

    Ok(out.to_vec())
}

/// The ordered field declaration of a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    /// A schema with no fields.
    pub const EMPTY: Schema = Schema { fields: &[] };

    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    /// All declared fields, hidden ones included.
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Fields that end up on the wire, in declaration order.
    pub fn wire_fields(&self) -> impl Iterator<Item = &'static Field> {
        self.fields.iter().filter(|f| !f.is_hidden())
    }

    /// Checks the declaration itself. Run once, at registration.
    pub fn validate(&self, id: PacketId) -> Result<(), SchemaError> {
        for (index, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(SchemaError::EmptyName { id, index });
            }
            if self.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    id,
                    field: field.name,
                });
            }
        }
        Ok(())
    }

    /// Matches `values` against the declaration and drops hidden fields.
    fn select<'v>(&self, values: &'v [Value]) -> Result<Vec<&'v Value>, AutopackError> {
        if values.len() != self.fields.len() {
            return Err(AutopackError::FieldCount {
                expected: self.fields.len(),
                found: values.len(),
            });
        }

        let mut selected = Vec::with_capacity(values.len());
        for (field, value) in self.fields.iter().zip(values) {
            if field.is_hidden() {
                tracing::trace!(field = field.name, "skipping hidden field");
                continue;
            }
            match value.field_kind() {
                None => return Err(AutopackError::UnsupportedType(value.kind_name())),
                Some(kind) if kind != field.kind => {
                    return Err(AutopackError::KindMismatch {
                        field: field.name,
                        expected: field.kind.name(),
                        found: value.kind_name(),
                    });
                }
                Some(_) => selected.push(value),
            }
        }
        Ok(selected)
    }

    /// Descriptor for one packet instance's values.
    pub fn descriptor(&self, values: &[Value]) -> Result<String, AutopackError> {
        let selected = self.select(values)?;
        let formats = selected
            .iter()
            .map(|v| infer_format(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(render_descriptor(&formats))
    }

    /// Serialises one packet instance's values.
    pub fn pack(&self, values: &[Value]) -> Result<Vec<u8>, AutopackError> {
        let selected = self.select(values)?;
        let formats = selected
            .iter()
            .map(|v| infer_format(v))
            .collect::<Result<Vec<_>, _>>()?;
        write_values(&formats, &selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVE: Schema = Schema::new(&[
        Field::int("id"),
        Field::int("x"),
        Field::float("speed"),
        Field::text("name"),
        Field::bool("running"),
        Field::bytes("_cache"),
    ]);

    #[test]
    fn test_int_width_boundaries() {
        assert_eq!(infer_int_format(0).unwrap(), Format::I16);
        assert_eq!(infer_int_format(32_767).unwrap(), Format::I16);
        assert_eq!(infer_int_format(-32_768).unwrap(), Format::I16);
        assert_eq!(infer_int_format(32_768).unwrap(), Format::I32);
        assert_eq!(infer_int_format(40_000).unwrap(), Format::I32);
        assert_eq!(infer_int_format(i32::MIN as i128).unwrap(), Format::I32);
        assert_eq!(infer_int_format(i32::MAX as i128 + 1).unwrap(), Format::I64);
        assert_eq!(infer_int_format(i64::MIN as i128).unwrap(), Format::I64);
    }

    #[test]
    fn test_int_overflow() {
        let big = 1i128 << 70;
        assert_eq!(infer_int_format(big), Err(AutopackError::Overflow(big)));
        assert_eq!(
            infer_int_format(i64::MAX as i128 + 1),
            Err(AutopackError::Overflow(i64::MAX as i128 + 1))
        );
    }

    #[test]
    fn test_descriptor_per_kind() {
        let values = vec![
            Value::from(5),
            Value::from(40_000),
            Value::from(1.5),
            Value::from("hello"),
            Value::from(vec![1u8, 2, 3]),
            Value::from(true),
        ];
        assert_eq!(infer_descriptor(&values).unwrap(), "!hid5s3c?");
    }

    #[test]
    fn test_text_length_is_byte_length() {
        assert_eq!(infer_descriptor(&[Value::from("héllo")]).unwrap(), "!6s");
    }

    #[test]
    fn test_autopack_without_pack_returns_descriptor_only() {
        let out = autopack(&[Value::from(1)], false).unwrap();
        assert_eq!(out.descriptor, "!h");
        assert!(out.bytes.is_none());
    }

    #[test]
    fn test_pack_big_endian_layout() {
        let bytes = infer_pack(&[
            Value::from(1),
            Value::from(40_000),
            Value::from(true),
            Value::from("ab"),
        ])
        .unwrap();
        assert_eq!(
            bytes,
            vec![0x00, 0x01, 0x00, 0x00, 0x9c, 0x40, 0x01, b'a', b'b']
        );
    }

    #[test]
    fn test_pack_float_is_f64() {
        let bytes = infer_pack(&[Value::from(1.0f32)]).unwrap();
        assert_eq!(bytes, 1.0f64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_unsupported_kind() {
        let err = infer_descriptor(&[Value::from(1), Value::List(vec![])]).unwrap_err();
        assert_eq!(err, AutopackError::UnsupportedType("list"));
        let err = infer_pack(&[Value::Null]).unwrap_err();
        assert_eq!(err, AutopackError::UnsupportedType("null"));
    }

    #[test]
    fn test_schema_skips_hidden_fields() {
        let values = vec![
            Value::from(99),
            Value::from(3),
            Value::from(2.0),
            Value::from("bob"),
            Value::from(false),
            Value::from(vec![0xAAu8; 16]),
        ];
        assert_eq!(MOVE.descriptor(&values).unwrap(), "!hd3s?");

        let bytes = MOVE.pack(&values).unwrap();
        let mut expected = vec![0x00, 0x03];
        expected.extend_from_slice(&2.0f64.to_be_bytes());
        expected.extend_from_slice(b"bob");
        expected.push(0);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_id_is_hidden_in_any_case() {
        assert!(Field::int("ID").is_hidden());
        assert!(Field::int("Id").is_hidden());
        assert!(Field::int("_x").is_hidden());
        assert!(!Field::int("idx").is_hidden());
        assert_eq!(MOVE.wire_fields().count(), 4);
    }

    #[test]
    fn test_schema_field_count_mismatch() {
        let err = MOVE.pack(&[Value::from(1)]).unwrap_err();
        assert_eq!(err, AutopackError::FieldCount { expected: 6, found: 1 });
    }

    #[test]
    fn test_schema_kind_mismatch() {
        const S: Schema = Schema::new(&[Field::int("count")]);
        let err = S.pack(&[Value::from("three")]).unwrap_err();
        assert_eq!(
            err,
            AutopackError::KindMismatch {
                field: "count",
                expected: "int",
                found: "text",
            }
        );
    }

    #[test]
    fn test_schema_overflow_does_not_poison_next_call() {
        const S: Schema = Schema::new(&[Field::int("n")]);
        assert!(matches!(
            S.pack(&[Value::Int(1 << 70)]),
            Err(AutopackError::Overflow(_))
        ));
        assert_eq!(S.pack(&[Value::from(7)]).unwrap(), vec![0, 7]);
    }

    #[test]
    fn test_schema_validate() {
        const DUP: Schema = Schema::new(&[Field::int("a"), Field::text("a")]);
        const EMPTY_NAME: Schema = Schema::new(&[Field::int("")]);
        assert_eq!(
            DUP.validate(PacketId(3)),
            Err(SchemaError::DuplicateField { id: PacketId(3), field: "a" })
        );
        assert_eq!(
            EMPTY_NAME.validate(PacketId(3)),
            Err(SchemaError::EmptyName { id: PacketId(3), index: 0 })
        );
        assert!(MOVE.validate(PacketId(1)).is_ok());
        assert!(Schema::EMPTY.validate(PacketId(1)).is_ok());
    }
}
