//! Literal values for constant arguments.
//!
//! Constant arguments are shipped to the worker as JSON shaped by their
//! declared type, so both runtimes can rebuild the same value:
//!
//! | Declared type            | JSON form                         |
//! |--------------------------|-----------------------------------|
//! | integral, date, timestamp| number                            |
//! | float, double            | number (finite only)              |
//! | decimal                  | string, e.g. `"12.50"`            |
//! | binary                   | array of byte numbers             |
//! | array                    | array                             |
//! | map                      | array of `[key, value]` pairs     |
//! | struct                   | object keyed by field name        |
//! | any, when null           | `null`                            |

use crate::error::SerializationError;
use crate::types::DataType;
use bytes::Bytes;
use serde_json::{Map, Number, Value};

/// A constant value produced by folding an argument expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Decimal in its canonical textual form.
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Array(Vec<Literal>),
    Map(Vec<(Literal, Literal)>),
    /// Field values in schema order.
    Struct(Vec<Literal>),
}

impl Literal {
    /// Serializes the value for the wire, checking it against `data_type`.
    pub fn encode(&self, data_type: &DataType) -> Result<Bytes, SerializationError> {
        let value = self.to_wire_json(data_type)?;
        Ok(Bytes::from(serde_json::to_vec(&value)?))
    }

    /// Parses a value previously produced by [`Literal::encode`].
    pub fn decode(data: &[u8], data_type: &DataType) -> Result<Self, SerializationError> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_wire_json(&value, data_type)
    }

    pub fn to_wire_json(&self, data_type: &DataType) -> Result<Value, SerializationError> {
        let value = match (self, data_type) {
            (Literal::Null, _) => Value::Null,
            (Literal::Boolean(b), DataType::Boolean) => Value::Bool(*b),
            (Literal::Integer(i), integral) if is_integral(integral) => {
                check_range(*i, integral)?;
                Value::from(*i)
            }
            (Literal::Float(f), DataType::Float | DataType::Double) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(SerializationError::NonFinite(*f))?,
            (Literal::Decimal(d), DataType::Decimal { .. }) => {
                if !is_decimal_text(d) {
                    return Err(SerializationError::mismatch(data_type, self));
                }
                Value::from(d.clone())
            }
            (Literal::String(s), DataType::String) => Value::from(s.clone()),
            (Literal::Binary(b), DataType::Binary) => {
                Value::Array(b.iter().map(|byte| Value::from(*byte)).collect())
            }
            (Literal::Date(d), DataType::Date) => Value::from(*d),
            (Literal::Timestamp(t), DataType::Timestamp | DataType::TimestampNtz) => {
                Value::from(*t)
            }
            (
                Literal::Array(items),
                DataType::Array {
                    element_type,
                    contains_null,
                },
            ) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if *item == Literal::Null && !contains_null {
                        return Err(SerializationError::mismatch(data_type, item));
                    }
                    out.push(item.to_wire_json(element_type)?);
                }
                Value::Array(out)
            }
            (
                Literal::Map(entries),
                DataType::Map {
                    key_type,
                    value_type,
                    value_contains_null,
                },
            ) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    if *key == Literal::Null || (*value == Literal::Null && !value_contains_null) {
                        return Err(SerializationError::mismatch(data_type, (key, value)));
                    }
                    out.push(Value::Array(vec![
                        key.to_wire_json(key_type)?,
                        value.to_wire_json(value_type)?,
                    ]));
                }
                Value::Array(out)
            }
            (Literal::Struct(values), DataType::Struct(st)) => {
                if values.len() != st.fields.len() {
                    return Err(SerializationError::mismatch(data_type, self));
                }
                let mut out = Map::new();
                for (field, value) in st.fields.iter().zip(values) {
                    if *value == Literal::Null && !field.nullable {
                        return Err(SerializationError::mismatch(&field.data_type, value));
                    }
                    out.insert(field.name.clone(), value.to_wire_json(&field.data_type)?);
                }
                Value::Object(out)
            }
            _ => return Err(SerializationError::mismatch(data_type, self)),
        };
        Ok(value)
    }

    pub fn from_wire_json(value: &Value, data_type: &DataType) -> Result<Self, SerializationError> {
        let mismatch = || SerializationError::mismatch(data_type, value);
        let literal = match (value, data_type) {
            (Value::Null, _) => Literal::Null,
            (Value::Bool(b), DataType::Boolean) => Literal::Boolean(*b),
            (Value::Number(n), integral) if is_integral(integral) => {
                let i = n.as_i64().ok_or_else(mismatch)?;
                check_range(i, integral)?;
                Literal::Integer(i)
            }
            (Value::Number(n), DataType::Float | DataType::Double) => {
                Literal::Float(n.as_f64().ok_or_else(mismatch)?)
            }
            (Value::String(s), DataType::Decimal { .. }) if is_decimal_text(s) => {
                Literal::Decimal(s.clone())
            }
            (Value::String(s), DataType::String) => Literal::String(s.clone()),
            (Value::Array(items), DataType::Binary) => Literal::Binary(
                items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(mismatch)?,
            ),
            (Value::Number(n), DataType::Date) => Literal::Date(
                n.as_i64()
                    .and_then(|d| i32::try_from(d).ok())
                    .ok_or_else(mismatch)?,
            ),
            (Value::Number(n), DataType::Timestamp | DataType::TimestampNtz) => {
                Literal::Timestamp(n.as_i64().ok_or_else(mismatch)?)
            }
            (Value::Array(items), DataType::Array { element_type, .. }) => Literal::Array(
                items
                    .iter()
                    .map(|item| Self::from_wire_json(item, element_type))
                    .collect::<Result<_, _>>()?,
            ),
            (
                Value::Array(pairs),
                DataType::Map {
                    key_type,
                    value_type,
                    ..
                },
            ) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    match pair.as_array().map(Vec::as_slice) {
                        Some([k, v]) => entries.push((
                            Self::from_wire_json(k, key_type)?,
                            Self::from_wire_json(v, value_type)?,
                        )),
                        _ => return Err(mismatch()),
                    }
                }
                Literal::Map(entries)
            }
            (Value::Object(obj), DataType::Struct(st)) => {
                let mut values = Vec::with_capacity(st.fields.len());
                for field in &st.fields {
                    let v = obj.get(&field.name).unwrap_or(&Value::Null);
                    values.push(Self::from_wire_json(v, &field.data_type)?);
                }
                Literal::Struct(values)
            }
            _ => return Err(mismatch()),
        };
        Ok(literal)
    }
}

fn is_integral(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Byte | DataType::Short | DataType::Integer | DataType::Long
    )
}

fn check_range(value: i64, data_type: &DataType) -> Result<(), SerializationError> {
    let (min, max) = match data_type {
        DataType::Byte => (i8::MIN as i64, i8::MAX as i64),
        DataType::Short => (i16::MIN as i64, i16::MAX as i64),
        DataType::Integer => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    };
    if value < min || value > max {
        return Err(SerializationError::mismatch(data_type, value));
    }
    Ok(())
}

fn is_decimal_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value as i64)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructType;
    use proptest::prelude::*;

    #[test]
    fn test_integer_wire_form() {
        let bytes = Literal::Integer(42).encode(&DataType::Integer).unwrap();
        assert_eq!(&bytes[..], b"42");
    }

    #[test]
    fn test_integer_range_checked() {
        assert!(Literal::Integer(200).encode(&DataType::Byte).is_err());
        assert!(Literal::Integer(-128).encode(&DataType::Byte).is_ok());
        assert!(Literal::Integer(i64::from(i32::MAX) + 1)
            .encode(&DataType::Integer)
            .is_err());
        assert!(Literal::Integer(i64::MAX).encode(&DataType::Long).is_ok());
    }

    #[test]
    fn test_type_mismatch() {
        let err = Literal::String("x".into())
            .encode(&DataType::Integer)
            .unwrap_err();
        assert!(matches!(err, SerializationError::TypeMismatch { .. }));

        let err = Literal::Integer(1).encode(&DataType::Double).unwrap_err();
        assert!(matches!(err, SerializationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let err = Literal::Float(f64::INFINITY)
            .encode(&DataType::Double)
            .unwrap_err();
        assert!(matches!(err, SerializationError::NonFinite(_)));
    }

    #[test]
    fn test_double_roundtrip() {
        for f in [0.0, -1.5, 0.25, 1024.0] {
            let bytes = Literal::Float(f).encode(&DataType::Double).unwrap();
            assert_eq!(
                Literal::decode(&bytes, &DataType::Double).unwrap(),
                Literal::Float(f)
            );
        }
    }

    #[test]
    fn test_decimal_text() {
        let ty = DataType::Decimal {
            precision: 10,
            scale: 2,
        };
        assert!(Literal::Decimal("-12.50".into()).encode(&ty).is_ok());
        assert!(Literal::Decimal("12.".into()).encode(&ty).is_err());
        assert!(Literal::Decimal("1e5".into()).encode(&ty).is_err());
    }

    #[test]
    fn test_null_allowed_for_any_type() {
        let bytes = Literal::Null.encode(&DataType::String).unwrap();
        assert_eq!(&bytes[..], b"null");
    }

    #[test]
    fn test_non_nullable_array_element() {
        let ty = DataType::array(DataType::Integer, false);
        let value = Literal::Array(vec![Literal::Integer(1), Literal::Null]);
        assert!(value.encode(&ty).is_err());
    }

    #[test]
    fn test_nested_roundtrip() {
        let ty = DataType::Struct(
            StructType::default()
                .add("id", DataType::Long, false)
                .add("tags", DataType::array(DataType::String, true), true)
                .add("props", DataType::map(DataType::Integer, DataType::Binary, true), true),
        );
        let value = Literal::Struct(vec![
            Literal::Integer(7),
            Literal::Array(vec!["a".into(), Literal::Null]),
            Literal::Map(vec![(Literal::Integer(1), Literal::Binary(vec![0, 255]))]),
        ]);

        let bytes = value.encode(&ty).unwrap();
        let back = Literal::decode(&bytes, &ty).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_struct_arity_checked() {
        let ty = DataType::Struct(StructType::default().add("a", DataType::Integer, true));
        let value = Literal::Struct(vec![Literal::Integer(1), Literal::Integer(2)]);
        assert!(value.encode(&ty).is_err());
    }

    proptest! {
        #[test]
        fn prop_long_roundtrip(v in any::<i64>()) {
            let bytes = Literal::Integer(v).encode(&DataType::Long).unwrap();
            prop_assert_eq!(Literal::decode(&bytes, &DataType::Long).unwrap(), Literal::Integer(v));
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            let value = Literal::String(s);
            let bytes = value.encode(&DataType::String).unwrap();
            prop_assert_eq!(Literal::decode(&bytes, &DataType::String).unwrap(), value);
        }
    }
}
