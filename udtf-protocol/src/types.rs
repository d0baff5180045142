//! Portable type descriptors.
//!
//! Argument types and result schemas travel as self-describing JSON rather
//! than a binary layout. Atomic types are plain strings (`"integer"`,
//! `"decimal(10,2)"`); nested types are objects tagged by `"type"`:
//!
//! ```json
//! {"type":"struct","fields":[
//!   {"name":"id","type":"long","nullable":false,"metadata":{}},
//!   {"name":"tags","type":{"type":"array","elementType":"string","containsNull":true},
//!    "nullable":true,"metadata":{}}
//! ]}
//! ```

use crate::error::ProtocolError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

/// Default precision for a bare `decimal`.
pub const DEFAULT_DECIMAL_PRECISION: u8 = 10;

/// Maximum supported decimal precision.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// A structured type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Null,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    String,
    Binary,
    /// Days since the Unix epoch.
    Date,
    /// Microseconds since the Unix epoch, session time zone.
    Timestamp,
    /// Microseconds since the Unix epoch, no time zone.
    TimestampNtz,
    Array {
        element_type: Box<DataType>,
        contains_null: bool,
    },
    Map {
        key_type: Box<DataType>,
        value_type: Box<DataType>,
        value_contains_null: bool,
    },
    Struct(StructType),
}

/// One named column of a [`StructType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub metadata: Map<String, Value>,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An ordered list of named, typed fields. Analysis results are always
/// struct schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new(fields: Vec<StructField>) -> Self {
        Self { fields }
    }

    /// Appends a field (builder style).
    pub fn add(mut self, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        self.fields.push(StructField::new(name, data_type, nullable));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Serializes the schema as a JSON type descriptor.
    pub fn json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Parses a JSON type descriptor that must describe a struct.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        match DataType::from_json(s)? {
            DataType::Struct(st) => Ok(st),
            other => Err(ProtocolError::NotAStruct(other.simple_string())),
        }
    }

    fn to_json_value(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "type": f.data_type.to_json_value(),
                    "nullable": f.nullable,
                    "metadata": Value::Object(f.metadata.clone()),
                })
            })
            .collect();
        json!({ "type": "struct", "fields": fields })
    }

    fn from_json_map(obj: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let fields = obj
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("struct without 'fields' array"))?;

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let field = field
                .as_object()
                .ok_or_else(|| malformed("struct field is not an object"))?;
            let name = field
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("struct field without 'name'"))?;
            let data_type = DataType::from_json_value(
                field
                    .get("type")
                    .ok_or_else(|| malformed("struct field without 'type'"))?,
            )?;
            let nullable = optional_bool(field, "nullable")?;
            let metadata = match field.get("metadata") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(m)) => m.clone(),
                Some(_) => return Err(malformed("field metadata is not an object")),
            };
            out.push(StructField {
                name: name.to_string(),
                data_type,
                nullable,
                metadata,
            });
        }
        Ok(Self { fields: out })
    }
}

impl DataType {
    pub fn array(element_type: DataType, contains_null: bool) -> Self {
        DataType::Array {
            element_type: Box::new(element_type),
            contains_null,
        }
    }

    pub fn map(key_type: DataType, value_type: DataType, value_contains_null: bool) -> Self {
        DataType::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
            value_contains_null,
        }
    }

    /// Serializes the type as a compact JSON descriptor.
    pub fn json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Parses a JSON type descriptor.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json_value(&value)
    }

    pub fn to_json_value(&self) -> Value {
        match self {
            DataType::Null => Value::from("void"),
            DataType::Boolean => Value::from("boolean"),
            DataType::Byte => Value::from("byte"),
            DataType::Short => Value::from("short"),
            DataType::Integer => Value::from("integer"),
            DataType::Long => Value::from("long"),
            DataType::Float => Value::from("float"),
            DataType::Double => Value::from("double"),
            DataType::Decimal { precision, scale } => {
                Value::from(format!("decimal({},{})", precision, scale))
            }
            DataType::String => Value::from("string"),
            DataType::Binary => Value::from("binary"),
            DataType::Date => Value::from("date"),
            DataType::Timestamp => Value::from("timestamp"),
            DataType::TimestampNtz => Value::from("timestamp_ntz"),
            DataType::Array {
                element_type,
                contains_null,
            } => json!({
                "type": "array",
                "elementType": element_type.to_json_value(),
                "containsNull": contains_null,
            }),
            DataType::Map {
                key_type,
                value_type,
                value_contains_null,
            } => json!({
                "type": "map",
                "keyType": key_type.to_json_value(),
                "valueType": value_type.to_json_value(),
                "valueContainsNull": value_contains_null,
            }),
            DataType::Struct(st) => st.to_json_value(),
        }
    }

    pub fn from_json_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::String(name) => Self::from_type_name(name),
            Value::Object(obj) => {
                let tag = obj
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("object without 'type' tag"))?;
                match tag {
                    "struct" => Ok(DataType::Struct(StructType::from_json_map(obj)?)),
                    "array" => Ok(DataType::Array {
                        element_type: Box::new(Self::from_json_value(
                            obj.get("elementType")
                                .ok_or_else(|| malformed("array without 'elementType'"))?,
                        )?),
                        contains_null: optional_bool(obj, "containsNull")?,
                    }),
                    "map" => Ok(DataType::Map {
                        key_type: Box::new(Self::from_json_value(
                            obj.get("keyType")
                                .ok_or_else(|| malformed("map without 'keyType'"))?,
                        )?),
                        value_type: Box::new(Self::from_json_value(
                            obj.get("valueType")
                                .ok_or_else(|| malformed("map without 'valueType'"))?,
                        )?),
                        value_contains_null: optional_bool(obj, "valueContainsNull")?,
                    }),
                    other => Err(malformed(format!("unknown complex type '{}'", other))),
                }
            }
            other => Err(malformed(format!("unexpected JSON value {}", other))),
        }
    }

    fn from_type_name(name: &str) -> Result<Self, ProtocolError> {
        let ty = match name {
            "void" | "null" => DataType::Null,
            "boolean" => DataType::Boolean,
            "byte" => DataType::Byte,
            "short" => DataType::Short,
            "integer" => DataType::Integer,
            "long" => DataType::Long,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "string" => DataType::String,
            "binary" => DataType::Binary,
            "date" => DataType::Date,
            "timestamp" => DataType::Timestamp,
            "timestamp_ntz" => DataType::TimestampNtz,
            "decimal" => DataType::Decimal {
                precision: DEFAULT_DECIMAL_PRECISION,
                scale: 0,
            },
            other => return parse_decimal(other),
        };
        Ok(ty)
    }

    /// Short SQL-style rendering, e.g. `struct<a:int,b:array<string>>`.
    pub fn simple_string(&self) -> String {
        match self {
            DataType::Null => "void".to_string(),
            DataType::Boolean => "boolean".to_string(),
            DataType::Byte => "tinyint".to_string(),
            DataType::Short => "smallint".to_string(),
            DataType::Integer => "int".to_string(),
            DataType::Long => "bigint".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Decimal { precision, scale } => format!("decimal({},{})", precision, scale),
            DataType::String => "string".to_string(),
            DataType::Binary => "binary".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::TimestampNtz => "timestamp_ntz".to_string(),
            DataType::Array { element_type, .. } => {
                format!("array<{}>", element_type.simple_string())
            }
            DataType::Map {
                key_type,
                value_type,
                ..
            } => format!(
                "map<{},{}>",
                key_type.simple_string(),
                value_type.simple_string()
            ),
            DataType::Struct(st) => {
                let fields: Vec<String> = st
                    .fields
                    .iter()
                    .map(|f| format!("{}:{}", f.name, f.data_type.simple_string()))
                    .collect();
                format!("struct<{}>", fields.join(","))
            }
        }
    }
}

fn parse_decimal(name: &str) -> Result<DataType, ProtocolError> {
    let inner = name
        .strip_prefix("decimal(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| malformed(format!("unknown type '{}'", name)))?;
    let (precision, scale) = inner
        .split_once(',')
        .ok_or_else(|| malformed(format!("bad decimal '{}'", name)))?;
    let precision: u8 = precision
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad decimal precision in '{}'", name)))?;
    let scale: u8 = scale
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad decimal scale in '{}'", name)))?;
    if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
        return Err(malformed(format!("decimal out of range '{}'", name)));
    }
    Ok(DataType::Decimal { precision, scale })
}

fn optional_bool(obj: &Map<String, Value>, key: &str) -> Result<bool, ProtocolError> {
    match obj.get(key) {
        None => Ok(true),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(malformed(format!("'{}' is not a boolean", key))),
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedType(reason.into())
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.simple_string())
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DataType::from_json_value(&value).map_err(D::Error::custom)
    }
}

impl Serialize for StructType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StructType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DataType::deserialize(deserializer)? {
            DataType::Struct(st) => Ok(st),
            other => Err(D::Error::custom(ProtocolError::NotAStruct(
                other.simple_string(),
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn arb_data_type() -> impl Strategy<Value = DataType> {
        let leaf = prop_oneof![
            Just(DataType::Null),
            Just(DataType::Boolean),
            Just(DataType::Byte),
            Just(DataType::Short),
            Just(DataType::Integer),
            Just(DataType::Long),
            Just(DataType::Float),
            Just(DataType::Double),
            Just(DataType::String),
            Just(DataType::Binary),
            Just(DataType::Date),
            Just(DataType::Timestamp),
            Just(DataType::TimestampNtz),
            (1u8..=38)
                .prop_flat_map(|p| (Just(p), 0..=p))
                .prop_map(|(precision, scale)| DataType::Decimal { precision, scale }),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (inner.clone(), any::<bool>()).prop_map(|(e, n)| DataType::array(e, n)),
                (inner.clone(), inner.clone(), any::<bool>())
                    .prop_map(|(k, v, n)| DataType::map(k, v, n)),
                proptest::collection::vec(("[a-z_][a-z0-9_]{0,8}", inner, any::<bool>()), 0..4)
                    .prop_map(|fields| {
                        DataType::Struct(StructType::new(
                            fields
                                .into_iter()
                                .map(|(name, ty, nullable)| StructField::new(name, ty, nullable))
                                .collect(),
                        ))
                    }),
            ]
        })
    }

    fn two_field_schema() -> StructType {
        StructType::default()
            .add("id", DataType::Long, false)
            .add("name", DataType::String, true)
    }

    #[test]
    fn test_struct_json_layout() {
        let json = two_field_schema().json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "struct");
        assert_eq!(value["fields"][0]["name"], "id");
        assert_eq!(value["fields"][0]["type"], "long");
        assert_eq!(value["fields"][0]["nullable"], false);
        assert_eq!(value["fields"][1]["type"], "string");
        assert!(value["fields"][1]["metadata"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_parse_defaults() {
        // nullable, containsNull and metadata may be omitted.
        let st = StructType::from_json(
            r#"{"type":"struct","fields":[{"name":"xs","type":{"type":"array","elementType":"integer"}}]}"#,
        )
        .unwrap();
        assert_eq!(st.len(), 1);
        let field = st.field("xs").unwrap();
        assert!(field.nullable);
        assert_eq!(field.data_type, DataType::array(DataType::Integer, true));
    }

    #[test]
    fn test_decimal_names() {
        assert_eq!(
            DataType::from_json(r#""decimal(12, 3)""#).unwrap(),
            DataType::Decimal {
                precision: 12,
                scale: 3
            }
        );
        assert_eq!(
            DataType::from_json(r#""decimal""#).unwrap(),
            DataType::Decimal {
                precision: 10,
                scale: 0
            }
        );
        assert!(DataType::from_json(r#""decimal(3,5)""#).is_err());
        assert!(DataType::from_json(r#""decimal(x,1)""#).is_err());
    }

    #[test]
    fn test_null_type_aliases() {
        assert_eq!(DataType::from_json(r#""void""#).unwrap(), DataType::Null);
        assert_eq!(DataType::from_json(r#""null""#).unwrap(), DataType::Null);
    }

    #[test]
    fn test_not_a_struct() {
        let err = StructType::from_json(r#""integer""#).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAStruct(ref s) if s == "int"));
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(matches!(
            DataType::from_json(r#""varchar""#),
            Err(ProtocolError::MalformedType(_))
        ));
        assert!(matches!(
            DataType::from_json(r#"{"type":"udt"}"#),
            Err(ProtocolError::MalformedType(_))
        ));
        assert!(matches!(
            DataType::from_json(r#"{"type":"struct"}"#),
            Err(ProtocolError::MalformedType(_))
        ));
        assert!(matches!(
            DataType::from_json("42"),
            Err(ProtocolError::MalformedType(_))
        ));
        assert!(matches!(
            DataType::from_json("{not json"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_simple_string() {
        let ty = DataType::Struct(
            StructType::default()
                .add("a", DataType::Integer, true)
                .add("b", DataType::map(DataType::String, DataType::array(DataType::Long, true), true), true),
        );
        assert_eq!(ty.to_string(), "struct<a:int,b:map<string,array<bigint>>>");
    }

    #[test]
    fn test_field_metadata_preserved() {
        let st = StructType::new(vec![
            StructField::new("c", DataType::String, true).with_metadata("comment", "hello")
        ]);
        let parsed = StructType::from_json(&st.json()).unwrap();
        assert_eq!(parsed.fields[0].metadata["comment"], "hello");
        assert_eq!(parsed, st);
    }

    #[test]
    fn test_serde_integration() {
        let st = two_field_schema();
        let json = serde_json::to_string(&st).unwrap();
        let back: StructType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, st);

        let err = serde_json::from_str::<StructType>(r#""string""#);
        assert!(err.is_err());
    }

    proptest! {
        #[test]
        fn prop_descriptor_roundtrip(ty in arb_data_type()) {
            let parsed = DataType::from_json(&ty.json()).unwrap();
            prop_assert_eq!(parsed, ty);
        }
    }
}
