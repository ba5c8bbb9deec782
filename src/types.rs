//! Storage type model
//!
//! Maps protobuf field kinds and well-known message types onto the types a
//! storage record holds.

use prost_reflect::Kind;
use std::fmt;

/// Primitive storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// `bool`
    Bool,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `String`
    String,
    /// `Vec<u8>`
    Bytes,
}

impl Scalar {
    /// Rust spelling of the type
    pub fn rust_type(&self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::U32 => "u32",
            Scalar::U64 => "u64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::String => "String",
            Scalar::Bytes => "Vec<u8>",
        }
    }

    /// Whether this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Scalar::I32 | Scalar::I64 | Scalar::U32 | Scalar::U64
        )
    }

    fn from_rust_type(s: &str) -> Option<Self> {
        Some(match s {
            "bool" => Scalar::Bool,
            "i32" => Scalar::I32,
            "i64" => Scalar::I64,
            "u32" => Scalar::U32,
            "u64" => Scalar::U64,
            "f32" => Scalar::F32,
            "f64" => Scalar::F64,
            "String" => Scalar::String,
            "Vec<u8>" => Scalar::Bytes,
            _ => return None,
        })
    }
}

/// The type of one storage record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageType {
    /// A primitive, stored as-is
    Scalar(Scalar),
    /// A nullable primitive
    Optional(Scalar),
    /// `Option<chrono::DateTime<chrono::Utc>>`
    Timestamp,
    /// `uuid::Uuid`
    Uuid,
    /// `Option<uuid::Uuid>`
    OptionalUuid,
    /// `Option<serde_json::Value>`
    Json,
    /// Another storage record reached through an association
    Record {
        /// Fully-qualified message name of the target
        target: String,
        /// `Vec<T>` when true, `Option<Box<T>>` otherwise
        repeated: bool,
    },
    /// Declared without a type; an association must narrow it
    Placeholder,
    /// Any other Rust type path, used verbatim
    Custom(String),
}

impl StorageType {
    /// Parse a user supplied type from an `include` annotation
    pub fn parse(s: &str) -> Self {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if s.is_empty() {
            return StorageType::Placeholder;
        }
        if let Some(scalar) = Scalar::from_rust_type(&s) {
            return StorageType::Scalar(scalar);
        }
        if let Some(inner) = s.strip_prefix("Option<").and_then(|r| r.strip_suffix('>')) {
            if let Some(scalar) = Scalar::from_rust_type(inner) {
                return StorageType::Optional(scalar);
            }
            match inner {
                "uuid::Uuid" | "Uuid" => return StorageType::OptionalUuid,
                "serde_json::Value" => return StorageType::Json,
                "chrono::DateTime<chrono::Utc>" => return StorageType::Timestamp,
                _ => {}
            }
        }
        match s.as_str() {
            "uuid::Uuid" | "Uuid" => StorageType::Uuid,
            _ => StorageType::Custom(s),
        }
    }

    /// The nullable form used for foreign keys
    ///
    /// Types that are already nullable, and byte sequences, are kept as-is.
    pub fn nullable(&self) -> Self {
        match self {
            StorageType::Scalar(Scalar::Bytes) => self.clone(),
            StorageType::Scalar(s) => StorageType::Optional(*s),
            StorageType::Uuid => StorageType::OptionalUuid,
            other => other.clone(),
        }
    }

    /// The non-nullable form used for `not_null` foreign keys
    pub fn required(&self) -> Self {
        match self {
            StorageType::Optional(s) => StorageType::Scalar(*s),
            StorageType::OptionalUuid => StorageType::Uuid,
            other => other.clone(),
        }
    }

    /// Whether the field holds an integer, nullable or not
    pub fn is_integer(&self) -> bool {
        match self {
            StorageType::Scalar(s) | StorageType::Optional(s) => s.is_integer(),
            _ => false,
        }
    }

    /// Whether the runtime can tell an unset value of this type
    ///
    /// Key-addressed handlers reject a zero primary key, so a key type
    /// without a zero value cannot back them.
    pub fn has_zero_value(&self) -> bool {
        !matches!(
            self,
            StorageType::Record { .. } | StorageType::Placeholder | StorageType::Custom(_)
        )
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Scalar(s) => f.write_str(s.rust_type()),
            StorageType::Optional(s) => write!(f, "Option<{}>", s.rust_type()),
            StorageType::Timestamp => f.write_str("Option<chrono::DateTime<chrono::Utc>>"),
            StorageType::Uuid => f.write_str("uuid::Uuid"),
            StorageType::OptionalUuid => f.write_str("Option<uuid::Uuid>"),
            StorageType::Json => f.write_str("Option<serde_json::Value>"),
            StorageType::Record { target, repeated: true } => write!(f, "Vec<{target}>"),
            StorageType::Record { target, .. } => write!(f, "Option<Box<{target}>>"),
            StorageType::Placeholder => f.write_str("_"),
            StorageType::Custom(path) => f.write_str(path),
        }
    }
}

/// Fully-qualified name of `ormable.types.UUID`
pub const UUID_TYPE: &str = "ormable.types.UUID";

/// Fully-qualified name of `ormable.types.UUIDValue`
pub const UUID_VALUE_TYPE: &str = "ormable.types.UUIDValue";

/// Fully-qualified name of `ormable.types.JSONValue`
pub const JSON_VALUE_TYPE: &str = "ormable.types.JSONValue";

/// Fully-qualified name of `google.protobuf.Timestamp`
pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Map a protobuf scalar kind to its storage primitive
///
/// Enums map to `i32`; message kinds return `None`.
pub fn map_kind(kind: &Kind) -> Option<Scalar> {
    Some(match kind {
        Kind::Double => Scalar::F64,
        Kind::Float => Scalar::F32,
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Scalar::I32,
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Scalar::I64,
        Kind::Uint32 | Kind::Fixed32 => Scalar::U32,
        Kind::Uint64 | Kind::Fixed64 => Scalar::U64,
        Kind::Bool => Scalar::Bool,
        Kind::String => Scalar::String,
        Kind::Bytes => Scalar::Bytes,
        Kind::Enum(_) => Scalar::I32,
        Kind::Message(_) => return None,
    })
}

/// Map a well-known or custom scalar message to its storage type
///
/// Returns `None` for messages with no special handling.
pub fn map_well_known(full_name: &str) -> Option<StorageType> {
    let wrapped = |s| Some(StorageType::Optional(s));
    match full_name {
        "google.protobuf.DoubleValue" => wrapped(Scalar::F64),
        "google.protobuf.FloatValue" => wrapped(Scalar::F32),
        "google.protobuf.Int64Value" => wrapped(Scalar::I64),
        "google.protobuf.UInt64Value" => wrapped(Scalar::U64),
        "google.protobuf.Int32Value" => wrapped(Scalar::I32),
        "google.protobuf.UInt32Value" => wrapped(Scalar::U32),
        "google.protobuf.BoolValue" => wrapped(Scalar::Bool),
        "google.protobuf.StringValue" => wrapped(Scalar::String),
        "google.protobuf.BytesValue" => wrapped(Scalar::Bytes),
        TIMESTAMP_TYPE => Some(StorageType::Timestamp),
        UUID_TYPE => Some(StorageType::Uuid),
        UUID_VALUE_TYPE => Some(StorageType::OptionalUuid),
        JSON_VALUE_TYPE => Some(StorageType::Json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_well_known() {
        assert_eq!(
            map_well_known("google.protobuf.StringValue"),
            Some(StorageType::Optional(Scalar::String))
        );
        assert_eq!(map_well_known(TIMESTAMP_TYPE), Some(StorageType::Timestamp));
        assert_eq!(map_well_known(UUID_TYPE), Some(StorageType::Uuid));
        assert_eq!(map_well_known("test.Other"), None);
    }

    #[test]
    fn test_nullable_foreign_key_types() {
        let key = StorageType::Scalar(Scalar::U32);
        assert_eq!(key.nullable(), StorageType::Optional(Scalar::U32));
        assert_eq!(key.nullable().required(), key);

        let bytes = StorageType::Scalar(Scalar::Bytes);
        assert_eq!(bytes.nullable(), bytes);

        let optional = StorageType::Optional(Scalar::String);
        assert_eq!(optional.nullable(), optional);
        assert_eq!(StorageType::Uuid.nullable(), StorageType::OptionalUuid);
    }

    #[test]
    fn test_parse_included_types() {
        assert_eq!(StorageType::parse(""), StorageType::Placeholder);
        assert_eq!(StorageType::parse("u32"), StorageType::Scalar(Scalar::U32));
        assert_eq!(
            StorageType::parse("Option<u32>"),
            StorageType::Optional(Scalar::U32)
        );
        assert_eq!(StorageType::parse("Option<uuid::Uuid>"), StorageType::OptionalUuid);
        assert_eq!(
            StorageType::parse("my::Money"),
            StorageType::Custom("my::Money".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StorageType::Optional(Scalar::U32).to_string(), "Option<u32>");
        assert_eq!(StorageType::Scalar(Scalar::Bytes).to_string(), "Vec<u8>");
    }
}
