//! Options parsing for ormable protobuf extensions
//!
//! This module handles parsing of `(ormable.record)`, `(ormable.column)`,
//! `(ormable.server)` and `(ormable.method)` options from protobuf
//! descriptors.
//!
//! Custom protobuf extensions are stored as extension fields in the options
//! messages. prost-reflect interprets any `uninterpreted_option` entries when
//! a file importing `ormable/options.proto` is added to the pool, so both
//! request paths end up with decoded extension fields that are read directly.

use crate::GeneratorError;
use once_cell::sync::Lazy;
use prost::Message;
use prost_reflect::{
    DescriptorPool, DynamicMessage, FieldDescriptor, MessageDescriptor, MethodDescriptor,
    ReflectMessage, ServiceDescriptor, Value,
};

/// Generated option types from `proto/ormable/options.proto`
///
/// These types represent the custom protobuf extensions used to annotate
/// messages, fields, services and methods.
#[allow(missing_docs)]
pub mod ormable {
    include!(concat!(env!("OUT_DIR"), "/ormable.rs"));

    /// Custom scalar messages from `proto/ormable/types.proto`
    #[allow(missing_docs)]
    pub mod types {
        include!(concat!(env!("OUT_DIR"), "/ormable.types.rs"));
    }
}

pub use ormable::{
    column_options::Association, BelongsToOptions, ColumnOptions, ColumnTag, ExtraField,
    HasManyOptions, HasOneOptions, ManyToManyOptions, MethodOptions, RecordOptions,
    ServerOptions,
};

/// File descriptor set bytes generated at build time by protoc
static FILE_DESCRIPTOR_SET_BYTES: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/file_descriptor_set.bin"));

/// Extension name for record options
pub const RECORD_EXTENSION_NAME: &str = "ormable.record";

/// Extension name for column options
pub const COLUMN_EXTENSION_NAME: &str = "ormable.column";

/// Extension name for server options
pub const SERVER_EXTENSION_NAME: &str = "ormable.server";

/// Extension name for method options
pub const METHOD_EXTENSION_NAME: &str = "ormable.method";

/// Lazily initialized pool with the well-known types and our extension definitions
static ANNOTATION_POOL: Lazy<DescriptorPool> = Lazy::new(|| {
    let mut pool = DescriptorPool::global();
    let set = prost_types::FileDescriptorSet::decode(FILE_DESCRIPTOR_SET_BYTES)
        .expect("Failed to decode file descriptor set");
    for file in set.file {
        if pool.get_file_by_name(file.name()).is_none() {
            pool.add_file_descriptor_proto(file)
                .expect("Annotation descriptors must be valid");
        }
    }
    pool
});

/// The descriptor pool every compilation starts from
///
/// It holds the google well-known types, `google/protobuf/descriptor.proto`
/// and the `ormable` annotation files, so request files may import them
/// without shipping their own copies.
pub fn annotation_pool() -> DescriptorPool {
    ANNOTATION_POOL.clone()
}

/// Parse record options from a message descriptor
pub fn parse_record_options(
    message: &MessageDescriptor,
) -> Result<Option<RecordOptions>, GeneratorError> {
    read_extension(&message.options(), RECORD_EXTENSION_NAME)
}

/// Parse column options from a field descriptor
pub fn parse_column_options(
    field: &FieldDescriptor,
) -> Result<Option<ColumnOptions>, GeneratorError> {
    read_extension(&field.options(), COLUMN_EXTENSION_NAME)
}

/// Parse server options from a service descriptor
pub fn parse_server_options(
    service: &ServiceDescriptor,
) -> Result<Option<ServerOptions>, GeneratorError> {
    read_extension(&service.options(), SERVER_EXTENSION_NAME)
}

/// Parse method options from a method descriptor
pub fn parse_method_options(
    method: &MethodDescriptor,
) -> Result<Option<MethodOptions>, GeneratorError> {
    read_extension(&method.options(), METHOD_EXTENSION_NAME)
}

/// Read one extension from an options message
///
/// Returns `None` when the extension is not set.
fn read_extension<T>(options: &DynamicMessage, extension_name: &str) -> Result<Option<T>, GeneratorError>
where
    T: Message + Default,
{
    let pool = options.descriptor().parent_pool().clone();
    let extension = pool.get_extension_by_name(extension_name).ok_or_else(|| {
        GeneratorError::OptionsParseError(format!("extension {extension_name} is not registered"))
    })?;

    if !options.has_extension(&extension) {
        return Ok(None);
    }
    match options.get_extension(&extension).as_ref() {
        Value::Message(value) => value
            .transcode_to::<T>()
            .map(Some)
            .map_err(|e| GeneratorError::OptionsParseError(format!("({extension_name}): {e}"))),
        _ => Err(GeneratorError::OptionsParseError(format!(
            "extension {extension_name} is not a message"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::uninterpreted_option::NamePart;
    use prost_types::{
        DescriptorProto, FieldDescriptorProto, FieldOptions, FileDescriptorProto, MessageOptions,
        UninterpretedOption,
    };

    fn option(path: &[(&str, bool)], value: UninterpretedOption) -> UninterpretedOption {
        UninterpretedOption {
            name: path
                .iter()
                .map(|(part, ext)| NamePart {
                    name_part: part.to_string(),
                    is_extension: *ext,
                })
                .collect(),
            ..value
        }
    }

    /// Load a message whose annotations are still written as option text
    fn load(record: Vec<UninterpretedOption>, column: Vec<UninterpretedOption>) -> MessageDescriptor {
        let mut pool = annotation_pool();
        pool.add_file_descriptor_proto(FileDescriptorProto {
            name: Some("test/annotated.proto".to_string()),
            package: Some("test".to_string()),
            dependency: vec!["ormable/options.proto".to_string()],
            message_type: vec![DescriptorProto {
                name: Some("Person".to_string()),
                field: vec![FieldDescriptorProto {
                    name: Some("id".to_string()),
                    number: Some(1),
                    r#type: Some(Type::Uint32.into()),
                    label: Some(Label::Optional.into()),
                    options: Some(FieldOptions {
                        uninterpreted_option: column,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                options: Some(MessageOptions {
                    uninterpreted_option: record,
                    ..Default::default()
                }),
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        })
        .unwrap();
        pool.get_message_by_name("test.Person").unwrap()
    }

    #[test]
    fn test_options_interpreted_on_load() {
        let message = load(
            vec![option(
                &[("ormable.record", true)],
                UninterpretedOption {
                    aggregate_value: Some("ormable: true, table: \"people\"".to_string()),
                    ..Default::default()
                },
            )],
            vec![option(
                &[("ormable.column", true), ("tag", false), ("primary_key", false)],
                UninterpretedOption {
                    identifier_value: Some("true".to_string()),
                    ..Default::default()
                },
            )],
        );

        let record = parse_record_options(&message).unwrap().unwrap();
        assert!(record.ormable);
        assert_eq!(record.table, "people");

        let field = message.get_field_by_name("id").unwrap();
        let column = parse_column_options(&field).unwrap().unwrap();
        assert!(column.tag.unwrap_or_default().primary_key);
    }

    #[test]
    fn test_missing_extension_is_none() {
        let message = load(vec![], vec![]);
        assert_eq!(parse_record_options(&message).unwrap(), None);
        let field = message.get_field_by_name("id").unwrap();
        assert_eq!(parse_column_options(&field).unwrap(), None);
    }

    #[test]
    fn test_annotation_pool_has_extensions() {
        let pool = annotation_pool();
        for name in [
            RECORD_EXTENSION_NAME,
            COLUMN_EXTENSION_NAME,
            SERVER_EXTENSION_NAME,
            METHOD_EXTENSION_NAME,
        ] {
            assert!(pool.get_extension_by_name(name).is_some(), "{name}");
        }
        assert!(pool.get_message_by_name("ormable.types.UUID").is_some());
        assert!(pool.get_message_by_name("google.protobuf.Timestamp").is_some());
    }
}
