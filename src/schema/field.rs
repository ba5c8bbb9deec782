//! Basic field mapping
//!
//! Turns the fields of one ormable message into storage fields. Fields whose
//! type is another ormable message are deferred to association resolution.

use super::{Diagnostic, Field, FieldSource, OrmableType, SchemaError};
use crate::descriptor::{has_explicit_presence, in_real_oneof, target_message, type_name};
use crate::naming::{field_key, record_name, table_name};
use crate::options::{parse_column_options, ColumnOptions, RecordOptions};
use crate::types::{map_kind, map_well_known, Scalar, StorageType};
use crate::GeneratorError;
use indexmap::IndexMap;
use prost_reflect::{FieldDescriptor, MessageDescriptor};
use tracing::debug;

/// Field key of the implicit tenant column
pub const ACCOUNT_ID: &str = "AccountId";

/// Outcome of mapping one source field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMapping {
    /// The field becomes a storage column
    Column(Field),
    /// The field refers to an ormable message and is resolved later
    Deferred,
    /// The field has no storage representation
    ///
    /// Carries the reason when the omission is worth reporting.
    Omitted(Option<String>),
}

/// Register an empty storage record for an ormable message
pub fn new_record(message: &MessageDescriptor, options: &RecordOptions) -> OrmableType {
    let type_name = type_name(message);
    let table = if options.table.is_empty() {
        table_name(&type_name)
    } else {
        options.table.clone()
    };
    OrmableType {
        full_name: message.full_name().to_string(),
        record_name: record_name(&type_name),
        type_name,
        package: message.package_name().to_string(),
        file: message.parent_file().name().to_string(),
        multi_account: options.multi_account,
        table,
        fields: IndexMap::new(),
        annotations: IndexMap::new(),
    }
}

/// Map one source field
///
/// `is_ormable` answers whether a fully-qualified message name has a storage
/// record of its own.
pub fn map_field(
    field: &FieldDescriptor,
    annotation: Option<&ColumnOptions>,
    is_ormable: impl Fn(&str) -> bool,
) -> FieldMapping {
    if annotation.map(|a| a.drop).unwrap_or(false) {
        return FieldMapping::Omitted(None);
    }
    if field.is_map() {
        return FieldMapping::Omitted(Some("map fields have no storage representation".into()));
    }
    if in_real_oneof(field) {
        return FieldMapping::Omitted(Some("oneof members have no storage representation".into()));
    }

    let tag = annotation.and_then(|a| a.tag.clone()).unwrap_or_default();
    let column = |ty: StorageType, package: &str| {
        FieldMapping::Column(Field {
            name: field_key(field.name()),
            ty,
            package: package.to_string(),
            tag: tag.clone(),
            source: FieldSource::Message {
                proto_name: field.name().to_string(),
            },
            association: None,
        })
    };

    if let Some(message) = target_message(field) {
        let full_name = message.full_name();
        if is_ormable(full_name) {
            return FieldMapping::Deferred;
        }
        if field.is_list() {
            return FieldMapping::Omitted(Some(format!(
                "repeated {full_name} is not ormable and has no storage representation"
            )));
        }
        return match map_well_known(full_name) {
            Some(ty) => column(ty, message.package_name()),
            None => FieldMapping::Omitted(Some(format!(
                "type {full_name} is not ormable"
            ))),
        };
    }

    if field.is_list() {
        return FieldMapping::Omitted(Some(
            "repeated scalar fields have no storage representation".into(),
        ));
    }

    // Enums map to i32, which is also how prost stores them.
    let Some(scalar) = map_kind(&field.kind()) else {
        return FieldMapping::Omitted(None);
    };
    if has_explicit_presence(field) {
        column(StorageType::Optional(scalar), "")
    } else {
        column(StorageType::Scalar(scalar), "")
    }
}

/// Fill in the basic fields of a registered record
///
/// Runs the field mapper over every source field, then appends the
/// `include` fields and, for multi-account records, the tenant column.
/// Column annotations are stored on the record for association resolution.
pub fn map_basic_fields(
    record: &mut OrmableType,
    message: &MessageDescriptor,
    options: &RecordOptions,
    is_ormable: impl Fn(&str) -> bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), GeneratorError> {
    for field in message.fields() {
        let annotation = parse_column_options(&field)?;
        let mapping = map_field(&field, annotation.as_ref(), &is_ormable);
        if let Some(annotation) = annotation {
            record
                .annotations
                .insert(field.name().to_string(), annotation);
        }

        match mapping {
            FieldMapping::Column(mapped) => insert_unique(record, mapped)?,
            FieldMapping::Deferred => {}
            FieldMapping::Omitted(Some(reason)) => {
                debug!(record = %record.record_name, field = field.name(), %reason, "field omitted");
                diagnostics.push(Diagnostic {
                    subject: record.record_name.clone(),
                    member: field.name().to_string(),
                    message: reason,
                });
            }
            FieldMapping::Omitted(None) => {}
        }
    }

    for extra in &options.include {
        let name = field_key(&extra.name);
        insert_unique(
            record,
            Field {
                name,
                ty: StorageType::parse(&extra.r#type),
                package: extra.package.clone(),
                tag: extra.tag.clone().unwrap_or_default(),
                source: FieldSource::Included,
                association: None,
            },
        )?;
    }

    if record.multi_account {
        match record.fields.get(ACCOUNT_ID) {
            Some(existing) if existing.ty != StorageType::Scalar(Scalar::String) => {
                return Err(SchemaError::AccountIdConflict {
                    record: record.record_name.clone(),
                    existing: existing.ty.to_string(),
                }
                .into());
            }
            Some(_) => {}
            None => {
                record.fields.insert(
                    ACCOUNT_ID.to_string(),
                    Field::synthetic(
                        ACCOUNT_ID,
                        StorageType::Scalar(Scalar::String),
                        FieldSource::Account,
                    ),
                );
            }
        }
    }

    Ok(())
}

fn insert_unique(record: &mut OrmableType, field: Field) -> Result<(), SchemaError> {
    if record.fields.contains_key(&field.name) {
        return Err(SchemaError::DuplicateField {
            record: record.record_name.clone(),
            field: field.name,
        });
    }
    record.fields.insert(field.name.clone(), field);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::annotation_pool;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

    fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(ty.into()),
            label: Some(Label::Optional.into()),
            ..Default::default()
        }
    }

    fn message_field(name: &str, number: i32, type_name: &str, repeated: bool) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(Type::Message.into()),
            type_name: Some(type_name.to_string()),
            label: Some(if repeated { Label::Repeated } else { Label::Optional }.into()),
            ..Default::default()
        }
    }

    fn sample() -> MessageDescriptor {
        let mut numbers = scalar("numbers", 3, Type::Int32);
        numbers.label = Some(Label::Repeated.into());
        let mut nickname = scalar("nickname", 6, Type::String);
        nickname.proto3_optional = Some(true);
        nickname.oneof_index = Some(0);

        let file = FileDescriptorProto {
            name: Some("test/sample.proto".to_string()),
            package: Some("test".to_string()),
            dependency: vec![
                "google/protobuf/timestamp.proto".to_string(),
                "google/protobuf/wrappers.proto".to_string(),
            ],
            message_type: vec![
                DescriptorProto {
                    name: Some("Sample".to_string()),
                    field: vec![
                        scalar("id", 1, Type::Uint32),
                        scalar("name", 2, Type::String),
                        numbers,
                        message_field("created_at", 4, ".google.protobuf.Timestamp", false),
                        message_field("note", 5, ".google.protobuf.StringValue", false),
                        nickname,
                        message_field("other", 7, ".test.Other", false),
                        message_field("others", 8, ".test.Other", true),
                    ],
                    oneof_decl: vec![prost_types::OneofDescriptorProto {
                        name: Some("_nickname".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Other".to_string()),
                    ..Default::default()
                },
            ],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        };
        let mut pool = annotation_pool();
        pool.add_file_descriptor_proto(file).unwrap();
        pool.get_message_by_name("test.Sample").unwrap()
    }

    fn mapping(message: &MessageDescriptor, name: &str, ormable: bool) -> FieldMapping {
        let field = message.get_field_by_name(name).unwrap();
        map_field(&field, None, |_| ormable)
    }

    #[test]
    fn test_scalars_keep_their_type() {
        let message = sample();
        let FieldMapping::Column(field) = mapping(&message, "id", false) else {
            panic!("id should be a column");
        };
        assert_eq!(field.name, "Id");
        assert_eq!(field.ty, StorageType::Scalar(Scalar::U32));
        assert_eq!(field.source_field(), Some("id"));
    }

    #[test]
    fn test_repeated_scalar_is_omitted() {
        let message = sample();
        assert!(matches!(
            mapping(&message, "numbers", false),
            FieldMapping::Omitted(Some(_))
        ));
    }

    #[test]
    fn test_well_known_types() {
        let message = sample();
        let FieldMapping::Column(created) = mapping(&message, "created_at", false) else {
            panic!("created_at should be a column");
        };
        assert_eq!(created.ty, StorageType::Timestamp);
        assert_eq!(created.package, "google.protobuf");

        let FieldMapping::Column(note) = mapping(&message, "note", false) else {
            panic!("note should be a column");
        };
        assert_eq!(note.ty, StorageType::Optional(Scalar::String));
    }

    #[test]
    fn test_proto3_optional_is_nullable() {
        let message = sample();
        let FieldMapping::Column(nickname) = mapping(&message, "nickname", false) else {
            panic!("nickname should be a column");
        };
        assert_eq!(nickname.ty, StorageType::Optional(Scalar::String));
    }

    #[test]
    fn test_message_fields() {
        let message = sample();
        assert_eq!(mapping(&message, "other", true), FieldMapping::Deferred);
        assert_eq!(mapping(&message, "others", true), FieldMapping::Deferred);
        assert!(matches!(
            mapping(&message, "other", false),
            FieldMapping::Omitted(Some(reason)) if reason.contains("test.Other")
        ));
    }

    #[test]
    fn test_drop_wins() {
        let message = sample();
        let field = message.get_field_by_name("name").unwrap();
        let annotation = ColumnOptions {
            drop: true,
            ..Default::default()
        };
        assert_eq!(
            map_field(&field, Some(&annotation), |_| false),
            FieldMapping::Omitted(None)
        );
    }

    #[test]
    fn test_basic_fields_with_account_and_include() {
        let message = sample();
        let options = RecordOptions {
            ormable: true,
            multi_account: true,
            include: vec![crate::options::ExtraField {
                name: "owner_id".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut record = new_record(&message, &options);
        let mut diagnostics = Vec::new();
        map_basic_fields(&mut record, &message, &options, |_| false, &mut diagnostics).unwrap();

        let keys: Vec<_> = record.fields.keys().cloned().collect();
        assert_eq!(
            keys,
            ["Id", "Name", "CreatedAt", "Note", "Nickname", "OwnerId", "AccountId"]
        );
        assert_eq!(record.fields["OwnerId"].ty, StorageType::Placeholder);
        assert_eq!(record.table, "samples");
        assert_eq!(record.record_name, "SampleOrm");
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_account_id_conflict() {
        let message = sample();
        let options = RecordOptions {
            ormable: true,
            multi_account: true,
            include: vec![crate::options::ExtraField {
                name: "account_id".to_string(),
                r#type: "u64".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut record = new_record(&message, &options);
        let err = map_basic_fields(&mut record, &message, &options, |_| false, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::Schema(SchemaError::AccountIdConflict { .. })
        ));
    }
}
