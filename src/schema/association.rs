//! Association resolution
//!
//! Second pass over every ormable message. Each field whose type is itself
//! ormable is classified as has-one, has-many, belongs-to or many-to-many,
//! and the keys the association needs are injected into the record that must
//! hold them. Every default that gets computed is pinned back onto the
//! field's annotation, so resolving again yields the same names.

use super::{
    Association, AssociationFlags, AssociationKind, Diagnostic, Field, FieldSource, JoinTable,
    OrmableType, SchemaError,
};
use crate::descriptor::{in_real_oneof, target_message};
use crate::naming::{db_name, field_key, plural, singular};
use crate::options::{
    Association as AssociationOptions, BelongsToOptions, ColumnOptions, ColumnTag,
    HasManyOptions, HasOneOptions, ManyToManyOptions,
};
use crate::types::{Scalar, StorageType};
use indexmap::IndexMap;
use prost_reflect::{FieldDescriptor, MessageDescriptor};
use tracing::{debug, warn};

/// Registry of storage records keyed by fully-qualified message name
pub type Registry = IndexMap<String, OrmableType>;

/// A field of the owner whose type is ormable
struct Candidate {
    field: FieldDescriptor,
    target: String,
    kind: AssociationKind,
}

/// Resolve every association declared on one ormable message
pub fn resolve_associations(
    registry: &mut Registry,
    message: &MessageDescriptor,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), SchemaError> {
    let owner = message.full_name().to_string();
    let candidates = candidates(registry, &owner, message, diagnostics)?;

    for candidate in &candidates {
        let dimension = candidates
            .iter()
            .filter(|c| c.target == candidate.target && bucket(c.kind) == bucket(candidate.kind))
            .count();

        let field_name = candidate.field.name();
        let mut annotation = lookup(registry, &owner)?
            .annotation(field_name)
            .cloned()
            .unwrap_or_default();

        let association = match candidate.kind {
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let mut keys = KeySpec::from_annotation(&annotation);
                let resolved =
                    resolve_has(registry, &owner, candidate, &mut keys, dimension)?;
                annotation.association = Some(keys.pin(candidate.kind));
                resolved
            }
            AssociationKind::BelongsTo => {
                let mut keys = KeySpec::from_annotation(&annotation);
                let resolved =
                    resolve_belongs_to(registry, &owner, candidate, &mut keys, dimension)?;
                annotation.association = Some(keys.pin(candidate.kind));
                resolved
            }
            AssociationKind::ManyToMany => {
                let mut options = match annotation.association.take() {
                    Some(AssociationOptions::ManyToMany(options)) => options,
                    _ => ManyToManyOptions::default(),
                };
                let resolved =
                    resolve_many_to_many(registry, &owner, candidate, &mut options, dimension)?;
                annotation.association = Some(AssociationOptions::ManyToMany(options));
                resolved
            }
        };

        debug!(
            owner = %owner,
            field = field_name,
            kind = %association.kind,
            foreign_key = %association.foreign_key,
            association_key = %association.association_key,
            "resolved association"
        );
        attach(registry, &owner, candidate, annotation, association)?;
    }

    Ok(())
}

fn candidates(
    registry: &Registry,
    owner: &str,
    message: &MessageDescriptor,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Candidate>, SchemaError> {
    let record = lookup(registry, owner)?;
    let mut out = Vec::new();

    for field in message.fields() {
        let annotation = record.annotation(field.name());
        if annotation.map(|a| a.drop).unwrap_or(false) || field.is_map() || in_real_oneof(&field)
        {
            continue;
        }
        let Some(target) = target_message(&field) else {
            continue;
        };
        if !registry.contains_key(target.full_name()) {
            continue;
        }

        let declared = annotation.and_then(|a| a.association.as_ref());
        let kind = classify(field.is_list(), declared);
        if let Some(declared) = declared.filter(|d| declared_kind(d) != kind) {
            let reason = format!(
                "{} annotation does not apply to a {} field, resolved as {kind}",
                declared_kind(declared),
                if field.is_list() { "repeated" } else { "singular" },
            );
            warn!(record = %record.record_name, field = field.name(), "{reason}");
            diagnostics.push(Diagnostic {
                subject: record.record_name.clone(),
                member: field.name().to_string(),
                message: reason,
            });
        }

        out.push(Candidate {
            target: target.full_name().to_string(),
            field,
            kind,
        });
    }

    Ok(out)
}

/// Decide the association kind from cardinality and the explicit annotation
///
/// An annotation that does not fit the cardinality is ignored.
pub fn classify(repeated: bool, declared: Option<&AssociationOptions>) -> AssociationKind {
    match (repeated, declared) {
        (true, Some(AssociationOptions::ManyToMany(_))) => AssociationKind::ManyToMany,
        (true, _) => AssociationKind::HasMany,
        (false, Some(AssociationOptions::BelongsTo(_))) => AssociationKind::BelongsTo,
        (false, _) => AssociationKind::HasOne,
    }
}

fn declared_kind(options: &AssociationOptions) -> AssociationKind {
    match options {
        AssociationOptions::HasOne(_) => AssociationKind::HasOne,
        AssociationOptions::HasMany(_) => AssociationKind::HasMany,
        AssociationOptions::BelongsTo(_) => AssociationKind::BelongsTo,
        AssociationOptions::ManyToMany(_) => AssociationKind::ManyToMany,
    }
}

/// Associations sharing a bucket need disambiguated default names
fn bucket(kind: AssociationKind) -> u8 {
    match kind {
        AssociationKind::HasOne | AssociationKind::HasMany => 0,
        AssociationKind::BelongsTo => 1,
        AssociationKind::ManyToMany => 2,
    }
}

/// Key options shared by has-one, has-many and belongs-to
#[derive(Debug, Clone, Default)]
struct KeySpec {
    foreign_key: String,
    foreign_key_tag: ColumnTag,
    association_key: String,
    position_field: String,
    position_field_tag: ColumnTag,
    flags: AssociationFlags,
}

impl KeySpec {
    fn from_annotation(annotation: &ColumnOptions) -> Self {
        match annotation.association.clone() {
            Some(AssociationOptions::HasOne(o)) => Self {
                foreign_key: o.foreignkey,
                foreign_key_tag: o.foreignkey_tag.unwrap_or_default(),
                association_key: o.association_foreignkey,
                flags: flags(o.preload, o.replace, o.append, o.clear),
                ..Default::default()
            },
            Some(AssociationOptions::BelongsTo(o)) => Self {
                foreign_key: o.foreignkey,
                foreign_key_tag: o.foreignkey_tag.unwrap_or_default(),
                association_key: o.association_foreignkey,
                flags: flags(o.preload, o.replace, o.append, o.clear),
                ..Default::default()
            },
            Some(AssociationOptions::HasMany(o)) => Self {
                foreign_key: o.foreignkey,
                foreign_key_tag: o.foreignkey_tag.unwrap_or_default(),
                association_key: o.association_foreignkey,
                position_field: o.position_field,
                position_field_tag: o.position_field_tag.unwrap_or_default(),
                flags: flags(o.preload, o.replace, o.append, o.clear),
            },
            _ => Self::default(),
        }
    }

    /// The annotation with every resolved name filled in
    fn pin(self, kind: AssociationKind) -> AssociationOptions {
        let tag = |t: ColumnTag| (t != ColumnTag::default()).then_some(t);
        let f = self.flags;
        match kind {
            AssociationKind::HasMany => AssociationOptions::HasMany(HasManyOptions {
                foreignkey: self.foreign_key,
                foreignkey_tag: tag(self.foreign_key_tag),
                association_foreignkey: self.association_key,
                position_field: self.position_field,
                position_field_tag: tag(self.position_field_tag),
                preload: f.preload,
                replace: f.replace,
                append: f.append,
                clear: f.clear,
            }),
            AssociationKind::BelongsTo => AssociationOptions::BelongsTo(BelongsToOptions {
                foreignkey: self.foreign_key,
                foreignkey_tag: tag(self.foreign_key_tag),
                association_foreignkey: self.association_key,
                preload: f.preload,
                replace: f.replace,
                append: f.append,
                clear: f.clear,
            }),
            _ => AssociationOptions::HasOne(HasOneOptions {
                foreignkey: self.foreign_key,
                foreignkey_tag: tag(self.foreign_key_tag),
                association_foreignkey: self.association_key,
                preload: f.preload,
                replace: f.replace,
                append: f.append,
                clear: f.clear,
            }),
        }
    }
}

fn flags(preload: bool, replace: bool, append: bool, clear: bool) -> AssociationFlags {
    AssociationFlags {
        preload,
        replace,
        append,
        clear,
    }
}

/// Has-one and has-many: the target holds a key referencing the owner
fn resolve_has(
    registry: &mut Registry,
    owner: &str,
    candidate: &Candidate,
    keys: &mut KeySpec,
    dimension: usize,
) -> Result<Association, SchemaError> {
    let owner_record = lookup(registry, owner)?;
    let target_record = lookup(registry, &candidate.target)?;
    target_record.primary_key()?;

    let key = key_field(owner_record, &keys.association_key)?;
    let foreign_key = if !keys.foreign_key.is_empty() {
        column_key(target_record, &keys.foreign_key)
    } else if dimension == 1 {
        field_key(&format!("{}{}", owner_record.type_name, key.name))
    } else {
        field_key(&format!(
            "{}{}{}",
            field_key(candidate.field.name()),
            owner_record.type_name,
            key.name
        ))
    };

    if owner_record.package != target_record.package && target_record.field(&foreign_key).is_none()
    {
        return Err(SchemaError::CrossPackageForeignKey {
            target: target_record.record_name.clone(),
            package: target_record.package.clone(),
            owner: owner_record.record_name.clone(),
            kind: candidate.kind,
            foreign_key,
        });
    }

    let injected = Field {
        name: foreign_key.clone(),
        ty: foreign_key_type(&key, &keys.foreign_key_tag),
        package: key.package.clone(),
        tag: keys.foreign_key_tag.clone(),
        source: FieldSource::Injected {
            by: owner.to_string(),
        },
        association: None,
    };

    let target_record = lookup_mut(registry, &candidate.target)?;
    target_record.merge_field(injected)?;

    let position_field = if candidate.kind == AssociationKind::HasMany && !keys.position_field.is_empty() {
        let name = inject_position(target_record, owner, &keys.position_field, &keys.position_field_tag)?;
        keys.position_field = name.clone();
        Some(name)
    } else {
        None
    };

    keys.foreign_key = foreign_key.clone();
    keys.association_key = key.name.clone();

    Ok(Association {
        kind: candidate.kind,
        target: candidate.target.clone(),
        foreign_key,
        association_key: key.name,
        position_field,
        join: None,
        flags: keys.flags,
    })
}

/// Belongs-to: the owner holds a key referencing the target
fn resolve_belongs_to(
    registry: &mut Registry,
    owner: &str,
    candidate: &Candidate,
    keys: &mut KeySpec,
    dimension: usize,
) -> Result<Association, SchemaError> {
    lookup(registry, owner)?.primary_key()?;
    let target_record = lookup(registry, &candidate.target)?;

    let key = key_field(target_record, &keys.association_key)?;
    let foreign_key = if !keys.foreign_key.is_empty() {
        column_key(lookup(registry, owner)?, &keys.foreign_key)
    } else if dimension == 1 {
        field_key(&format!("{}{}", target_record.type_name, key.name))
    } else {
        field_key(&format!("{}{}", field_key(candidate.field.name()), key.name))
    };

    let injected = Field {
        name: foreign_key.clone(),
        ty: foreign_key_type(&key, &keys.foreign_key_tag),
        package: key.package.clone(),
        tag: keys.foreign_key_tag.clone(),
        source: FieldSource::Injected {
            by: owner.to_string(),
        },
        association: None,
    };
    lookup_mut(registry, owner)?.merge_field(injected)?;

    keys.foreign_key = foreign_key.clone();
    keys.association_key = key.name.clone();

    Ok(Association {
        kind: AssociationKind::BelongsTo,
        target: candidate.target.clone(),
        foreign_key,
        association_key: key.name,
        position_field: None,
        join: None,
        flags: keys.flags,
    })
}

/// Many-to-many: both keys stay put, a join table links them
fn resolve_many_to_many(
    registry: &Registry,
    owner: &str,
    candidate: &Candidate,
    options: &mut ManyToManyOptions,
    dimension: usize,
) -> Result<Association, SchemaError> {
    let owner_record = lookup(registry, owner)?;
    let target_record = lookup(registry, &candidate.target)?;
    let field_name = candidate.field.name();
    let self_reference = owner == candidate.target;

    let key = key_field(owner_record, &options.foreignkey)?;
    let association_key = key_field(target_record, &options.association_foreignkey)?;

    let owner_db = db_name(&owner_record.type_name);
    let join_table = if !options.jointable.is_empty() {
        options.jointable.clone()
    } else if dimension == 1 && !self_reference {
        format!("{owner_db}_{}", plural(&db_name(&target_record.type_name)))
    } else {
        format!("{owner_db}_{}", plural(&db_name(field_name)))
    };

    let join_foreign_key = if !options.jointable_foreignkey.is_empty() {
        options.jointable_foreignkey.clone()
    } else {
        db_name(&format!("{}{}", owner_record.type_name, key.name))
    };

    let join_association_key = if !options.association_jointable_foreignkey.is_empty() {
        options.association_jointable_foreignkey.clone()
    } else if self_reference {
        let related = field_key(&singular(field_name));
        let column = db_name(&format!("{related}{}", association_key.name));
        if column == join_foreign_key {
            db_name(&format!("{}{}", field_key(field_name), association_key.name))
        } else {
            column
        }
    } else {
        db_name(&format!("{}{}", target_record.type_name, association_key.name))
    };

    options.jointable = join_table.clone();
    options.foreignkey = key.name.clone();
    options.association_foreignkey = association_key.name.clone();
    options.jointable_foreignkey = join_foreign_key.clone();
    options.association_jointable_foreignkey = join_association_key.clone();

    Ok(Association {
        kind: AssociationKind::ManyToMany,
        target: candidate.target.clone(),
        foreign_key: key.name,
        association_key: association_key.name,
        position_field: None,
        join: Some(JoinTable {
            name: join_table,
            foreign_key: join_foreign_key,
            association_foreign_key: join_association_key,
        }),
        flags: flags(options.preload, options.replace, options.append, options.clear),
    })
}

/// Add the position column of an ordered has-many, or check the existing one
fn inject_position(
    record: &mut OrmableType,
    owner: &str,
    name: &str,
    tag: &ColumnTag,
) -> Result<String, SchemaError> {
    let key = column_key(record, name);
    match record.fields.get_mut(&key) {
        Some(existing) if existing.ty == StorageType::Placeholder => {
            existing.ty = StorageType::Scalar(Scalar::I64);
        }
        Some(existing) if !existing.ty.is_integer() => {
            return Err(SchemaError::PositionFieldConflict {
                record: record.record_name.clone(),
                field: key,
                existing: existing.ty.to_string(),
            });
        }
        Some(_) => {}
        None => {
            record.fields.insert(
                key.clone(),
                Field {
                    name: key.clone(),
                    ty: StorageType::Scalar(Scalar::I64),
                    package: String::new(),
                    tag: tag.clone(),
                    source: FieldSource::Injected {
                        by: owner.to_string(),
                    },
                    association: None,
                },
            );
        }
    }
    Ok(key)
}

/// Put the association field on the owner and pin the resolved annotation
fn attach(
    registry: &mut Registry,
    owner: &str,
    candidate: &Candidate,
    annotation: ColumnOptions,
    association: Association,
) -> Result<(), SchemaError> {
    let package = lookup(registry, &candidate.target)?.package.clone();
    let record = lookup_mut(registry, owner)?;
    let proto_name = candidate.field.name();
    let key = field_key(proto_name);

    if let Some(existing) = record.fields.get(&key) {
        if existing.source_field() != Some(proto_name) {
            return Err(SchemaError::DuplicateField {
                record: record.record_name.clone(),
                field: key,
            });
        }
    }

    let field = Field {
        name: key.clone(),
        ty: StorageType::Record {
            target: candidate.target.clone(),
            repeated: candidate.field.is_list(),
        },
        package,
        tag: annotation.tag.clone().unwrap_or_default(),
        source: FieldSource::Message {
            proto_name: proto_name.to_string(),
        },
        association: Some(association),
    };
    record.fields.insert(key, field);
    record
        .annotations
        .insert(proto_name.to_string(), annotation);
    Ok(())
}

/// The explicitly named key of a record, or its primary key
fn key_field(record: &OrmableType, explicit: &str) -> Result<Field, SchemaError> {
    if explicit.is_empty() {
        return record.primary_key().cloned();
    }
    let key = column_key(record, explicit);
    record
        .field(&key)
        .cloned()
        .ok_or_else(|| SchemaError::MissingField {
            field: key,
            record: record.record_name.clone(),
        })
}

/// A declared or pinned key as stored on `record`. Names already present
/// are kept verbatim so re-resolution never re-cases them.
fn column_key(record: &OrmableType, name: &str) -> String {
    if record.field(name).is_some() {
        name.to_string()
    } else {
        field_key(name)
    }
}

/// Nullable unless the key is tagged `not_null`
fn foreign_key_type(key: &Field, tag: &ColumnTag) -> StorageType {
    if tag.not_null {
        key.ty.required()
    } else {
        key.ty.nullable()
    }
}

fn lookup<'a>(registry: &'a Registry, name: &str) -> Result<&'a OrmableType, SchemaError> {
    registry.get(name).ok_or_else(|| SchemaError::UnknownType {
        name: name.to_string(),
        record: name.to_string(),
    })
}

fn lookup_mut<'a>(registry: &'a mut Registry, name: &str) -> Result<&'a mut OrmableType, SchemaError> {
    registry.get_mut(name).ok_or_else(|| SchemaError::UnknownType {
        name: name.to_string(),
        record: name.to_string(),
    })
}
