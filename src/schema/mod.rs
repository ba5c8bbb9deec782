//! Derived storage schema
//!
//! An [`OrmableType`] is the storage record derived from one persistable
//! message. Records are built in two passes over the whole request:
//! [`field`] maps the basic fields, then [`association`] resolves every field
//! whose type is itself ormable and injects the keys it needs.

pub mod association;
pub mod field;

use crate::options::{ColumnOptions, ColumnTag};
use crate::types::StorageType;
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// Storage record derived from one ormable message
#[derive(Debug, Clone, PartialEq)]
pub struct OrmableType {
    /// Fully-qualified message name
    pub full_name: String,
    /// Message name with enclosing messages joined
    pub type_name: String,
    /// Name of the generated record struct
    pub record_name: String,
    /// Protobuf package the message is declared in
    pub package: String,
    /// File the message is declared in
    pub file: String,
    /// Rows are scoped by account id
    pub multi_account: bool,
    /// Storage table name
    pub table: String,
    /// Storage fields keyed by field key, in declaration order
    pub fields: IndexMap<String, Field>,
    /// Column annotations keyed by source field name
    ///
    /// Association resolution pins its resolved values here.
    pub(crate) annotations: IndexMap<String, ColumnOptions>,
}

impl OrmableType {
    /// Look up a storage field by key
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Annotation of a source field, as last resolved
    pub fn annotation(&self, source_field: &str) -> Option<&ColumnOptions> {
        self.annotations.get(source_field)
    }

    /// The primary key field
    ///
    /// A field tagged `primary_key` wins; otherwise a field named `id`, in any
    /// case. Fields are scanned in declaration order.
    pub fn primary_key(&self) -> Result<&Field, SchemaError> {
        self.fields
            .values()
            .find(|f| f.tag.primary_key)
            .or_else(|| {
                self.fields
                    .values()
                    .find(|f| f.name.eq_ignore_ascii_case("id"))
            })
            .ok_or_else(|| SchemaError::MissingPrimaryKey {
                record: self.record_name.clone(),
            })
    }

    /// The primary key, when rows can be addressed by it
    ///
    /// A key whose type has no zero value cannot be told apart from an unset
    /// one, so it does not count.
    pub fn addressable_key(&self) -> Option<&Field> {
        self.primary_key().ok().filter(|pk| pk.ty.has_zero_value())
    }

    /// Fields carrying an association, in declaration order
    pub fn associations(&self) -> impl Iterator<Item = (&Field, &Association)> {
        self.fields
            .values()
            .filter_map(|f| f.association.as_ref().map(|a| (f, a)))
    }

    /// Add a field, or reconcile it with an existing one of the same name
    ///
    /// A placeholder is narrowed to the incoming type, an identical type is
    /// kept, anything else is a conflict.
    pub(crate) fn merge_field(&mut self, field: Field) -> Result<&mut Field, SchemaError> {
        let record = self.record_name.clone();
        let key = field.name.clone();
        match self.fields.entry(key) {
            indexmap::map::Entry::Vacant(entry) => Ok(entry.insert(field)),
            indexmap::map::Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                if existing.ty == StorageType::Placeholder {
                    existing.ty = field.ty;
                } else if existing.ty != field.ty {
                    return Err(SchemaError::ForeignKeyConflict {
                        record,
                        field: existing.name.clone(),
                        existing: existing.ty.to_string(),
                        expected: field.ty.to_string(),
                    });
                }
                Ok(existing)
            }
        }
    }
}

/// One storage record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field key (`ParentId`)
    pub name: String,
    /// Storage type
    pub ty: StorageType,
    /// Package the type comes from, empty for primitives
    pub package: String,
    /// Column metadata
    pub tag: ColumnTag,
    /// Where the field came from
    pub source: FieldSource,
    /// Association carried by the field, if any
    pub association: Option<Association>,
}

impl Field {
    /// A field with no source counterpart and default column metadata
    pub(crate) fn synthetic(name: impl Into<String>, ty: StorageType, source: FieldSource) -> Self {
        Self {
            name: name.into(),
            ty,
            package: String::new(),
            tag: ColumnTag::default(),
            source,
            association: None,
        }
    }

    /// Storage column name
    pub fn column(&self) -> String {
        if self.tag.column.is_empty() {
            crate::naming::db_name(&self.name)
        } else {
            self.tag.column.clone()
        }
    }

    /// Source field name when the field mirrors a message field
    pub fn source_field(&self) -> Option<&str> {
        match &self.source {
            FieldSource::Message { proto_name } => Some(proto_name),
            _ => None,
        }
    }
}

/// Origin of a storage field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Mirrors a field of the message
    Message {
        /// Source field name
        proto_name: String,
    },
    /// Declared through the record's `include` annotation
    Included,
    /// The implicit account id of a multi-account record
    Account,
    /// Injected by an association of another record
    Injected {
        /// Fully-qualified name of the record whose association added it
        by: String,
    },
}

/// Kind of association between two records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// One owner, one target; the target holds the key
    HasOne,
    /// One owner, many targets; the targets hold the key
    HasMany,
    /// Many owners, one target; the owner holds the key
    BelongsTo,
    /// Many owners, many targets, through a join table
    ManyToMany,
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssociationKind::HasOne => "has-one",
            AssociationKind::HasMany => "has-many",
            AssociationKind::BelongsTo => "belongs-to",
            AssociationKind::ManyToMany => "many-to-many",
        })
    }
}

/// A fully resolved association
///
/// For has-one and has-many, `foreign_key` lives on the target and
/// `association_key` on the owner. For belongs-to it is the other way round.
/// For many-to-many both keys stay where they are and `join` names the table
/// linking them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Association kind
    pub kind: AssociationKind,
    /// Fully-qualified name of the target record
    pub target: String,
    /// Foreign key field key
    pub foreign_key: String,
    /// Referenced key field key
    pub association_key: String,
    /// Position field on the target of an ordered has-many
    pub position_field: Option<String>,
    /// Join table of a many-to-many
    pub join: Option<JoinTable>,
    /// Pass-through behavior flags
    pub flags: AssociationFlags,
}

/// Join table of a many-to-many association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// Table name
    pub name: String,
    /// Column referencing the owner's key
    pub foreign_key: String,
    /// Column referencing the target's key
    pub association_foreign_key: String,
}

/// Pass-through association flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssociationFlags {
    /// Eager-load the association
    pub preload: bool,
    /// Replace the associated set on save
    pub replace: bool,
    /// Append to the associated set on save
    pub append: bool,
    /// Clear the associated set on save
    pub clear: bool,
}

/// Fatal schema errors
///
/// Any of these aborts the whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A record needs a primary key and has none
    #[error("Primary key cannot be found in {record}: tag a field as primary_key or add an `id` field")]
    MissingPrimaryKey {
        /// Record name
        record: String,
    },

    /// An explicitly named key does not exist
    #[error("Missing {field} field in {record}")]
    MissingField {
        /// Field key
        field: String,
        /// Record name
        record: String,
    },

    /// A field already exists with a different type
    #[error("Cannot include {field} field into {record} as it already exists there with a different type: {existing} != {expected}")]
    ForeignKeyConflict {
        /// Record name
        record: String,
        /// Field key
        field: String,
        /// Type already declared
        existing: String,
        /// Type the association needs
        expected: String,
    },

    /// A source field maps onto a storage field that is already taken
    #[error("Field {field} is declared more than once in {record}")]
    DuplicateField {
        /// Record name
        record: String,
        /// Field key
        field: String,
    },

    /// A foreign key would have to be injected into another package
    #[error("Object {target} from package {package} cannot be used for {kind} in {owner} since it does not have FK field {foreign_key} defined. Manually define the key, or switch to many-to-many")]
    CrossPackageForeignKey {
        /// Target record name
        target: String,
        /// Target package
        package: String,
        /// Owner record name
        owner: String,
        /// Association kind
        kind: AssociationKind,
        /// Missing foreign key
        foreign_key: String,
    },

    /// A position field exists and is not an integer
    #[error("Cannot include {field} field into {record} as it already exists there with a non-integer type: {existing}")]
    PositionFieldConflict {
        /// Record name
        record: String,
        /// Field key
        field: String,
        /// Type already declared
        existing: String,
    },

    /// The implicit account id clashes with a declared field
    #[error("Cannot include AccountId field into {record} as it already exists there with a different type: {existing}")]
    AccountIdConflict {
        /// Record name
        record: String,
        /// Type already declared
        existing: String,
    },

    /// A placeholder field was never narrowed by an association
    #[error("Field {field} in {record} has no type and no association narrows it")]
    UnresolvedPlaceholder {
        /// Record name
        record: String,
        /// Field key
        field: String,
    },

    /// A type referenced by name is not in the request
    #[error("Unknown type {name} referenced from {record}")]
    UnknownType {
        /// Type name
        name: String,
        /// Record name
        record: String,
    },
}

/// A non-fatal mapping omission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Record or service the diagnostic is about
    pub subject: String,
    /// Field or method name
    pub member: String,
    /// Human-readable explanation
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.subject, self.member, self.message)
    }
}
