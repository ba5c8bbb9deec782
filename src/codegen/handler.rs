//! Handler shapes
//!
//! Every storage record gets a fixed set of data-access functions written
//! against the runtime [`Session`](crate::runtime::Session) vocabulary. A
//! [`HandlerShape`] lists the steps of one function in order, and the emitted
//! code is produced step by step from the same plan, so the shape can be
//! inspected without reading generated text.

use super::{Scope, record::source_message};
use crate::context::CompilationContext;
use crate::naming::{db_name, field_ident, ident};
use crate::schema::{AssociationKind, Field, FieldSource, OrmableType};
use crate::types::{Scalar, StorageType};
use crate::GeneratorError;
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

/// Operations generated for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Insert a record with its children
    Create,
    /// Load one record by primary key
    Read,
    /// Save a record, leaving stored children the input omits
    Update,
    /// Save a record and replace its has-one and has-many children
    StrictUpdate,
    /// Delete one record by primary key
    Delete,
    /// Delete once per element of a batch
    DeleteSet,
    /// Load every record of the caller's account
    List,
    /// Merge the masked fields of the input into the stored record
    Patch,
    /// Patch once per element of a batch
    PatchSet,
    /// Copy masked fields between two messages
    ApplyFieldMask,
}

impl Operation {
    /// Every operation, in emission order
    pub const ALL: [Operation; 10] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::StrictUpdate,
        Operation::Delete,
        Operation::DeleteSet,
        Operation::List,
        Operation::Patch,
        Operation::PatchSet,
        Operation::ApplyFieldMask,
    ];

    /// Snake case name used in function names
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::StrictUpdate => "strict_update",
            Operation::Delete => "delete",
            Operation::DeleteSet => "delete_set",
            Operation::List => "list",
            Operation::Patch => "patch",
            Operation::PatchSet => "patch_set",
            Operation::ApplyFieldMask => "apply_field_mask",
        }
    }

    /// Whether the operation addresses a row by primary key
    pub fn requires_primary_key(&self) -> bool {
        !matches!(
            self,
            Operation::Create | Operation::List | Operation::ApplyFieldMask
        )
    }
}

/// How a query decides whether to load associations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preload {
    /// Taken from the `preload` argument
    Argument,
    /// Associations are always loaded
    Always,
    /// Associations are never loaded
    Never,
}

/// One step of a generated handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Reject an empty batch or batches of different lengths
    CheckArguments,
    /// Resolve the account id before touching storage
    ResolveAccount,
    /// Convert the input message into a storage record
    ToRecord,
    /// Stamp the caller's account on the record and its account-scoped
    /// children
    ScopeAccount,
    /// Start from an empty filter record
    EmptyFilter,
    /// Reject a zero primary key
    CheckPrimaryKey,
    /// Run the hooks registered for a point
    Hook(&'static str),
    /// Fail unless the row exists for the caller's account
    VerifyExists,
    /// Delete the stored children of an association
    CascadeDelete {
        /// Association field key
        field: String,
        /// Only when the field mask selects the association
        masked: bool,
    },
    /// Set the position of every element of an ordered has-many to its index
    RenumberPositions {
        /// Association field key
        field: String,
        /// Position field key on the target
        position: String,
    },
    /// Insert the record
    Create,
    /// Save the record and its loaded associations
    Save,
    /// Build the query from the filter record
    BuildQuery {
        /// Whether associations are loaded
        preload: Preload,
    },
    /// Order by primary key unless the caller gave an ordering
    DefaultOrder {
        /// Primary key column
        column: String,
    },
    /// Order an ordered has-many by its position column
    OrderAssociation {
        /// Association field key
        field: String,
        /// Position column
        column: String,
    },
    /// Load the first matching row
    First,
    /// Load every matching row
    Find,
    /// Delete the row by primary key
    DeleteByKey,
    /// Load the stored row and merge in the masked fields of the input
    ApplyMask,
    /// Copy one field when the mask selects it
    CopyField(String),
    /// Run another handler once per element of the batch
    ForEach(Operation),
    /// Convert the result back into a message
    FromRecord,
}

/// The plan of one generated function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerShape {
    /// The operation the function implements
    pub operation: Operation,
    /// Generated function name
    pub function: String,
    /// Steps in emission order
    pub steps: Vec<Step>,
}

/// A planned handler and its emitted code
#[derive(Debug, Clone)]
pub struct Handler {
    /// The plan the code was emitted from
    pub shape: HandlerShape,
    /// The function item
    pub tokens: TokenStream,
}

/// Name of the function generated for an operation
pub fn function_name(operation: Operation, record: &OrmableType) -> String {
    format!("default_{}_{}", operation.name(), db_name(&record.type_name))
}

/// Plan and emit every handler a record supports
///
/// Create, List and ApplyFieldMask are always generated; the rest need a
/// primary key.
pub fn plan(
    ctx: &CompilationContext,
    scope: &Scope,
    record: &OrmableType,
) -> Result<Vec<Handler>, GeneratorError> {
    let emitter = Emitter::new(ctx, scope, record)?;
    Operation::ALL
        .iter()
        .filter(|op| !op.requires_primary_key() || emitter.pk.is_some())
        .map(|op| emitter.emit(*op))
        .collect()
}

/// Handler shapes of a record without the emitted code
pub fn shapes(
    ctx: &CompilationContext,
    scope: &Scope,
    record: &OrmableType,
) -> Result<Vec<HandlerShape>, GeneratorError> {
    Ok(plan(ctx, scope, record)?
        .into_iter()
        .map(|h| h.shape)
        .collect())
}

/// An ordered has-many
struct Ordered {
    field: String,
    position: String,
    /// `position: i64` converted to the position field type
    value: TokenStream,
}

/// A has-one or has-many whose children StrictUpdate replaces
struct Child {
    kind: AssociationKind,
    field: String,
    target: TokenStream,
    foreign_key: Ident,
    /// Foreign key value taken from the `orm` variable
    value: TokenStream,
    scoped_by_account: bool,
}

#[derive(Default)]
struct Body {
    steps: Vec<Step>,
    tokens: Vec<TokenStream>,
}

impl Body {
    fn push(&mut self, step: Step, tokens: TokenStream) {
        self.steps.push(step);
        self.tokens.push(tokens);
    }
}

struct Emitter<'a> {
    record: &'a OrmableType,
    name: Ident,
    pb: TokenStream,
    pk: Option<&'a Field>,
    ordered: Vec<Ordered>,
    children: Vec<Child>,
}

impl<'a> Emitter<'a> {
    fn new(
        ctx: &'a CompilationContext,
        scope: &Scope,
        record: &'a OrmableType,
    ) -> Result<Self, GeneratorError> {
        let message = source_message(ctx, record)?;
        let mut ordered = Vec::new();
        let mut children = Vec::new();

        for (field, association) in record.associations() {
            if !matches!(
                association.kind,
                AssociationKind::HasMany | AssociationKind::HasOne
            ) {
                continue;
            }
            let target = ctx.ormable(&association.target).ok_or_else(|| {
                GeneratorError::CodeGenError(format!(
                    "{} has no storage record",
                    association.target
                ))
            })?;
            let missing = |name: &str, on: &OrmableType| {
                GeneratorError::CodeGenError(format!("{} has no field {name}", on.record_name))
            };
            let key = record
                .field(&association.association_key)
                .ok_or_else(|| missing(&association.association_key, record))?;
            let foreign_key = target
                .field(&association.foreign_key)
                .ok_or_else(|| missing(&association.foreign_key, target))?;

            if let Some(position) = &association.position_field {
                let position_field = target
                    .field(position)
                    .ok_or_else(|| missing(position, target))?;
                ordered.push(Ordered {
                    field: field.name.clone(),
                    position: position.clone(),
                    value: position_value(&position_field.ty),
                });
            }

            let key_ident = field_ident(&key.name);
            children.push(Child {
                kind: association.kind,
                field: field.name.clone(),
                target: scope.record_path(target),
                foreign_key: field_ident(&foreign_key.name),
                value: convert_key(&key.ty, &foreign_key.ty, quote!(orm.#key_ident)),
                scoped_by_account: record.multi_account && target.multi_account,
            });
        }

        Ok(Self {
            record,
            name: ident(&record.record_name),
            pb: scope.message_path(&message),
            pk: record.addressable_key(),
            ordered,
            children,
        })
    }

    fn emit(&self, operation: Operation) -> Result<Handler, GeneratorError> {
        let mut body = Body::default();
        let name = &self.name;
        let pb = &self.pb;

        let (params, output) = match operation {
            Operation::Create => {
                self.resolve_account(&mut body);
                self.to_record(&mut body, "orm", quote!(input));
                self.hook(&mut body, "BeforeCreate", "orm");
                self.renumber(&mut body, "orm");
                body.push(Step::Create, quote!(session.create(&mut orm)?;));
                self.hook(&mut body, "AfterCreate", "orm");
                body.push(Step::FromRecord, quote!(orm.to_pb()));
                (quote!(input: &#pb), quote!(#pb))
            }
            Operation::Read => {
                self.resolve_account(&mut body);
                self.to_record(&mut body, "filter", quote!(input));
                self.check_primary_key(&mut body, "filter")?;
                self.hook(&mut body, "BeforeRead", "filter");
                body.push(
                    Step::BuildQuery {
                        preload: Preload::Argument,
                    },
                    quote!(let mut query = rt::Query::new(filter).preload(preload);),
                );
                self.order_associations(&mut body);
                body.push(Step::First, quote!(let mut orm = session.first(&query)?;));
                self.hook(&mut body, "AfterRead", "orm");
                body.push(Step::FromRecord, quote!(orm.to_pb()));
                (quote!(input: &#pb, preload: bool), quote!(#pb))
            }
            Operation::Update | Operation::StrictUpdate => {
                self.resolve_account(&mut body);
                self.to_record(&mut body, "orm", quote!(input));
                self.check_primary_key(&mut body, "orm")?;
                if self.record.multi_account {
                    let filter = self.key_filter("orm")?;
                    body.push(
                        Step::VerifyExists,
                        quote!(session.first(&rt::Query::new(#filter))?;),
                    );
                }
                self.hook(&mut body, "BeforeUpdate", "orm");
                if operation == Operation::StrictUpdate {
                    for child in &self.children {
                        self.cascade_delete(&mut body, child, false);
                    }
                }
                self.renumber(&mut body, "orm");
                body.push(Step::Save, quote!(session.save(&mut orm)?;));
                self.hook(&mut body, "AfterUpdate", "orm");
                body.push(Step::FromRecord, quote!(orm.to_pb()));
                (quote!(input: &#pb), quote!(#pb))
            }
            Operation::Delete => {
                self.resolve_account(&mut body);
                self.to_record(&mut body, "orm", quote!(input));
                self.check_primary_key(&mut body, "orm")?;
                self.hook(&mut body, "BeforeDelete", "orm");
                let filter = self.key_filter("orm")?;
                body.push(Step::DeleteByKey, quote!(session.delete(&#filter)?;));
                self.hook(&mut body, "AfterDelete", "orm");
                body.push(Step::FromRecord, quote!(Ok(())));
                (quote!(input: &#pb), quote!(()))
            }
            Operation::DeleteSet => {
                body.push(
                    Step::CheckArguments,
                    quote! {
                        if inputs.is_empty() {
                            return Err(rt::Error::NilArgument);
                        }
                    },
                );
                let delete = format_ident!("{}", function_name(Operation::Delete, self.record));
                body.push(
                    Step::ForEach(Operation::Delete),
                    quote! {
                        for input in inputs {
                            #delete(ctx, session, hooks, input)?;
                        }
                        Ok(())
                    },
                );
                (quote!(inputs: &[#pb]), quote!(()))
            }
            Operation::List => {
                self.resolve_account(&mut body);
                let scope = self.record.multi_account.then(|| quote!(filter.account_id = account_id;));
                body.push(
                    Step::EmptyFilter,
                    quote! {
                        let mut filter = #name::default();
                        #scope
                    },
                );
                self.hook(&mut body, "BeforeList", "filter");
                body.push(
                    Step::BuildQuery {
                        preload: Preload::Never,
                    },
                    quote!(let mut query = rt::Query::new(filter).with_options(options.clone());),
                );
                if let Some(pk) = self.pk {
                    let column = pk.column();
                    body.push(
                        Step::DefaultOrder {
                            column: column.clone(),
                        },
                        quote! {
                            if !options.has_order() {
                                query = query.order_by(rt::Order::asc(#column));
                            }
                        },
                    );
                }
                self.order_associations(&mut body);
                body.push(Step::Find, quote!(let rows = session.find(&query)?;));
                body.steps.push(Step::Hook("AfterList"));
                body.push(
                    Step::FromRecord,
                    quote! {
                        let mut results = Vec::with_capacity(rows.len());
                        for mut row in rows {
                            hooks.run(rt::HookPoint::AfterList, ctx, &mut row)?;
                            results.push(row.to_pb()?);
                        }
                        Ok(results)
                    },
                );
                (quote!(options: &rt::ListOptions), quote!(Vec<#pb>))
            }
            Operation::Patch => {
                self.resolve_account(&mut body);
                self.to_record(&mut body, "patch", quote!(input));
                self.check_primary_key(&mut body, "patch")?;
                self.hook(&mut body, "BeforePatch", "patch");
                let filter = self.key_filter("patch")?;
                body.push(
                    Step::BuildQuery {
                        preload: Preload::Always,
                    },
                    quote!(let query = rt::Query::new(#filter).preload(true);),
                );
                body.push(Step::First, quote!(let current = session.first(&query)?;));
                let apply = format_ident!("{}", function_name(Operation::ApplyFieldMask, self.record));
                body.push(
                    Step::ApplyMask,
                    quote! {
                        let mut merged = current.to_pb()?;
                        #apply(&mut merged, &patch.to_pb()?, mask)?;
                    },
                );
                self.to_record(&mut body, "orm", quote!(&merged));
                for child in self.children.iter().filter(|c| c.kind == AssociationKind::HasMany) {
                    self.cascade_delete(&mut body, child, true);
                }
                self.renumber(&mut body, "orm");
                body.push(Step::Save, quote!(session.save(&mut orm)?;));
                self.hook(&mut body, "AfterPatch", "orm");
                body.push(Step::FromRecord, quote!(orm.to_pb()));
                (quote!(input: &#pb, mask: &rt::FieldMask), quote!(#pb))
            }
            Operation::PatchSet => {
                body.push(
                    Step::CheckArguments,
                    quote! {
                        if inputs.len() != masks.len() {
                            return Err(rt::Error::ArgumentMismatch(format!(
                                "{} objects and {} field masks",
                                inputs.len(),
                                masks.len()
                            )));
                        }
                    },
                );
                let patch = format_ident!("{}", function_name(Operation::Patch, self.record));
                body.push(
                    Step::ForEach(Operation::Patch),
                    quote! {
                        let mut results = Vec::with_capacity(inputs.len());
                        for (input, mask) in inputs.iter().zip(masks) {
                            results.push(#patch(ctx, session, hooks, input, mask)?);
                        }
                        Ok(results)
                    },
                );
                (
                    quote!(inputs: &[#pb], masks: &[rt::FieldMask]),
                    quote!(Vec<#pb>),
                )
            }
            Operation::ApplyFieldMask => return Ok(self.apply_field_mask()),
        };

        let function = function_name(operation, self.record);
        let fn_ident = format_ident!("{function}");
        let doc = doc(operation, &self.record.full_name);
        let tokens = &body.tokens;
        let tokens = quote! {
            #[doc = #doc]
            #[allow(unused_mut, clippy::needless_update)]
            pub fn #fn_ident<S: rt::Session>(
                ctx: &rt::Context,
                session: &mut S,
                hooks: &rt::Hooks<#name>,
                #params
            ) -> Result<#output, rt::Error> {
                #(#tokens)*
            }
        };

        Ok(Handler {
            shape: HandlerShape {
                operation,
                function,
                steps: body.steps,
            },
            tokens,
        })
    }

    /// Copy masked fields between two messages; no storage access
    fn apply_field_mask(&self) -> Handler {
        let pb = &self.pb;
        let mut body = Body::default();
        for field in self.record.fields.values() {
            let FieldSource::Message { proto_name } = &field.source else {
                continue;
            };
            let pf = ident(&db_name(proto_name));
            let value = if is_copy_message_field(&field.ty) {
                quote!(patcher.#pf)
            } else {
                quote!(patcher.#pf.clone())
            };
            body.push(
                Step::CopyField(proto_name.clone()),
                quote! {
                    if mask.contains(#proto_name) {
                        patchee.#pf = #value;
                    }
                },
            );
        }

        let function = function_name(Operation::ApplyFieldMask, self.record);
        let fn_ident = format_ident!("{function}");
        let doc = doc(Operation::ApplyFieldMask, &self.record.full_name);
        let tokens = &body.tokens;
        Handler {
            tokens: quote! {
                #[doc = #doc]
                #[allow(unused_variables)]
                pub fn #fn_ident(
                    patchee: &mut #pb,
                    patcher: &#pb,
                    mask: &rt::FieldMask,
                ) -> Result<(), rt::Error> {
                    #(#tokens)*
                    Ok(())
                }
            },
            shape: HandlerShape {
                operation: Operation::ApplyFieldMask,
                function,
                steps: body.steps,
            },
        }
    }

    fn resolve_account(&self, body: &mut Body) {
        if self.record.multi_account {
            body.push(
                Step::ResolveAccount,
                quote!(let account_id = ctx.account_id()?.to_string();),
            );
        }
    }

    fn to_record(&self, body: &mut Body, var: &str, input: TokenStream) {
        let var = format_ident!("{var}");
        let name = &self.name;
        body.push(
            Step::ToRecord,
            quote!(let mut #var = #name::from_pb(#input)?;),
        );
        if self.record.multi_account {
            body.push(
                Step::ScopeAccount,
                quote!(#var.scope_account(&account_id);),
            );
        }
    }

    fn check_primary_key(&self, body: &mut Body, var: &str) -> Result<(), GeneratorError> {
        let pk = field_ident(&self.primary_key()?.name);
        let var = format_ident!("{var}");
        body.push(
            Step::CheckPrimaryKey,
            quote! {
                if rt::ZeroValue::is_zero(&#var.#pk) {
                    return Err(rt::Error::EmptyId);
                }
            },
        );
        Ok(())
    }

    fn hook(&self, body: &mut Body, point: &'static str, var: &str) {
        let point_ident = format_ident!("{point}");
        let var = format_ident!("{var}");
        body.push(
            Step::Hook(point),
            quote!(hooks.run(rt::HookPoint::#point_ident, ctx, &mut #var)?;),
        );
    }

    fn renumber(&self, body: &mut Body, var: &str) {
        let var = format_ident!("{var}");
        for ordered in &self.ordered {
            let field = field_ident(&ordered.field);
            let position = field_ident(&ordered.position);
            let value = &ordered.value;
            body.push(
                Step::RenumberPositions {
                    field: ordered.field.clone(),
                    position: ordered.position.clone(),
                },
                quote!(rt::renumber_positions(&mut #var.#field, |item, position| item.#position = #value);),
            );
        }
    }

    fn order_associations(&self, body: &mut Body) {
        for ordered in &self.ordered {
            let field = db_name(&ordered.field);
            let column = db_name(&ordered.position);
            body.push(
                Step::OrderAssociation {
                    field: ordered.field.clone(),
                    column: column.clone(),
                },
                quote!(query = query.order_association(#field, rt::Order::asc(#column));),
            );
        }
    }

    fn cascade_delete(&self, body: &mut Body, child: &Child, masked: bool) {
        let target = &child.target;
        let foreign_key = &child.foreign_key;
        let value = &child.value;
        let account = child
            .scoped_by_account
            .then(|| quote!(account_id: orm.account_id.clone(),));
        let delete = quote! {
            session.delete(&#target {
                #foreign_key: #value,
                #account
                ..Default::default()
            })?;
        };
        let tokens = if masked {
            let path = self
                .record
                .field(&child.field)
                .and_then(Field::source_field)
                .unwrap_or_default()
                .to_string();
            quote! {
                if mask.contains(#path) {
                    #delete
                }
            }
        } else {
            delete
        };
        body.push(
            Step::CascadeDelete {
                field: child.field.clone(),
                masked,
            },
            tokens,
        );
    }

    /// A record literal holding only the primary key and the account
    fn key_filter(&self, var: &str) -> Result<TokenStream, GeneratorError> {
        let pk = self.primary_key()?;
        let pk_ident = field_ident(&pk.name);
        let var = format_ident!("{var}");
        let value = owned(&pk.ty, quote!(#var.#pk_ident));
        let name = &self.name;
        let account = (self.record.multi_account && pk.source != FieldSource::Account)
            .then(|| quote!(account_id: #var.account_id.clone(),));
        Ok(quote! {
            #name {
                #pk_ident: #value,
                #account
                ..Default::default()
            }
        })
    }

    fn primary_key(&self) -> Result<&Field, GeneratorError> {
        self.pk.ok_or_else(|| {
            GeneratorError::CodeGenError(format!("{} has no primary key", self.record.record_name))
        })
    }
}

fn doc(operation: Operation, full_name: &str) -> String {
    let what = match operation {
        Operation::Create => "Insert a new",
        Operation::Read => "Load one stored",
        Operation::Update => "Save a",
        Operation::StrictUpdate => "Save a",
        Operation::Delete => "Delete one stored",
        Operation::DeleteSet => "Delete a batch of stored",
        Operation::List => "List stored",
        Operation::Patch => "Apply a field mask to a stored",
        Operation::PatchSet => "Apply field masks to a batch of stored",
        Operation::ApplyFieldMask => "Copy masked fields between two",
    };
    let tail = match operation {
        Operation::StrictUpdate => ", replacing its has-one and has-many children",
        _ => "",
    };
    format!(" {what} `{full_name}`{tail}")
}

/// Whether a value of this storage type is `Copy`
fn is_copy(ty: &StorageType) -> bool {
    match ty {
        StorageType::Scalar(s) | StorageType::Optional(s) => {
            !matches!(s, Scalar::String | Scalar::Bytes)
        }
        StorageType::Uuid | StorageType::OptionalUuid => true,
        _ => false,
    }
}

/// Whether the message field behind this storage type is `Copy`
///
/// UUID, JSON and timestamp values are messages on the protobuf side.
fn is_copy_message_field(ty: &StorageType) -> bool {
    matches!(ty, StorageType::Scalar(s) | StorageType::Optional(s) if !matches!(s, Scalar::String | Scalar::Bytes))
}

/// An owned copy of a field value
fn owned(ty: &StorageType, expr: TokenStream) -> TokenStream {
    if is_copy(ty) {
        expr
    } else {
        quote!(#expr.clone())
    }
}

/// Convert an association key value into the foreign key's type
fn convert_key(from: &StorageType, to: &StorageType, expr: TokenStream) -> TokenStream {
    let value = owned(from, expr);
    if from == to {
        value
    } else if *to == from.nullable() {
        quote!(Some(#value))
    } else if *from == to.nullable() {
        quote!(#value.unwrap_or_default())
    } else {
        quote!(#value.into())
    }
}

/// `position: i64` as a value of the position field's type
fn position_value(ty: &StorageType) -> TokenStream {
    let cast = |s: &Scalar| -> TokenStream {
        if *s == Scalar::I64 {
            quote!(position)
        } else {
            let ty = super::scalar_type(*s);
            quote!(position as #ty)
        }
    };
    match ty {
        StorageType::Optional(s) => {
            let v = cast(s);
            quote!(Some(#v))
        }
        StorageType::Scalar(s) => cast(s),
        _ => quote!(position),
    }
}
