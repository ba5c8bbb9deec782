//! Storage record structs and their message conversions

use super::{column, relation, storage_type, Scope};
use crate::context::CompilationContext;
use crate::descriptor::{is_boxed, target_message};
use crate::naming::{db_name, field_ident, ident};
use crate::schema::field::ACCOUNT_ID;
use crate::schema::{AssociationKind, Field, FieldSource, OrmableType};
use crate::types::{Scalar, StorageType};
use crate::GeneratorError;
use proc_macro2::TokenStream;
use prost_reflect::{FieldDescriptor, MessageDescriptor};
use quote::quote;

/// Emit the record struct, its `rt::Record` impl and conversions
pub fn generate(
    ctx: &CompilationContext,
    scope: &Scope,
    record: &OrmableType,
) -> Result<TokenStream, GeneratorError> {
    let message = source_message(ctx, record)?;
    let name = ident(&record.record_name);
    let pb = scope.message_path(&message);

    let mut fields = Vec::with_capacity(record.fields.len());
    for field in record.fields.values() {
        let field_name = field_ident(&field.name);
        let ty = storage_type(ctx, scope, &field.ty)?;
        let doc = match &field.source {
            FieldSource::Injected { by } => Some(format!(" Key maintained by associations of `{by}`")),
            FieldSource::Account => Some(" Account the row belongs to".to_string()),
            _ => None,
        }
        .map(|doc| quote!(#[doc = #doc]));
        fields.push(quote! {
            #doc
            pub #field_name: #ty
        });
    }

    let doc = format!(" Storage record of `{}`", record.full_name);
    let table = &record.table;
    let columns = column::columns(record);
    let associations = relation::associations(ctx, record)?;

    let mut from_pb = Vec::new();
    let mut to_pb = Vec::new();
    for field in record.fields.values() {
        let FieldSource::Message { proto_name } = &field.source else {
            continue;
        };
        let descriptor = message.get_field_by_name(proto_name).ok_or_else(|| {
            GeneratorError::CodeGenError(format!("{} has no field {proto_name}", record.full_name))
        })?;
        let (from, to) = conversion(ctx, scope, field, &descriptor)?;
        from_pb.push(from);
        to_pb.push(to);
    }

    let scope_account = record.multi_account.then(|| scope_account(ctx, record));

    Ok(quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct #name {
            #(#fields,)*
        }

        impl rt::Record for #name {
            const TABLE: &'static str = #table;

            fn columns() -> &'static [rt::Column] {
                const COLUMNS: &[rt::Column] = &[#(#columns),*];
                COLUMNS
            }

            fn associations() -> &'static [rt::AssociationMeta] {
                const ASSOCIATIONS: &[rt::AssociationMeta] = &[#(#associations),*];
                ASSOCIATIONS
            }
        }

        impl #name {
            /// Convert a message into its storage record
            #[allow(clippy::needless_update)]
            pub fn from_pb(pb: &#pb) -> Result<Self, rt::Error> {
                Ok(Self {
                    #(#from_pb,)*
                    ..Default::default()
                })
            }

            /// Convert the storage record back into its message
            #[allow(clippy::needless_update)]
            pub fn to_pb(&self) -> Result<#pb, rt::Error> {
                Ok(#pb {
                    #(#to_pb,)*
                    ..Default::default()
                })
            }

            #scope_account
        }
    })
}

/// `scope_account` of a multi-account record
///
/// Stamps the account on the record and on every has-one or has-many child
/// that is itself multi-account, so nested rows are written and deleted under
/// the same account as their owner.
fn scope_account(ctx: &CompilationContext, record: &OrmableType) -> TokenStream {
    let account = field_ident(ACCOUNT_ID);
    let children = record.associations().filter_map(|(field, association)| {
        if !matches!(association.kind, AssociationKind::HasMany | AssociationKind::HasOne) {
            return None;
        }
        if !ctx.ormable(&association.target)?.multi_account {
            return None;
        }
        let rf = field_ident(&field.name);
        Some(match association.kind {
            AssociationKind::HasMany => quote! {
                for child in &mut self.#rf {
                    child.scope_account(account_id);
                }
            },
            _ => quote! {
                if let Some(child) = self.#rf.as_deref_mut() {
                    child.scope_account(account_id);
                }
            },
        })
    });
    quote! {
        /// Stamp the account on this record and its account-scoped children
        pub fn scope_account(&mut self, account_id: &str) {
            self.#account = account_id.to_string();
            #(#children)*
        }
    }
}

/// The message a record was derived from
pub fn source_message(
    ctx: &CompilationContext,
    record: &OrmableType,
) -> Result<MessageDescriptor, GeneratorError> {
    ctx.graph().message(&record.full_name).ok_or_else(|| {
        GeneratorError::CodeGenError(format!("{} is not in the request", record.full_name))
    })
}

/// Field initializers for `from_pb` and `to_pb`
fn conversion(
    ctx: &CompilationContext,
    scope: &Scope,
    field: &Field,
    descriptor: &FieldDescriptor,
) -> Result<(TokenStream, TokenStream), GeneratorError> {
    let rf = field_ident(&field.name);
    let pf = ident(&db_name(descriptor.name()));
    let value_type = || {
        target_message(descriptor)
            .map(|m| scope.message_path(&m))
            .ok_or_else(|| {
                GeneratorError::CodeGenError(format!("{} is not a message field", descriptor.full_name()))
            })
    };

    Ok(match &field.ty {
        StorageType::Scalar(Scalar::String | Scalar::Bytes)
        | StorageType::Optional(Scalar::String | Scalar::Bytes) => (
            quote!(#rf: pb.#pf.clone()),
            quote!(#pf: self.#rf.clone()),
        ),
        StorageType::Scalar(_) | StorageType::Optional(_) => {
            (quote!(#rf: pb.#pf), quote!(#pf: self.#rf))
        }
        StorageType::Timestamp => (
            quote!(#rf: rt::timestamp_to_datetime(pb.#pf.as_ref())?),
            quote!(#pf: rt::datetime_to_timestamp(self.#rf.as_ref())),
        ),
        StorageType::Uuid => {
            let path = value_type()?;
            (
                quote!(#rf: rt::uuid_from_pb(pb.#pf.as_ref().map(|v| v.value.as_str()))?),
                quote!(#pf: Some(#path { value: rt::uuid_to_pb(&self.#rf) })),
            )
        }
        StorageType::OptionalUuid => {
            let path = value_type()?;
            (
                quote!(#rf: rt::optional_uuid_from_pb(pb.#pf.as_ref().map(|v| v.value.as_str()))?),
                quote!(#pf: self.#rf.as_ref().map(|v| #path { value: rt::uuid_to_pb(v) })),
            )
        }
        StorageType::Json => {
            let path = value_type()?;
            (
                quote!(#rf: rt::json_from_pb(pb.#pf.as_ref().map(|v| v.value.as_str()))?),
                quote!(#pf: rt::json_to_pb(self.#rf.as_ref()).map(|value| #path { value })),
            )
        }
        StorageType::Record { target, repeated } => {
            let target = ctx.ormable(target).ok_or_else(|| {
                GeneratorError::CodeGenError(format!("{target} has no storage record"))
            })?;
            let path = scope.record_path(target);
            if *repeated {
                (
                    quote!(#rf: pb.#pf.iter().map(#path::from_pb).collect::<Result<Vec<_>, _>>()?),
                    quote!(#pf: self.#rf.iter().map(#path::to_pb).collect::<Result<Vec<_>, _>>()?),
                )
            } else {
                let boxed = is_boxed(descriptor).then(|| quote!(.map(Box::new)));
                (
                    quote!(#rf: pb.#pf.as_ref().map(|v| #path::from_pb(v).map(Box::new)).transpose()?),
                    quote!(#pf: self.#rf.as_deref().map(#path::to_pb).transpose()? #boxed),
                )
            }
        }
        StorageType::Placeholder | StorageType::Custom(_) => {
            return Err(GeneratorError::CodeGenError(format!(
                "{} cannot be converted from its message",
                field.name
            )))
        }
    })
}
