//! Association descriptors for storage records

use crate::context::CompilationContext;
use crate::naming::db_name;
use crate::schema::{Association, AssociationKind, Field, OrmableType};
use crate::GeneratorError;
use proc_macro2::TokenStream;
use quote::quote;

/// `rt::AssociationMeta` literal for one association field
pub fn association(
    ctx: &CompilationContext,
    field: &Field,
    association: &Association,
) -> Result<TokenStream, GeneratorError> {
    let target = ctx.ormable(&association.target).ok_or_else(|| {
        GeneratorError::CodeGenError(format!("{} has no storage record", association.target))
    })?;

    let kind = match association.kind {
        AssociationKind::HasOne => quote!(rt::AssociationKind::HasOne),
        AssociationKind::HasMany => quote!(rt::AssociationKind::HasMany),
        AssociationKind::BelongsTo => quote!(rt::AssociationKind::BelongsTo),
        AssociationKind::ManyToMany => quote!(rt::AssociationKind::ManyToMany),
    };
    let field_name = db_name(&field.name);
    let target_table = &target.table;
    let foreign_key = db_name(&association.foreign_key);
    let association_key = db_name(&association.association_key);
    let position_field = match &association.position_field {
        Some(p) => {
            let p = db_name(p);
            quote!(Some(#p))
        }
        None => quote!(None),
    };
    let join = match &association.join {
        Some(join) => {
            let (table, fk, afk) = (&join.name, &join.foreign_key, &join.association_foreign_key);
            quote! {
                Some(rt::JoinTableMeta {
                    table: #table,
                    foreign_key: #fk,
                    association_foreign_key: #afk,
                })
            }
        }
        None => quote!(None),
    };
    let flags = association.flags;
    let (preload, replace, append, clear) = (flags.preload, flags.replace, flags.append, flags.clear);

    Ok(quote! {
        rt::AssociationMeta {
            kind: #kind,
            field: #field_name,
            target_table: #target_table,
            foreign_key: #foreign_key,
            association_key: #association_key,
            position_field: #position_field,
            join: #join,
            preload: #preload,
            replace: #replace,
            append: #append,
            clear: #clear,
        }
    })
}

/// All association literals of a record, in declaration order
pub fn associations(
    ctx: &CompilationContext,
    record: &OrmableType,
) -> Result<Vec<TokenStream>, GeneratorError> {
    record
        .associations()
        .map(|(field, assoc)| association(ctx, field, assoc))
        .collect()
}
