//! Column descriptors for storage records
//!
//! Every non-association field of a record becomes one `rt::Column` entry
//! carrying its column name and tag metadata.

use crate::naming::db_name;
use crate::schema::{Field, OrmableType};
use crate::types::StorageType;
use proc_macro2::TokenStream;
use quote::quote;

/// Fields of a record that are stored as columns
///
/// Association fields and fields tagged `ignore` are left out.
pub fn stored_fields(record: &OrmableType) -> impl Iterator<Item = &Field> {
    record
        .fields
        .values()
        .filter(|f| !matches!(f.ty, StorageType::Record { .. }) && !f.tag.ignore)
}

/// `rt::Column` literal for one field
pub fn column(field: &Field, primary_key: bool) -> TokenStream {
    let name = field.column();
    let field_name = db_name(&field.name);
    let tag = &field.tag;
    let not_null = tag.not_null;
    let unique = tag.unique;
    let auto_increment = tag.auto_increment;
    let column_type = optional_str(&tag.r#type);
    let default = optional_str(&tag.default);
    let size = if tag.size > 0 {
        let size = tag.size;
        quote!(Some(#size))
    } else {
        quote!(None)
    };

    quote! {
        rt::Column {
            name: #name,
            field: #field_name,
            primary_key: #primary_key,
            not_null: #not_null,
            unique: #unique,
            auto_increment: #auto_increment,
            column_type: #column_type,
            size: #size,
            default: #default,
        }
    }
}

/// All column literals of a record, in declaration order
pub fn columns(record: &OrmableType) -> Vec<TokenStream> {
    let primary_key = record.primary_key().ok().map(|f| f.name.clone());
    stored_fields(record)
        .map(|f| column(f, primary_key.as_deref() == Some(f.name.as_str())))
        .collect()
}

fn optional_str(value: &str) -> TokenStream {
    if value.is_empty() {
        quote!(None)
    } else {
        quote!(Some(#value))
    }
}
