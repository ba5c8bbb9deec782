//! Naming conventions shared by the schema passes and code generation

use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Ident, Span};

/// Storage field key for a source field name (`parent_id` -> `ParentId`)
pub fn field_key(name: &str) -> String {
    name.to_upper_camel_case()
}

/// Database name for an identifier (`ParentId` -> `parent_id`)
pub fn db_name(name: &str) -> String {
    name.to_snake_case()
}

/// Plural form of a word
pub fn plural(word: &str) -> String {
    pluralizer::pluralize(word, 2, false)
}

/// Singular form of a word
pub fn singular(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}

/// Default table name for a type (`UserProfile` -> `user_profiles`)
pub fn table_name(type_name: &str) -> String {
    plural(&db_name(type_name))
}

/// Name of the generated storage record for a type
pub fn record_name(type_name: &str) -> String {
    format!("{}Orm", type_name.to_upper_camel_case())
}

/// Rust identifier for a name, matching how prost escapes keywords
pub fn ident(name: &str) -> Ident {
    match name {
        "self" | "super" | "crate" | "Self" => Ident::new(&format!("{name}_"), Span::call_site()),
        _ if syn::parse_str::<Ident>(name).is_ok() => Ident::new(name, Span::call_site()),
        _ => Ident::new_raw(name, Span::call_site()),
    }
}

/// Rust identifier for a storage field key
pub fn field_ident(key: &str) -> Ident {
    ident(&db_name(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key() {
        assert_eq!(field_key("parent_id"), "ParentId");
        assert_eq!(field_key("ParentId"), "ParentId");
        assert_eq!(field_key("id"), "Id");
    }

    #[test]
    fn test_db_name() {
        assert_eq!(db_name("ParentId"), "parent_id");
        assert_eq!(db_name("AccountId"), "account_id");
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("Point"), "points");
        assert_eq!(table_name("UserProfile"), "user_profiles");
    }

    #[test]
    fn test_singular_and_plural() {
        assert_eq!(singular("friends"), "friend");
        assert_eq!(plural("group"), "groups");
    }

    #[test]
    fn test_keyword_idents() {
        assert_eq!(ident("type").to_string(), "r#type");
        assert_eq!(ident("self").to_string(), "self_");
        assert_eq!(ident("name").to_string(), "name");
    }
}
