//! Code generation for storage records
//!
//! One `.orm.rs` file is emitted per input file that declares ormable
//! messages or an autogen service. The file is meant to be included in the
//! same module as the prost output for its package, so message types are
//! referenced exactly the way prost lays them out.

pub mod column;
pub mod handler;
pub mod record;
pub mod relation;
pub mod service;

use crate::config::Config;
use crate::context::CompilationContext;
use crate::naming::ident;
use crate::options::parse_server_options;
use crate::schema::{Diagnostic, OrmableType};
use crate::types::{Scalar, StorageType};
use crate::GeneratorError;
use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Ident, Span, TokenStream};
use prost_reflect::{FileDescriptor, MessageDescriptor};
use prost_types::compiler::code_generator_response::File;
use quote::quote;
use tracing::debug;

/// First line of every generated file
pub const HEADER: &str = "// Code generated by protoc-gen-ormable. DO NOT EDIT.";

/// Output file name for an input file (`a/b.proto` -> `a/b.orm.rs`)
pub fn output_name(proto: &str) -> String {
    let stem = proto.strip_suffix(".proto").unwrap_or(proto);
    format!("{stem}.orm.rs")
}

/// Resolves type paths relative to the package a file is generated into
pub struct Scope {
    package: Vec<String>,
    runtime: syn::Path,
}

impl Scope {
    /// Scope of a package, with the runtime module at `runtime`
    pub fn new(package: &str, runtime: &str) -> Result<Self, GeneratorError> {
        let runtime = syn::parse_str(runtime)
            .map_err(|e| GeneratorError::InvalidConfig(format!("runtime path {runtime:?}: {e}")))?;
        Ok(Self {
            package: split_package(package),
            runtime,
        })
    }

    /// Path of an item declared at package level in `package`
    pub fn item_path(&self, package: &str, item: &Ident) -> TokenStream {
        let target = split_package(package);
        let common = self
            .package
            .iter()
            .zip(&target)
            .take_while(|(a, b)| a == b)
            .count();

        let supers = (common..self.package.len()).map(|_| Ident::new("super", Span::call_site()));
        let modules = target[common..].iter().map(|m| ident(&m.to_snake_case()));
        quote!(#(#supers::)* #(#modules::)* #item)
    }

    /// Path of the prost type of a message
    pub fn message_path(&self, message: &MessageDescriptor) -> TokenStream {
        let package = message.package_name();
        let local = message
            .full_name()
            .strip_prefix(package)
            .unwrap_or(message.full_name())
            .trim_start_matches('.');
        let mut parts: Vec<&str> = local.split('.').collect();
        let name = parts.pop().unwrap_or(local);

        let item = ident(&name.to_upper_camel_case());
        if parts.is_empty() {
            return self.item_path(package, &item);
        }
        // Nested messages live in a module named after their parent.
        let mut modules: Vec<Ident> = parts.iter().map(|p| ident(&p.to_snake_case())).collect();
        let first = modules.remove(0);
        let base = self.item_path(package, &first);
        quote!(#base #(::#modules)* :: #item)
    }

    /// Path of a generated storage record
    pub fn record_path(&self, record: &OrmableType) -> TokenStream {
        self.item_path(&record.package, &ident(&record.record_name))
    }

    /// The runtime module path
    pub fn runtime(&self) -> &syn::Path {
        &self.runtime
    }
}

fn split_package(package: &str) -> Vec<String> {
    package
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rust type of a storage field
pub fn storage_type(
    ctx: &CompilationContext,
    scope: &Scope,
    ty: &StorageType,
) -> Result<TokenStream, GeneratorError> {
    Ok(match ty {
        StorageType::Scalar(s) => scalar_type(*s),
        StorageType::Optional(s) => {
            let inner = scalar_type(*s);
            quote!(Option<#inner>)
        }
        StorageType::Timestamp => quote!(Option<rt::DateTime<rt::Utc>>),
        StorageType::Uuid => quote!(rt::Uuid),
        StorageType::OptionalUuid => quote!(Option<rt::Uuid>),
        StorageType::Json => quote!(Option<rt::JsonValue>),
        StorageType::Record { target, repeated } => {
            let record = ctx.ormable(target).ok_or_else(|| {
                GeneratorError::CodeGenError(format!("{target} has no storage record"))
            })?;
            let path = scope.record_path(record);
            if *repeated {
                quote!(Vec<#path>)
            } else {
                quote!(Option<Box<#path>>)
            }
        }
        StorageType::Placeholder => {
            return Err(GeneratorError::CodeGenError(
                "placeholder field reached code generation".into(),
            ))
        }
        StorageType::Custom(path) => {
            let ty: syn::Type = syn::parse_str(path)
                .map_err(|e| GeneratorError::UnknownFieldType(format!("{path}: {e}")))?;
            quote!(#ty)
        }
    })
}

fn scalar_type(scalar: Scalar) -> TokenStream {
    match scalar {
        Scalar::Bool => quote!(bool),
        Scalar::I32 => quote!(i32),
        Scalar::I64 => quote!(i64),
        Scalar::U32 => quote!(u32),
        Scalar::U64 => quote!(u64),
        Scalar::F32 => quote!(f32),
        Scalar::F64 => quote!(f64),
        Scalar::String => quote!(String),
        Scalar::Bytes => quote!(Vec<u8>),
    }
}

/// Generate the storage code of one input file
///
/// Returns `None` when the file has nothing to emit.
pub fn generate_file(
    ctx: &CompilationContext,
    config: &Config,
    file: &FileDescriptor,
) -> Result<Option<File>, GeneratorError> {
    let records: Vec<&OrmableType> = ctx.file_ormables(file.name()).collect();
    let mut services = Vec::new();
    for service in file.services() {
        if parse_server_options(&service)?.map(|o| o.autogen).unwrap_or(false) {
            services.push(service);
        }
    }
    if records.is_empty() && services.is_empty() {
        return Ok(None);
    }

    let scope = Scope::new(file.package_name(), &config.runtime_path)?;
    let runtime = scope.runtime();
    let mut items = vec![quote! {
        #[allow(unused_imports)]
        use #runtime as rt;
    }];

    for record in &records {
        items.push(record::generate(ctx, &scope, record)?);
        for handler in handler::plan(ctx, &scope, record)? {
            items.push(handler.tokens);
        }
    }

    let mut diagnostics: Vec<Diagnostic> = ctx
        .diagnostics()
        .iter()
        .filter(|d| records.iter().any(|r| r.record_name == d.subject))
        .cloned()
        .collect();

    for service in &services {
        let binding = service::generate(ctx, &scope, service)?;
        items.push(binding.tokens);
        diagnostics.extend(binding.diagnostics);
    }

    let tokens = quote!(#(#items)*);
    let syntax: syn::File = syn::parse2(tokens)
        .map_err(|e| GeneratorError::CodeGenError(format!("{}: {e}", file.name())))?;

    let mut content = format!("{HEADER}\n// source: {}\n", file.name());
    if !config.quiet {
        for diagnostic in &diagnostics {
            content.push_str(&format!("// {diagnostic}\n"));
        }
    }
    content.push('\n');
    content.push_str(&prettyplease::unparse(&syntax));

    let name = output_name(file.name());
    debug!(file = %name, records = records.len(), services = services.len(), "generated file");

    Ok(Some(File {
        name: Some(name),
        content: Some(content),
        ..Default::default()
    }))
}
