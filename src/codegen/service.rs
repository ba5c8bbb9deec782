//! Service bindings
//!
//! Methods of an autogen service are matched against the CRUD naming
//! conventions by [`classify`]. A matching method is bound to the generated
//! handler of its record; anything else becomes a stub that performs no
//! storage access and is meant to be written by hand.

use super::handler::{function_name, Operation};
use super::Scope;
use crate::context::CompilationContext;
use crate::descriptor::{has_explicit_presence, target_message};
use crate::naming::{db_name, field_ident, ident};
use crate::options::parse_method_options;
use crate::schema::{Diagnostic, OrmableType};
use crate::types::map_kind;
use crate::GeneratorError;
use heck::ToSnakeCase;
use proc_macro2::{Ident, TokenStream};
use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor};
use quote::{format_ident, quote};
use tracing::warn;

const EMPTY_TYPE: &str = "google.protobuf.Empty";
const FIELD_MASK_TYPE: &str = "google.protobuf.FieldMask";

/// Request fields a List method passes on to the handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListInputs {
    /// A `filter` string
    pub filter: bool,
    /// An `order_by` string
    pub order_by: bool,
    /// A `limit` integer
    pub limit: bool,
    /// An `offset` integer
    pub offset: bool,
    /// A `fields` selection
    pub fields: bool,
}

/// What a service method was recognized as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodClass {
    /// Bound to Create
    Create {
        /// Fully-qualified message name of the record
        record: String,
    },
    /// Bound to Read
    Read {
        /// Fully-qualified message name of the record
        record: String,
    },
    /// Update, or Patch when the request carries a field mask
    Update {
        /// Fully-qualified message name of the record
        record: String,
        /// Name of the request's field mask field
        patch: Option<String>,
    },
    /// Delete by `id`, or by `ids` when `set` is true
    Delete {
        /// Fully-qualified message name of the record
        record: String,
        /// Whether the request names a batch
        set: bool,
    },
    /// Bound to List
    List {
        /// Fully-qualified message name of the record
        record: String,
        /// Request fields passed on as list options
        inputs: ListInputs,
    },
    /// Left as a stub
    Unrecognized {
        /// Why no handler fits
        reason: String,
    },
}

/// The emitted server and what was bound
pub struct ServiceBinding {
    /// The server struct and its impl
    pub tokens: TokenStream,
    /// Classification of every method, in declaration order
    pub methods: Vec<(String, MethodClass)>,
    /// Methods left unbound
    pub diagnostics: Vec<Diagnostic>,
}

/// Classify one method by its name and message shapes
pub fn classify(
    ctx: &CompilationContext,
    method: &MethodDescriptor,
) -> Result<MethodClass, GeneratorError> {
    let name = method.name();
    let input = method.input();
    let output = method.output();
    let unrecognized = |reason: String| Ok(MethodClass::Unrecognized { reason });

    if name.starts_with("Create") {
        let Some(record) = record_field(ctx, &input, "payload", false) else {
            return unrecognized("request has no ormable payload field".to_string());
        };
        if !returns(ctx, &output, "result", false, record) {
            return unrecognized(format!("response has no result field of type {}", record.type_name));
        }
        return Ok(MethodClass::Create {
            record: record.full_name.clone(),
        });
    }

    if name.starts_with("Read") {
        let Some(record) = record_field(ctx, &output, "result", false) else {
            return unrecognized("response has no ormable result field".to_string());
        };
        if let Err(reason) = check_key(ctx, record, &input, "id", false) {
            return unrecognized(reason);
        }
        return Ok(MethodClass::Read {
            record: record.full_name.clone(),
        });
    }

    if name.starts_with("Update") {
        let Some(record) = record_field(ctx, &input, "payload", false) else {
            return unrecognized("request has no ormable payload field".to_string());
        };
        if !returns(ctx, &output, "result", false, record) {
            return unrecognized(format!("response has no result field of type {}", record.type_name));
        }
        if record.addressable_key().is_none() {
            return unrecognized(format!("{} has no addressable primary key", record.type_name));
        }
        let patch = input
            .fields()
            .find(|f| !f.is_list() && is_message(f, FIELD_MASK_TYPE))
            .map(|f| f.name().to_string());
        return Ok(MethodClass::Update {
            record: record.full_name.clone(),
            patch,
        });
    }

    if name.starts_with("Delete") {
        let set = name.starts_with("DeleteSet");
        let object_type = parse_method_options(method)?
            .map(|o| o.object_type)
            .unwrap_or_default();
        if object_type.is_empty() {
            return unrecognized("method has no object_type option".to_string());
        }
        let full_name = qualify(&object_type, method.parent_service().package_name());
        let Some(record) = ctx.ormable(&full_name) else {
            return unrecognized(format!("object_type {object_type} is not ormable"));
        };
        let key = if set { "ids" } else { "id" };
        if let Err(reason) = check_key(ctx, record, &input, key, set) {
            return unrecognized(reason);
        }
        return Ok(MethodClass::Delete {
            record: record.full_name.clone(),
            set,
        });
    }

    if name.starts_with("List") {
        let Some(record) = record_field(ctx, &output, "results", true) else {
            return unrecognized("response has no repeated ormable results field".to_string());
        };
        let string = |name: &str| {
            input
                .get_field_by_name(name)
                .map(|f| !f.is_list() && f.kind() == Kind::String)
                .unwrap_or(false)
        };
        let integer = |name: &str| {
            input
                .get_field_by_name(name)
                .map(|f| !f.is_list() && map_kind(&f.kind()).map(|s| s.is_integer()).unwrap_or(false))
                .unwrap_or(false)
        };
        let inputs = ListInputs {
            filter: string("filter"),
            order_by: string("order_by"),
            limit: integer("limit"),
            offset: integer("offset"),
            fields: input
                .get_field_by_name("fields")
                .map(|f| !f.is_list() && is_message(&f, FIELD_MASK_TYPE))
                .unwrap_or(false),
        };
        return Ok(MethodClass::List {
            record: record.full_name.clone(),
            inputs,
        });
    }

    unrecognized("name does not start with Create, Read, Update, Delete or List".to_string())
}

/// Emit `<Service>DefaultServer` for an autogen service
pub fn generate(
    ctx: &CompilationContext,
    scope: &Scope,
    service: &ServiceDescriptor,
) -> Result<ServiceBinding, GeneratorError> {
    let mut methods = Vec::new();
    let mut diagnostics = Vec::new();
    let mut hooked: Vec<&OrmableType> = Vec::new();
    let mut bodies = Vec::new();

    for method in service.methods() {
        let class = classify(ctx, &method)?;
        let record = match &class {
            MethodClass::Create { record }
            | MethodClass::Read { record }
            | MethodClass::Update { record, .. }
            | MethodClass::Delete { record, .. }
            | MethodClass::List { record, .. } => ctx.ormable(record),
            MethodClass::Unrecognized { reason } => {
                warn!(service = service.full_name(), method = method.name(), %reason, "method left unbound");
                diagnostics.push(Diagnostic {
                    subject: service.name().to_string(),
                    member: method.name().to_string(),
                    message: format!("not bound: {reason}"),
                });
                None
            }
        };
        if let Some(record) = record {
            if !hooked.iter().any(|r| r.full_name == record.full_name) {
                hooked.push(record);
            }
        }
        bodies.push(method_tokens(ctx, scope, &method, &class, record)?);
        methods.push((method.name().to_string(), class));
    }

    let server = format_ident!("{}DefaultServer", service.name());
    let doc = format!(" Default implementation of `{}`", service.full_name());
    let hook_fields = hooked.iter().map(|record| {
        let field = hooks_field(record);
        let path = scope.record_path(record);
        quote!(pub #field: rt::Hooks<#path>)
    });

    let tokens = quote! {
        #[doc = #doc]
        #[derive(Debug, Default)]
        pub struct #server {
            #(#hook_fields,)*
        }

        impl #server {
            #(#bodies)*
        }
    };

    Ok(ServiceBinding {
        tokens,
        methods,
        diagnostics,
    })
}

fn method_tokens(
    ctx: &CompilationContext,
    scope: &Scope,
    method: &MethodDescriptor,
    class: &MethodClass,
    record: Option<&OrmableType>,
) -> Result<TokenStream, GeneratorError> {
    let fn_name = ident(&method.name().to_snake_case());
    let request = message_type(scope, &method.input());
    let response = message_type(scope, &method.output());

    let Some(record) = record else {
        let reason = match class {
            MethodClass::Unrecognized { reason } => reason.as_str(),
            _ => "record not found",
        };
        let doc = format!(" Not bound to a generated handler: {reason}");
        return Ok(quote! {
            #[doc = #doc]
            pub fn #fn_name<S: rt::Session>(
                &self,
                _ctx: &rt::Context,
                _session: &mut S,
                _request: &#request,
            ) -> Result<#response, rt::Error> {
                Ok(Default::default())
            }
        });
    };

    let hooks = hooks_field(record);
    let handler = |op: Operation| scope.item_path(&record.package, &format_ident!("{}", function_name(op, record)));
    let message = ctx.graph().message(&record.full_name).ok_or_else(|| {
        GeneratorError::CodeGenError(format!("{} is not in the request", record.full_name))
    })?;
    let pb = scope.message_path(&message);

    let body = match class {
        MethodClass::Create { .. } => {
            let create = handler(Operation::Create);
            quote! {
                let payload = request.payload.as_ref().ok_or(rt::Error::NilArgument)?;
                let result = #create(ctx, session, &self.#hooks, payload)?;
                Ok(#response { result: Some(result), ..Default::default() })
            }
        }
        MethodClass::Read { .. } => {
            let read = handler(Operation::Read);
            let input = key_message(&pb, &method.input(), "id", quote!(request.id));
            quote! {
                let input = #input;
                let result = #read(ctx, session, &self.#hooks, &input, true)?;
                Ok(#response { result: Some(result), ..Default::default() })
            }
        }
        MethodClass::Update { patch, .. } => {
            let call = match patch {
                Some(mask) => {
                    let patch = handler(Operation::Patch);
                    let mask = ident(&db_name(mask));
                    quote! {
                        let mask = rt::FieldMask::from(request.#mask.clone().unwrap_or_default());
                        let result = #patch(ctx, session, &self.#hooks, payload, &mask)?;
                    }
                }
                None => {
                    let update = handler(Operation::StrictUpdate);
                    quote!(let result = #update(ctx, session, &self.#hooks, payload)?;)
                }
            };
            quote! {
                let payload = request.payload.as_ref().ok_or(rt::Error::NilArgument)?;
                #call
                Ok(#response { result: Some(result), ..Default::default() })
            }
        }
        MethodClass::Delete { set: false, .. } => {
            let delete = handler(Operation::Delete);
            let input = key_message(&pb, &method.input(), "id", quote!(request.id));
            quote! {
                let input = #input;
                #delete(ctx, session, &self.#hooks, &input)?;
                Ok(Default::default())
            }
        }
        MethodClass::Delete { set: true, .. } => {
            let delete_set = handler(Operation::DeleteSet);
            let input = key_message(&pb, &method.input(), "ids", quote!((*id)));
            quote! {
                let inputs: Vec<#pb> = request.ids.iter().map(|id| #input).collect();
                #delete_set(ctx, session, &self.#hooks, &inputs)?;
                Ok(Default::default())
            }
        }
        MethodClass::List { inputs, .. } => {
            let list = handler(Operation::List);
            let options = list_options(&method.input(), inputs);
            quote! {
                let options = #options;
                let results = #list(ctx, session, &self.#hooks, &options)?;
                Ok(#response { results, ..Default::default() })
            }
        }
        MethodClass::Unrecognized { .. } => quote!(Ok(Default::default())),
    };

    let doc = format!(" Bound to the generated handlers of `{}`", record.full_name);
    Ok(quote! {
        #[doc = #doc]
        #[allow(clippy::needless_update)]
        pub fn #fn_name<S: rt::Session>(
            &self,
            ctx: &rt::Context,
            session: &mut S,
            request: &#request,
        ) -> Result<#response, rt::Error> {
            #body
        }
    })
}

/// `rt::ListOptions` built from the request fields that exist
fn list_options(input: &MessageDescriptor, inputs: &ListInputs) -> TokenStream {
    let optional = |name: &str| {
        input
            .get_field_by_name(name)
            .map(|f| has_explicit_presence(&f))
            .unwrap_or(false)
    };

    let filter = inputs.filter.then(|| {
        if optional("filter") {
            quote!(filter: request.filter.clone().filter(|f| !f.is_empty()),)
        } else {
            quote!(filter: Some(request.filter.clone()).filter(|f| !f.is_empty()),)
        }
    });
    let order_by = inputs.order_by.then(|| {
        if optional("order_by") {
            quote!(order_by: rt::parse_order_by(request.order_by.as_deref().unwrap_or_default())?,)
        } else {
            quote!(order_by: rt::parse_order_by(&request.order_by)?,)
        }
    });
    let paging = |name: &str, enabled: bool| {
        enabled.then(|| {
            let field = ident(name);
            if optional(name) {
                quote!(#field: request.#field.filter(|v| *v > 0).map(|v| v as u64),)
            } else {
                quote!(#field: (request.#field > 0).then_some(request.#field as u64),)
            }
        })
    };
    let limit = paging("limit", inputs.limit);
    let offset = paging("offset", inputs.offset);
    let fields = inputs
        .fields
        .then(|| quote!(fields: request.fields.as_ref().map(|m| m.paths.clone()).unwrap_or_default(),));

    quote! {
        rt::ListOptions {
            #filter
            #order_by
            #limit
            #offset
            #fields
            ..Default::default()
        }
    }
}

/// A message of the record type with only its `id` set
fn key_message(pb: &TokenStream, input: &MessageDescriptor, field: &str, value: TokenStream) -> TokenStream {
    let owned = match input.get_field_by_name(field).map(|f| f.kind()) {
        Some(Kind::String | Kind::Bytes | Kind::Message(_)) => quote!(#value.clone()),
        _ => value,
    };
    quote!(#pb { id: #owned, ..Default::default() })
}

/// The request carries `key` typed like the record's `id`
fn check_key(
    ctx: &CompilationContext,
    record: &OrmableType,
    input: &MessageDescriptor,
    key: &str,
    repeated: bool,
) -> Result<(), String> {
    if record.addressable_key().is_none() {
        return Err(format!("{} has no addressable primary key", record.type_name));
    }
    let request_key = input
        .get_field_by_name(key)
        .filter(|f| f.is_list() == repeated)
        .ok_or_else(|| format!("request has no {key} field"))?;
    let record_id = ctx
        .graph()
        .message(&record.full_name)
        .and_then(|m| m.get_field_by_name("id"))
        .filter(|f| !f.is_list())
        .ok_or_else(|| format!("{} has no id field", record.type_name))?;
    if request_key.kind() != record_id.kind() || has_explicit_presence(&request_key) != has_explicit_presence(&record_id) {
        return Err(format!("{key} does not match the type of {}.id", record.type_name));
    }
    Ok(())
}

/// The ormable record behind a message field
fn record_field<'a>(
    ctx: &'a CompilationContext,
    message: &MessageDescriptor,
    name: &str,
    repeated: bool,
) -> Option<&'a OrmableType> {
    let field = message.get_field_by_name(name)?;
    if field.is_list() != repeated {
        return None;
    }
    ctx.ormable(target_message(&field)?.full_name())
}

fn returns(
    ctx: &CompilationContext,
    message: &MessageDescriptor,
    name: &str,
    repeated: bool,
    record: &OrmableType,
) -> bool {
    record_field(ctx, message, name, repeated)
        .map(|r| r.full_name == record.full_name)
        .unwrap_or(false)
}

fn is_message(field: &FieldDescriptor, full_name: &str) -> bool {
    target_message(field)
        .map(|m| m.full_name() == full_name)
        .unwrap_or(false)
}

/// Resolve a possibly package-relative type name
fn qualify(name: &str, package: &str) -> String {
    match name.strip_prefix('.') {
        Some(full) => full.to_string(),
        None if name.contains('.') || package.is_empty() => name.to_string(),
        None => format!("{package}.{name}"),
    }
}

fn message_type(scope: &Scope, message: &MessageDescriptor) -> TokenStream {
    if message.full_name() == EMPTY_TYPE {
        quote!(())
    } else {
        scope.message_path(message)
    }
}

fn hooks_field(record: &OrmableType) -> Ident {
    field_ident(&format!("{}Hooks", record.type_name))
}
