//! Read-only access to the input schema graph
//!
//! Request files are loaded into a [`DescriptorPool`] seeded with the
//! annotation descriptors, so every type reference resolves and every option
//! extension can be decoded.

use crate::options::annotation_pool;
use crate::GeneratorError;
use prost::Message;
use prost_reflect::{
    Cardinality, DescriptorPool, FieldDescriptor, FileDescriptor, Kind, MessageDescriptor,
};
use prost_types::compiler::CodeGeneratorRequest;
use std::collections::HashSet;

/// Just the name of a `FileDescriptorProto`, decoded without touching the rest
#[derive(Clone, PartialEq, prost::Message)]
struct FileName {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
}

/// The schema graph of one compilation run
#[derive(Clone)]
pub struct SchemaGraph {
    pool: DescriptorPool,
    files: Vec<String>,
    to_generate: HashSet<String>,
}

impl SchemaGraph {
    /// Build the graph from a decoded request
    ///
    /// Files importing `ormable/options.proto` get their annotations
    /// interpreted into extension fields as they are added to the pool.
    pub fn from_request(request: &CodeGeneratorRequest) -> Result<Self, GeneratorError> {
        let mut pool = annotation_pool();
        let mut files = Vec::with_capacity(request.proto_file.len());

        for file in &request.proto_file {
            let name = file.name().to_string();
            if pool.get_file_by_name(&name).is_none() {
                pool.add_file_descriptor_proto(file.clone())
                    .map_err(|e| GeneratorError::DecodeError(format!("{name}: {e}")))?;
            }
            files.push(name);
        }

        Ok(Self::new(pool, files, &request.file_to_generate))
    }

    /// Build the graph from raw `FileDescriptorProto` bytes, keeping extensions
    pub fn from_raw_files(
        proto_files: &[Vec<u8>],
        file_to_generate: &[String],
    ) -> Result<Self, GeneratorError> {
        let mut pool = annotation_pool();
        let mut files = Vec::with_capacity(proto_files.len());

        for bytes in proto_files {
            let name = FileName::decode(bytes.as_slice())
                .map_err(|e| GeneratorError::DecodeError(e.to_string()))?
                .name
                .unwrap_or_default();
            if pool.get_file_by_name(&name).is_none() {
                pool.decode_file_descriptor_proto(bytes.as_slice())
                    .map_err(|e| GeneratorError::DecodeError(format!("{name}: {e}")))?;
            }
            files.push(name);
        }

        Ok(Self::new(pool, files, file_to_generate))
    }

    fn new(pool: DescriptorPool, files: Vec<String>, file_to_generate: &[String]) -> Self {
        Self {
            pool,
            files,
            to_generate: file_to_generate.iter().cloned().collect(),
        }
    }

    /// All request files, in request order
    pub fn files(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.files
            .iter()
            .filter_map(|name| self.pool.get_file_by_name(name))
    }

    /// The files code should be emitted for
    pub fn files_to_generate(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.files()
            .filter(|file| self.to_generate.contains(file.name()))
    }

    /// Every message declared in the request, nested messages included
    ///
    /// Map entry messages are skipped.
    pub fn messages(&self) -> Vec<MessageDescriptor> {
        let mut out = Vec::new();
        for file in self.files() {
            for message in file.messages() {
                collect_messages(message, &mut out);
            }
        }
        out
    }

    /// Look up a message by fully-qualified name
    pub fn message(&self, full_name: &str) -> Option<MessageDescriptor> {
        self.pool
            .get_message_by_name(full_name.trim_start_matches('.'))
    }

    /// The underlying descriptor pool
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

fn collect_messages(message: MessageDescriptor, out: &mut Vec<MessageDescriptor>) {
    if message.is_map_entry() {
        return;
    }
    let children: Vec<_> = message.child_messages().collect();
    out.push(message);
    for child in children {
        collect_messages(child, out);
    }
}

/// The message a field refers to, if any
pub fn target_message(field: &FieldDescriptor) -> Option<MessageDescriptor> {
    match field.kind() {
        Kind::Message(message) => Some(message),
        _ => None,
    }
}

/// Type name of a message with its enclosing messages joined (`Outer.Inner` -> `OuterInner`)
pub fn type_name(message: &MessageDescriptor) -> String {
    let package = message.package_name();
    let full = message.full_name();
    let local = if package.is_empty() {
        full
    } else {
        full.strip_prefix(package)
            .map(|s| s.trim_start_matches('.'))
            .unwrap_or(full)
    };
    local.split('.').collect()
}

/// Whether a field is a member of a real (not proto3 `optional`) oneof
pub fn in_real_oneof(field: &FieldDescriptor) -> bool {
    field.containing_oneof().is_some() && !field.field_descriptor_proto().proto3_optional()
}

/// Whether prost generates a singular message field as `Option<Box<T>>`
///
/// prost boxes a field when its type reaches the containing message again
/// through singular message fields.
pub fn is_boxed(field: &FieldDescriptor) -> bool {
    if field.is_list() {
        return false;
    }
    let Some(target) = target_message(field) else {
        return false;
    };
    let owner = field.parent_message().full_name().to_string();
    reaches(&target, &owner, &mut HashSet::new())
}

fn reaches(from: &MessageDescriptor, to: &str, seen: &mut HashSet<String>) -> bool {
    if from.full_name() == to {
        return true;
    }
    if !seen.insert(from.full_name().to_string()) {
        return false;
    }
    from.fields()
        .filter(|f| !f.is_list())
        .filter_map(|f| target_message(&f))
        .any(|m| reaches(&m, to, seen))
}

/// Whether a scalar field is generated by prost as `Option<T>`
pub fn has_explicit_presence(field: &FieldDescriptor) -> bool {
    !field.is_list()
        && !matches!(field.kind(), Kind::Message(_))
        && field.cardinality() != Cardinality::Required
        && field.supports_presence()
}
