//! protoc-gen-ormable library
//!
//! Derives storage records from annotated Protocol Buffer messages. Messages
//! marked `(ormable.record).ormable` get a storage record, their message
//! fields are resolved into has-one, has-many, belongs-to and many-to-many
//! associations, and each record gets a set of data-access handlers written
//! against the [`runtime`] session vocabulary. Services marked
//! `(ormable.server).autogen` get a default server bound to those handlers.

#![deny(missing_docs)]

pub mod codegen;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod generator;
pub mod naming;
pub mod options;
pub mod runtime;
pub mod schema;
pub mod types;

pub use context::CompilationContext;
pub use schema::{Diagnostic, SchemaError};

use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use thiserror::Error;

/// Errors that can occur during code generation
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Failed to parse protobuf options/extensions
    #[error("Failed to parse options: {0}")]
    OptionsParseError(String),

    /// Encountered an unknown or unsupported field type
    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    /// Invalid plugin configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General code generation failure
    #[error("Code generation failed: {0}")]
    CodeGenError(String),

    /// Failed to decode protobuf message
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The schema cannot be turned into storage records
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Generate storage records from a protobuf CodeGeneratorRequest
///
/// This is the main entry point for the code generator.
pub fn generate(request: CodeGeneratorRequest) -> Result<CodeGeneratorResponse, GeneratorError> {
    generator::generate(request)
}

/// Generate storage records from raw protobuf bytes
///
/// This entry point preserves extension data by keeping the proto files
/// undecoded until they reach the descriptor pool.
pub fn generate_from_bytes(bytes: &[u8]) -> Result<CodeGeneratorResponse, GeneratorError> {
    generator::generate_from_bytes(bytes)
}
