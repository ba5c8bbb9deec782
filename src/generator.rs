//! Plugin entry points
//!
//! Drives one compilation: builds the schema graph, runs the schema passes
//! and emits one file per requested input that has something to generate.

use crate::codegen::generate_file;
use crate::config::Config;
use crate::context::CompilationContext;
use crate::descriptor::SchemaGraph;
use crate::GeneratorError;
use prost::Message;
use prost_types::compiler::code_generator_response::{Feature, File};
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use tracing::{debug, info};

/// `CodeGeneratorRequest` with the proto files left undecoded
///
/// Decoding `FileDescriptorProto` through prost drops unknown fields, which is
/// where protoc puts option extensions.
#[derive(Clone, PartialEq, prost::Message)]
struct RawRequest {
    #[prost(string, repeated, tag = "1")]
    file_to_generate: Vec<String>,
    #[prost(string, optional, tag = "2")]
    parameter: Option<String>,
    #[prost(bytes = "vec", repeated, tag = "15")]
    proto_file: Vec<Vec<u8>>,
}

/// Generate from a decoded request
///
/// Annotations written as option text are interpreted when the files are
/// added to the pool.
pub fn generate(request: CodeGeneratorRequest) -> Result<CodeGeneratorResponse, GeneratorError> {
    let config = Config::parse(request.parameter.as_deref())?;
    let graph = SchemaGraph::from_request(&request)?;
    Ok(respond(run(graph, &config)))
}

/// Generate from the raw request bytes protoc writes to stdin
pub fn generate_from_bytes(bytes: &[u8]) -> Result<CodeGeneratorResponse, GeneratorError> {
    let request =
        RawRequest::decode(bytes).map_err(|e| GeneratorError::DecodeError(e.to_string()))?;
    let config = Config::parse(request.parameter.as_deref())?;
    let graph = SchemaGraph::from_raw_files(&request.proto_file, &request.file_to_generate)?;
    Ok(respond(run(graph, &config)))
}

/// Compile and emit every requested file
pub fn run(graph: SchemaGraph, config: &Config) -> Result<Vec<File>, GeneratorError> {
    let ctx = CompilationContext::compile(graph)?;
    info!(
        records = ctx.ormables().count(),
        diagnostics = ctx.diagnostics().len(),
        "schema resolved"
    );

    let mut files = Vec::new();
    for file in ctx.graph().files_to_generate() {
        match generate_file(&ctx, config, &file)? {
            Some(generated) => files.push(generated),
            None => debug!(file = file.name(), "nothing to generate"),
        }
    }
    Ok(files)
}

/// Schema errors abort the run and are reported through `error`
fn respond(result: Result<Vec<File>, GeneratorError>) -> CodeGeneratorResponse {
    let supported_features = Some(Feature::Proto3Optional as u64);
    match result {
        Ok(file) => CodeGeneratorResponse {
            file,
            supported_features,
            ..Default::default()
        },
        Err(e) => CodeGeneratorResponse {
            error: Some(e.to_string()),
            supported_features,
            ..Default::default()
        },
    }
}
