//! protoc-gen-ormable - A protoc plugin deriving storage records and handlers
//!
//! This binary reads a CodeGeneratorRequest from stdin and writes a
//! CodeGeneratorResponse to stdout, following the protoc plugin protocol.
//! Logs go to stderr, filtered by `ORMABLE_LOG`.

use prost::Message;
use prost_types::compiler::CodeGeneratorResponse;
use std::io::{self, Read, Write};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_env("ORMABLE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        error!("protoc-gen-ormable: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;

    let response =
        protoc_gen_ormable::generate_from_bytes(&buf).unwrap_or_else(|e| CodeGeneratorResponse {
            error: Some(e.to_string()),
            ..Default::default()
        });

    for f in &response.file {
        debug!(file = f.name.as_deref().unwrap_or("<unnamed>"), "generated");
    }
    if let Some(err) = &response.error {
        error!("{err}");
    }

    let mut out = Vec::new();
    response.encode(&mut out)?;
    io::stdout().write_all(&out)?;

    Ok(())
}
