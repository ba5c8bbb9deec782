//! Build script for protoc-gen-ormable
//!
//! This compiles proto/ormable/options.proto and proto/ormable/types.proto to
//! generate the Rust types for the annotation extensions, and writes the
//! matching file descriptor set so the extensions can be decoded at runtime.

use std::io::Result;
use std::path::PathBuf;

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    prost_build::Config::new()
        .file_descriptor_set_path(out_dir.join("file_descriptor_set.bin"))
        .compile_protos(
            &["proto/ormable/options.proto", "proto/ormable/types.proto"],
            &["proto"],
        )?;

    println!("cargo:rerun-if-changed=proto/ormable/options.proto");
    println!("cargo:rerun-if-changed=proto/ormable/types.proto");

    Ok(())
}
