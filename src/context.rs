//! Per-run compilation state
//!
//! A [`CompilationContext`] owns the registry of storage records for one
//! request. It is built once per run, so nothing leaks between requests
//! handled by the same process.

use crate::descriptor::SchemaGraph;
use crate::options::{parse_record_options, RecordOptions};
use crate::schema::association::{resolve_associations, Registry};
use crate::schema::field::{map_basic_fields, new_record};
use crate::schema::{Diagnostic, OrmableType, SchemaError};
use crate::types::StorageType;
use crate::GeneratorError;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Registry of storage records plus everything needed to build them
pub struct CompilationContext {
    graph: SchemaGraph,
    registry: Registry,
    record_options: IndexMap<String, RecordOptions>,
    diagnostics: Vec<Diagnostic>,
}

impl CompilationContext {
    /// An empty context over a schema graph
    pub fn new(graph: SchemaGraph) -> Self {
        Self {
            graph,
            registry: Registry::new(),
            record_options: IndexMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Run every pass, failing on the first fatal schema error
    pub fn compile(graph: SchemaGraph) -> Result<Self, GeneratorError> {
        let mut ctx = Self::new(graph);
        ctx.register()?;
        ctx.map_fields()?;
        ctx.resolve_associations()?;
        ctx.check_placeholders()?;
        ctx.check_primary_keys();
        Ok(ctx)
    }

    /// Register an empty record for every ormable message in the request
    pub fn register(&mut self) -> Result<(), GeneratorError> {
        for message in self.graph.messages() {
            let Some(options) = parse_record_options(&message)? else {
                continue;
            };
            if !options.ormable {
                continue;
            }
            let record = new_record(&message, &options);
            debug!(message = message.full_name(), record = %record.record_name, table = %record.table, "registered ormable type");
            self.registry.insert(record.full_name.clone(), record);
            self.record_options
                .insert(message.full_name().to_string(), options);
        }
        Ok(())
    }

    /// Map the basic fields of every registered record
    ///
    /// Requires [`register`](Self::register) to have seen every file, since a
    /// field referring to an ormable type is deferred rather than dropped.
    pub fn map_fields(&mut self) -> Result<(), GeneratorError> {
        let ormable: HashSet<String> = self.registry.keys().cloned().collect();
        let mut found = Vec::new();
        for (name, options) in &self.record_options {
            let message = self.graph.message(name).ok_or_else(|| unknown(name))?;
            let record = self.registry.get_mut(name).ok_or_else(|| unknown(name))?;
            map_basic_fields(
                record,
                &message,
                options,
                |n| ormable.contains(n),
                &mut found,
            )?;
        }
        self.report(found);
        Ok(())
    }

    /// Resolve the associations of every registered record
    ///
    /// Safe to run again: resolved names are pinned on the first run.
    pub fn resolve_associations(&mut self) -> Result<(), GeneratorError> {
        let names: Vec<String> = self.registry.keys().cloned().collect();
        for name in names {
            let message = self.graph.message(&name).ok_or_else(|| unknown(&name))?;
            let mut found = Vec::new();
            resolve_associations(&mut self.registry, &message, &mut found)?;
            self.report(found);
        }
        Ok(())
    }

    fn check_placeholders(&self) -> Result<(), SchemaError> {
        for record in self.registry.values() {
            if let Some(field) = record
                .fields
                .values()
                .find(|f| f.ty == StorageType::Placeholder)
            {
                return Err(SchemaError::UnresolvedPlaceholder {
                    record: record.record_name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Report primary keys whose type has no zero value
    ///
    /// Such records keep Create, List and ApplyFieldMask only.
    fn check_primary_keys(&mut self) {
        let found = self
            .registry
            .values()
            .filter_map(|record| {
                let pk = record.primary_key().ok()?;
                record.addressable_key().is_none().then(|| Diagnostic {
                    subject: record.record_name.clone(),
                    member: pk.name.clone(),
                    message: format!(
                        "primary key type `{}` has no zero value, key-addressed handlers are not generated",
                        pk.ty
                    ),
                })
            })
            .collect();
        self.report(found);
    }

    fn report(&mut self, found: Vec<Diagnostic>) {
        for diagnostic in found {
            if !self.diagnostics.contains(&diagnostic) {
                warn!("{diagnostic}");
                self.diagnostics.push(diagnostic);
            }
        }
    }

    /// The record derived from a message, by fully-qualified name
    pub fn ormable(&self, full_name: &str) -> Option<&OrmableType> {
        self.registry.get(full_name.trim_start_matches('.'))
    }

    /// Every record, in registration order
    pub fn ormables(&self) -> impl Iterator<Item = &OrmableType> {
        self.registry.values()
    }

    /// Records derived from messages of one file
    pub fn file_ormables<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a OrmableType> {
        self.registry.values().filter(move |r| r.file == file)
    }

    /// Non-fatal diagnostics collected so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The schema graph being compiled
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }
}

fn unknown(name: &str) -> SchemaError {
    SchemaError::UnknownType {
        name: name.to_string(),
        record: name.to_string(),
    }
}
