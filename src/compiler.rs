//! Schema Compiler
//!
//! Turns a model's primary schema plus its dependency set into a
//! [`CompiledValidator`]. Reference handling happens up front (see
//! [`crate::refs`]) so missing or unreachable schemas surface as compile
//! errors rather than at example-validation time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsonschema::{JSONSchema, SchemaResolver, SchemaResolverError};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{CompilerOptions, ValidatorConfig};
use crate::error::{Result, ValidatorError};
use crate::files;
use crate::refs::{self, RefError, RefResolver, RefTable, DEFAULT_BASE};
use crate::registry::SchemaSet;
use crate::remote::SchemaFetcher;

/// One schema violation found in an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// JSON pointer to the offending value
    pub instance_path: String,
    /// JSON pointer to the schema keyword that failed
    pub schema_path: String,
    pub message: String,
}

/// A compiled primary schema with its dependencies resolved
pub struct CompiledValidator {
    schema_file: PathBuf,
    schema: JSONSchema,
    all_errors: bool,
}

impl std::fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("schema_file", &self.schema_file)
            .field("all_errors", &self.all_errors)
            .finish()
    }
}

impl CompiledValidator {
    /// The primary schema this validator was built from
    pub fn schema_file(&self) -> &Path {
        &self.schema_file
    }

    /// Validate an instance. With `allErrors` disabled only the first
    /// violation is returned.
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), Vec<Violation>> {
        let limit = if self.all_errors { usize::MAX } else { 1 };
        match self.schema.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .take(limit)
                .map(|e| Violation {
                    instance_path: e.instance_path.to_string(),
                    schema_path: e.schema_path.to_string(),
                    message: e.to_string(),
                })
                .collect()),
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.schema.is_valid(instance)
    }
}

/// Serves `$ref` targets from the table built before compilation
struct TableResolver {
    table: RefTable,
}

impl SchemaResolver for TableResolver {
    fn resolve(
        &self,
        _root_schema: &Value,
        url: &Url,
        original_reference: &str,
    ) -> std::result::Result<Arc<Value>, SchemaResolverError> {
        self.table
            .lookup(url)
            .ok_or_else(|| anyhow::anyhow!("cannot resolve reference {}", original_reference))
    }
}

/// Compiles primary schemas with the configured reference policies
pub struct SchemaCompiler<'a> {
    options: &'a CompilerOptions,
    fetcher: Option<&'a dyn SchemaFetcher>,
}

impl<'a> SchemaCompiler<'a> {
    /// The fetcher is only consulted when `resolveRemoteSchemas` is enabled
    pub fn new(config: &'a ValidatorConfig, fetcher: &'a dyn SchemaFetcher) -> Self {
        let fetcher = if config.validator.resolve_remote_schemas {
            Some(fetcher)
        } else {
            None
        };
        Self {
            options: &config.compiler,
            fetcher,
        }
    }

    /// Compile `primary` against the documents in `dependencies`.
    ///
    /// Unreadable files are fatal (`FileRead`). Everything else is scoped
    /// to the model: `CompileIntegrity`, `Compile` or `RemoteSchema`.
    pub fn compile(&self, primary: &Path, dependencies: &SchemaSet) -> Result<CompiledValidator> {
        let schema_name = primary.display().to_string();
        let mut schema = files::read_json(primary)?;

        if !(schema.is_object() || schema.is_boolean()) {
            return Err(ValidatorError::CompileIntegrity {
                schema: schema_name,
            });
        }

        refs::apply_extend_refs(&mut schema, self.options.extend_refs)
            .map_err(|e| compile_error(&schema_name, e))?;

        let mut table = RefTable::new();
        for document in dependencies.iter() {
            let mut value = document.value.clone();
            refs::apply_extend_refs(&mut value, self.options.extend_refs)
                .map_err(|e| compile_error(&document.path.display().to_string(), e))?;
            table.register(Arc::new(value), document.id(), &document.file_name());
        }
        let primary_id = schema
            .get("$id")
            .or_else(|| schema.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        table.register(
            Arc::new(schema.clone()),
            primary_id.as_deref(),
            &files::file_name(primary),
        );

        let base = Url::parse(DEFAULT_BASE).map_err(|e| ValidatorError::Compile {
            schema: schema_name.clone(),
            reason: e.to_string(),
        })?;
        let table = RefResolver::new(table, self.fetcher, self.options.missing_refs)
            .resolve(&schema, &base)
            .map_err(|e| compile_error(&schema_name, e))?;
        debug!(schema = %schema_name, documents = table.len(), "references resolved");
        table.embed_anchors(&mut schema);

        let mut options = JSONSchema::options();
        options.with_resolver(TableResolver { table });
        let compiled = options
            .compile(&schema)
            .map_err(|e| ValidatorError::Compile {
                schema: schema_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(CompiledValidator {
            schema_file: primary.to_path_buf(),
            schema: compiled,
            all_errors: self.options.all_errors,
        })
    }
}

fn compile_error(schema: &str, error: RefError) -> ValidatorError {
    match error {
        RefError::Remote { uri, reason } => ValidatorError::RemoteSchema { uri, reason },
        other => ValidatorError::Compile {
            schema: schema.to_string(),
            reason: other.to_string(),
        },
    }
}
