//! Schema Registry
//!
//! Tracks the schemas a model's primary schema may reference:
//! - **local**: other `*-schema.json` files next to the primary schema
//! - **common**: `dmv:importSchemas`, shared by every model
//! - **external**: third-party schemas stored under the model's
//!   external-schema folders
//!
//! Documents are kept in that order. When two documents claim the same
//! `$id`, the later one wins inside the compiler.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::files;

/// Naming convention of a model's own schemas
pub const LOCAL_SCHEMA_PATTERN: &str = "*-schema.json";

/// Where a schema document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrigin {
    Local,
    Common,
    External,
}

/// A parsed schema document and its source file
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub path: PathBuf,
    pub value: Value,
    pub origin: SchemaOrigin,
}

impl SchemaDocument {
    /// Load a document from disk; unreadable files are fatal
    pub fn load(path: &Path, origin: SchemaOrigin) -> Result<Self> {
        let value = files::read_json(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            value,
            origin,
        })
    }

    /// The document's `$id` (draft-06+) or `id` (draft-04)
    pub fn id(&self) -> Option<&str> {
        self.value
            .get("$id")
            .or_else(|| self.value.get("id"))
            .and_then(|v| v.as_str())
    }

    /// File name of the document
    pub fn file_name(&self) -> String {
        files::file_name(&self.path)
    }
}

/// Ordered schema documents available to one compilation
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    documents: Vec<SchemaDocument>,
}

impl SchemaSet {
    /// Append a document unless the same file is already present
    pub fn push(&mut self, document: SchemaDocument) {
        if self.documents.iter().any(|d| d.path == document.path) {
            debug!(path = %document.path.display(), "schema already registered");
            return;
        }
        self.documents.push(document);
    }

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaDocument> {
        self.documents.iter()
    }
}

/// Local schema files of a model directory (not recursive), sorted by name
pub fn collect_local_schemas(model_dir: &Path) -> Vec<PathBuf> {
    files::matching_files(model_dir, LOCAL_SCHEMA_PATTERN)
}

/// Load the `importSchemas` documents, relative to `cwd`.
///
/// Returns nothing when `loadModelCommonSchemas` is disabled. A configured
/// file that does not exist is skipped; one that exists but cannot be
/// parsed is fatal.
pub fn collect_common_schemas(config: &ValidatorConfig, cwd: &Path) -> Result<Vec<SchemaDocument>> {
    let settings = &config.validator;
    if !settings.load_model_common_schemas {
        debug!("common schema loading disabled");
        return Ok(Vec::new());
    }

    let paths = files::resolve(&settings.import_schemas, cwd);
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            warn!(path = %path.display(), "imported schema not found, skipping");
            continue;
        }
        documents.push(SchemaDocument::load(&path, SchemaOrigin::Common)?);
    }
    Ok(documents)
}

/// Load every `*.json` document below the model's external-schema folders.
pub fn collect_external_schemas(
    model_dir: &Path,
    config: &ValidatorConfig,
) -> Result<Vec<SchemaDocument>> {
    let settings = &config.validator;
    if !settings.import_external_schema_folders {
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for folder in &settings.external_schema_folders {
        let root = model_dir.join(folder);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        {
            documents.push(SchemaDocument::load(entry.path(), SchemaOrigin::External)?);
        }
    }
    Ok(documents)
}

/// Per-run registry. Common schemas are loaded once and shared by all
/// models; local and external schemas are collected per directory.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    common: Vec<SchemaDocument>,
}

impl SchemaRegistry {
    /// Load the common schemas for a run
    pub fn new(config: &ValidatorConfig, cwd: &Path) -> Result<Self> {
        let common = collect_common_schemas(config, cwd)?;
        debug!(count = common.len(), "common schemas loaded");
        Ok(Self { common })
    }

    /// Registry with an explicit list of common schemas
    pub fn with_common(common: Vec<SchemaDocument>) -> Self {
        Self { common }
    }

    pub fn common(&self) -> &[SchemaDocument] {
        &self.common
    }

    /// Build the dependency set for compiling `primary` inside `model_dir`:
    /// sibling local schemas, then common, then external ones.
    pub fn for_model(
        &self,
        model_dir: &Path,
        primary: &Path,
        config: &ValidatorConfig,
    ) -> Result<SchemaSet> {
        let mut set = SchemaSet::default();

        for path in collect_local_schemas(model_dir) {
            if path == primary {
                continue;
            }
            set.push(SchemaDocument::load(&path, SchemaOrigin::Local)?);
        }
        for document in &self.common {
            if document.path == primary {
                continue;
            }
            set.push(document.clone());
        }
        for document in collect_external_schemas(model_dir, config)? {
            set.push(document);
        }

        debug!(model = %model_dir.display(), schemas = set.len(), "schema set assembled");
        Ok(set)
    }
}
