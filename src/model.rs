//! Model directories and the per-model validation pipeline
//!
//! A model directory is processed in three sequential steps: compile the
//! primary schema, validate the examples, run the convention checks. Each
//! step records into the model's own [`ModelRecorder`]; an
//! [`Interrupt::AbortModel`] ends the pipeline early and keeps what was
//! recorded so far.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compiler::{CompiledValidator, SchemaCompiler};
use crate::config::ValidatorConfig;
use crate::error::{Result, ValidatorError};
use crate::example::{self, EXAMPLE_PATTERN};
use crate::files;
use crate::lint::ConventionChecker;
use crate::registry::{self, SchemaRegistry};
use crate::remote::SchemaFetcher;
use crate::report::{Interrupt, ModelRecorder, Policy, Report};

/// Artifacts discovered in one model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDirectory {
    pub path: PathBuf,
    /// `*-schema.json` files, sorted
    pub local_schemas: Vec<PathBuf>,
    /// `example*.json` files, sorted
    pub examples: Vec<PathBuf>,
    /// Configured doc folders that exist
    pub doc_folders: Vec<PathBuf>,
    /// Markdown files below the doc folders
    pub doc_files: Vec<PathBuf>,
    pub readme: Option<PathBuf>,
}

impl ModelDirectory {
    /// Inspect `path`. Missing artifacts are simply left empty.
    pub fn scan(path: &Path, config: &ValidatorConfig) -> Self {
        let doc_folders: Vec<PathBuf> = config
            .validator
            .doc_folders
            .iter()
            .map(|name| path.join(name))
            .filter(|p| p.is_dir())
            .collect();

        let mut doc_files: Vec<PathBuf> = doc_folders
            .iter()
            .flat_map(|folder| {
                WalkDir::new(folder)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
                    .map(|e| e.into_path())
            })
            .collect();
        doc_files.sort();

        Self {
            path: path.to_path_buf(),
            local_schemas: registry::collect_local_schemas(path),
            examples: files::matching_files(path, EXAMPLE_PATTERN),
            doc_folders,
            doc_files,
            readme: find_readme(path),
        }
    }

    /// Final path component
    pub fn name(&self) -> String {
        files::file_name(&self.path)
    }

    /// Whether this directory holds a data model at all
    pub fn is_model(&self) -> bool {
        !self.local_schemas.is_empty()
    }

    /// `<dirname>-schema.json` when present, otherwise the first schema
    pub fn primary_schema(&self) -> Option<&Path> {
        let preferred = format!("{}-schema.json", self.name());
        self.local_schemas
            .iter()
            .find(|p| files::file_name(p) == preferred)
            .or_else(|| self.local_schemas.first())
            .map(PathBuf::as_path)
    }
}

fn find_readme(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut readmes: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| files::file_name(p).to_ascii_lowercase().starts_with("readme"))
        .collect();
    readmes.sort();
    readmes.into_iter().next()
}

fn remediation(error: &ValidatorError) -> String {
    format!(
        "Schema cannot be compiled. If the schema references remote schemas try using remote validation \
         (dmv:resolveRemoteSchemas=true), check if \"dmv:loadModelCommonSchemas\" is enabled and the common \
         schemas are found, or store third party schemas in the \"externalSchema\" folder: {}",
        error
    )
}

/// Runs the validation steps for one model directory at a time
pub struct ModelPipeline<'a> {
    config: &'a ValidatorConfig,
    registry: &'a SchemaRegistry,
    compiler: SchemaCompiler<'a>,
    checker: ConventionChecker,
    policy: Policy,
}

impl<'a> ModelPipeline<'a> {
    pub fn new(
        config: &'a ValidatorConfig,
        registry: &'a SchemaRegistry,
        fetcher: &'a dyn SchemaFetcher,
    ) -> Result<Self> {
        Ok(Self {
            config,
            registry,
            compiler: SchemaCompiler::new(config, fetcher),
            checker: ConventionChecker::new(config)?,
            policy: Policy::from_config(config),
        })
    }

    /// Validate one model directory. Only fatal errors are returned; all
    /// other outcomes are entries of the model's report.
    pub fn run(&self, model: &ModelDirectory) -> Result<Report> {
        let label = model.path.display().to_string();
        let mut recorder = ModelRecorder::new(label, self.policy);

        match self.process(model, &mut recorder) {
            Ok(()) => {}
            Err(Interrupt::AbortModel) => {
                info!(model = %recorder.model(), "model processing stopped by policy");
            }
            Err(Interrupt::Fatal(error)) => return Err(error),
        }
        Ok(recorder.finish())
    }

    fn process(&self, model: &ModelDirectory, recorder: &mut ModelRecorder) -> std::result::Result<(), Interrupt> {
        let validator = match model.primary_schema() {
            Some(primary) => self.compile(model, primary, recorder)?,
            None => None,
        };

        if self.config.validator.validate_examples {
            example::validate_all(&model.path, validator.as_ref(), recorder)?;
        }

        for warning in self.checker.lint(model) {
            recorder.warning(warning.to_string())?;
        }
        Ok(())
    }

    fn compile(
        &self,
        model: &ModelDirectory,
        primary: &Path,
        recorder: &mut ModelRecorder,
    ) -> std::result::Result<Option<CompiledValidator>, Interrupt> {
        let schema_file = files::file_name(primary);
        let dependencies = self.registry.for_model(&model.path, primary, self.config)?;

        match self.compiler.compile(primary, &dependencies) {
            Ok(validator) => {
                debug!(schema = %schema_file, "schema compiled");
                recorder.success(format!("Schema {} is valid", schema_file));
                Ok(Some(validator))
            }
            Err(error) if error.is_fatal() => Err(Interrupt::Fatal(error)),
            Err(error) => {
                let detail = json!({ "schema": schema_file, "reason": error.to_string() });
                recorder.error(remediation(&error), Some(detail))?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::OfflineFetcher;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_discovers_artifacts() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Parking");
        write(&dir.join("Parking-schema.json"), "{}");
        write(&dir.join("aaa-schema.json"), "{}");
        write(&dir.join("example.json"), "{}");
        write(&dir.join("doc/nested/spec.md"), "# Parking");
        write(&dir.join("ReadMe.txt"), "");

        let model = ModelDirectory::scan(&dir, &ValidatorConfig::default());
        assert!(model.is_model());
        assert_eq!(model.name(), "Parking");
        assert_eq!(model.primary_schema(), Some(dir.join("Parking-schema.json").as_path()));
        assert_eq!(model.examples, vec![dir.join("example.json")]);
        assert_eq!(model.doc_files, vec![dir.join("doc/nested/spec.md")]);
        assert_eq!(model.readme, Some(dir.join("ReadMe.txt")));
    }

    #[test]
    fn test_primary_schema_falls_back_to_first() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Parking");
        write(&dir.join("b-schema.json"), "{}");
        write(&dir.join("a-schema.json"), "{}");

        let model = ModelDirectory::scan(&dir, &ValidatorConfig::default());
        assert_eq!(model.primary_schema(), Some(dir.join("a-schema.json").as_path()));
    }

    #[test]
    fn test_compile_error_carries_remediation() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Parking");
        write(&dir.join("Parking-schema.json"), r#"{"$ref": "https://example.org/missing.json"}"#);
        write(&dir.join("README.md"), "");
        write(&dir.join("doc/spec.md"), "");

        let config = ValidatorConfig::default();
        let registry = SchemaRegistry::with_common(Vec::new());
        let pipeline = ModelPipeline::new(&config, &registry, &OfflineFetcher).unwrap();
        let report = pipeline.run(&ModelDirectory::scan(&dir, &config)).unwrap();

        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].message.contains("dmv:resolveRemoteSchemas=true"));
        assert_eq!(report.errors[0].detail.as_ref().unwrap()["schema"], "Parking-schema.json");
        assert!(report.errors[1].message.starts_with("Examples cannot be validated"));
        assert!(report.successes.is_empty());
    }

    #[test]
    fn test_fail_warnings_stops_after_first_warning() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Parking");
        write(&dir.join("Parking-schema.json"), r#"{"type": "object"}"#);

        let mut config = ValidatorConfig::default();
        config.validator.warnings = crate::config::WarningPolicy::Fail;
        let registry = SchemaRegistry::with_common(Vec::new());
        let pipeline = ModelPipeline::new(&config, &registry, &OfflineFetcher).unwrap();
        let report = pipeline.run(&ModelDirectory::scan(&dir, &config)).unwrap();

        assert_eq!(report.successes.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.escalated);
    }
}
