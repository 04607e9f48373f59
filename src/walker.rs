//! Tree walk over the model directories of a repository

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ValidatorConfig;
use crate::error::{Result, ValidatorError};
use crate::model::{ModelDirectory, ModelPipeline};
use crate::registry::SchemaRegistry;
use crate::remote::SchemaFetcher;
use crate::report::Report;

/// Directories under the configured root that hold a data model, in
/// depth-first order sorted by file name.
pub fn discover(config: &ValidatorConfig) -> Result<Vec<ModelDirectory>> {
    let root = config.root()?;
    if !config.validator.recursive_scan {
        return Ok(vec![ModelDirectory::scan(root, config)]);
    }

    let ignored = config.ignored_folders();
    let mut models = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !ignored.contains(e.file_name().to_string_lossy().as_ref())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ValidatorError::file_read(path, e)
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let model = ModelDirectory::scan(entry.path(), config);
        if model.is_model() {
            debug!(model = %entry.path().display(), "model directory found");
            models.push(model);
        }
    }
    Ok(models)
}

/// Validate every model directory below the configured root.
///
/// Models are processed in parallel; their reports are merged in discovery
/// order. The first fatal error in discovery order ends the run.
pub fn walk(config: &ValidatorConfig, registry: &SchemaRegistry, fetcher: &dyn SchemaFetcher) -> Result<Report> {
    let models = discover(config)?;
    info!(count = models.len(), "validating model directories");

    let pipeline = ModelPipeline::new(config, registry, fetcher)?;
    let reports: Vec<Result<Report>> = models.par_iter().map(|model| pipeline.run(model)).collect();

    let mut report = Report::new();
    for model_report in reports {
        report.merge(model_report?);
    }
    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        successes = report.successes.len(),
        "validation finished"
    );
    Ok(report)
}

/// Validate the configuration, load the common schemas relative to `cwd`
/// and walk the tree.
pub fn run(config: &ValidatorConfig, cwd: &Path, fetcher: &dyn SchemaFetcher) -> Result<Report> {
    config.validate()?;
    let registry = SchemaRegistry::new(config, cwd)?;
    walk(config, &registry, fetcher)
}

/// Paths of the discovered model directories
pub fn model_paths(config: &ValidatorConfig) -> Result<Vec<PathBuf>> {
    Ok(discover(config)?.into_iter().map(|m| m.path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "{}").unwrap();
    }

    #[test]
    fn test_discover_prunes_ignored_folders() {
        let root = tempdir().unwrap();
        let base = root.path();
        touch(&base.join("Building/Building-schema.json"));
        touch(&base.join("Building/externalSchema/Geo-schema.json"));
        touch(&base.join("Building/doc/Doc-schema.json"));
        touch(&base.join("Alarm/Alarm-schema.json"));
        touch(&base.join("harvest/Harvest-schema.json"));
        touch(&base.join("node_modules/pkg/Pkg-schema.json"));
        touch(&base.join("Empty/readme.md"));

        let config = ValidatorConfig::default().with_path(base);
        let paths = model_paths(&config).unwrap();
        assert_eq!(paths, vec![base.join("Alarm"), base.join("Building")]);
    }

    #[test]
    fn test_non_recursive_uses_root_only() {
        let root = tempdir().unwrap();
        touch(&root.path().join("Nested/Nested-schema.json"));

        let mut config = ValidatorConfig::default().with_path(root.path());
        config.validator.recursive_scan = false;
        let models = discover(&config).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].path, root.path());
    }

    #[test]
    fn test_root_named_like_ignored_folder_is_scanned() {
        let root = tempdir().unwrap();
        let base = root.path().join("harvest");
        touch(&base.join("Crop/Crop-schema.json"));

        let config = ValidatorConfig::default().with_path(&base);
        assert_eq!(model_paths(&config).unwrap(), vec![base.join("Crop")]);
    }
}
