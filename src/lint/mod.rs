//! Model Convention Linting
//!
//! Checks that a model directory carries the artifacts a published data
//! model is expected to have. Every finding is a warning: whether it is
//! printed, dropped or fails the run is decided by the warning policy.
//!
//! ## Checks
//! 1. **schemaExist**: a `*-schema.json` file
//! 2. **docExist**: documentation inside the doc folder
//! 3. **docFolderExist**: one of the configured doc folders
//! 4. **exampleExist**: an `example*.json` payload
//! 5. **modelNameValid**: the directory name matches `modelNamePattern`
//! 6. **readmeExist**: a `README*` file, any case

use std::fmt;

use regex::Regex;
use serde::Deserialize;

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::model::ModelDirectory;

/// A convention check, named as in `dmv:warningChecks`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConventionCheck {
    SchemaExist,
    DocExist,
    DocFolderExist,
    ExampleExist,
    ModelNameValid,
    ReadmeExist,
}

impl ConventionCheck {
    pub const ALL: [ConventionCheck; 6] = [
        ConventionCheck::SchemaExist,
        ConventionCheck::DocExist,
        ConventionCheck::DocFolderExist,
        ConventionCheck::ExampleExist,
        ConventionCheck::ModelNameValid,
        ConventionCheck::ReadmeExist,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConventionCheck::SchemaExist => "schemaExist",
            ConventionCheck::DocExist => "docExist",
            ConventionCheck::DocFolderExist => "docFolderExist",
            ConventionCheck::ExampleExist => "exampleExist",
            ConventionCheck::ModelNameValid => "modelNameValid",
            ConventionCheck::ReadmeExist => "readmeExist",
        }
    }
}

impl fmt::Display for ConventionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed convention check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionWarning {
    pub check: ConventionCheck,
    pub message: String,
}

impl fmt::Display for ConventionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.message)
    }
}

/// The convention linter
pub struct ConventionChecker {
    checks: Vec<ConventionCheck>,
    model_name: Regex,
    doc_folders: Vec<String>,
}

impl ConventionChecker {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let mut checks: Vec<ConventionCheck> = Vec::new();
        for check in &config.validator.warning_checks {
            if !checks.contains(check) {
                checks.push(*check);
            }
        }
        Ok(Self {
            checks,
            model_name: config.model_name_regex()?,
            doc_folders: config.validator.doc_folders.clone(),
        })
    }

    /// Enabled checks, in configuration order
    pub fn checks(&self) -> &[ConventionCheck] {
        &self.checks
    }

    /// Run the enabled checks against a model directory
    pub fn lint(&self, model: &ModelDirectory) -> Vec<ConventionWarning> {
        self.checks
            .iter()
            .filter_map(|check| self.run_check(*check, model))
            .collect()
    }

    fn run_check(&self, check: ConventionCheck, model: &ModelDirectory) -> Option<ConventionWarning> {
        let message = match check {
            ConventionCheck::SchemaExist if model.local_schemas.is_empty() => {
                "no schema file matching *-schema.json found".to_string()
            }
            // Without any doc folder the docFolderExist check already speaks.
            ConventionCheck::DocExist
                if !model.doc_folders.is_empty() && model.doc_files.is_empty() =>
            {
                format!(
                    "no documentation file (*.md) found in {}",
                    self.doc_folders.join(", ")
                )
            }
            ConventionCheck::DocFolderExist if model.doc_folders.is_empty() => {
                format!("no documentation folder found (expected one of: {})", self.doc_folders.join(", "))
            }
            ConventionCheck::ExampleExist if model.examples.is_empty() => {
                "no example file matching example*.json found".to_string()
            }
            ConventionCheck::ModelNameValid if !self.model_name.is_match(&model.name()) => {
                format!(
                    "model name '{}' does not match pattern {}",
                    model.name(),
                    self.model_name.as_str()
                )
            }
            ConventionCheck::ReadmeExist if model.readme.is_none() => {
                "no README file found".to_string()
            }
            _ => return None,
        };
        Some(ConventionWarning { check, message })
    }
}
