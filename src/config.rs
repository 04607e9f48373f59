//! Configuration for the data model validator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (config.json, .dmv.json or config/validator.toml)
//! - The platform config directory
//! - Environment variables (DMV_*)
//!
//! ## Example config file (config.json):
//! ```json
//! {
//!   "dmv": {
//!     "path": "specs/Weather",
//!     "warnings": "fail",
//!     "importSchemas": ["common-schema.json", "geometry-schema.json"],
//!     "resolveRemoteSchemas": false
//!   },
//!   "ajv": {
//!     "allErrors": true,
//!     "missingRefs": "true",
//!     "extendRefs": "fail"
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config_crate::{Config, Environment, File};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, ValidatorError};
use crate::lint::ConventionCheck;

/// Folders never scanned, whatever the configuration says.
pub const ALWAYS_IGNORED: [&str; 3] = [".git", "node_modules", "validator"];

/// Main configuration, split like the `dmv` / `ajv` sections of config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorConfig {
    /// Scan, convention and schema-loading settings
    #[serde(default, rename = "dmv")]
    pub validator: ValidatorSettings,

    /// Schema compiler settings
    #[serde(default, rename = "ajv")]
    pub compiler: CompilerOptions,
}

/// Scan and convention settings.
///
/// The `alias` attributes accept the lowercased keys produced by
/// environment sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSettings {
    /// Root folder to validate (starting point of the recursion)
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_true", alias = "recursivescan")]
    pub recursive_scan: bool,

    /// Schemas registered with every model, file names or glob patterns
    #[serde(default = "default_import_schemas", alias = "importschemas")]
    pub import_schemas: Vec<String>,

    /// What to do with convention warnings
    #[serde(default)]
    pub warnings: WarningPolicy,

    #[serde(default = "default_warning_checks", alias = "warningchecks")]
    pub warning_checks: Vec<ConventionCheck>,

    #[serde(default = "default_true", alias = "validateexamples")]
    pub validate_examples: bool,

    #[serde(default = "default_true", alias = "loadmodelcommonschemas")]
    pub load_model_common_schemas: bool,

    #[serde(default = "default_true", alias = "importexternalschemafolders")]
    pub import_external_schema_folders: bool,

    #[serde(default, alias = "resolveremoteschemas")]
    pub resolve_remote_schemas: bool,

    #[serde(default = "default_ignore_folders", alias = "ignorefolders")]
    pub ignore_folders: Vec<String>,

    #[serde(default = "default_doc_folders", alias = "docfolders")]
    pub doc_folders: Vec<String>,

    #[serde(default = "default_external_schema_folders", alias = "externalschemafolders")]
    pub external_schema_folders: Vec<String>,

    /// Regex a model directory name must match
    #[serde(default = "default_model_name_pattern", alias = "modelnamepattern")]
    pub model_name_pattern: String,

    /// Timeout for a single remote schema download
    #[serde(default = "default_remote_timeout", alias = "remotetimeoutsecs")]
    pub remote_timeout_secs: u64,
}

/// Schema compiler options
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Collect every error instead of stopping at the first one.
    /// When false, the first error also aborts the current model.
    #[serde(default = "default_true", alias = "allerrors")]
    pub all_errors: bool,

    /// Handling of `$ref`s that cannot be resolved
    #[serde(default = "default_missing_refs", alias = "missingrefs")]
    pub missing_refs: RefsPolicy,

    /// Handling of keywords placed beside a `$ref`
    #[serde(default = "default_extend_refs", alias = "extendrefs")]
    pub extend_refs: RefsPolicy,
}

/// Warning policy (`dmv:warnings`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "PolicyToken")]
pub enum WarningPolicy {
    /// `true`: print warnings without failing
    #[default]
    Report,
    /// `ignore`: drop warnings
    Ignore,
    /// `fail`: print warnings and fail the run
    Fail,
}

/// Policy for unresolved or extended `$ref`s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PolicyToken")]
pub enum RefsPolicy {
    /// Log and carry on
    Ignore,
    /// Log and make validation fail
    Fail,
    /// `true`: missing refs are compile errors, extended refs are validated
    Strict,
}

/// Raw policy value as found in files or the environment: either a boolean
/// or a word.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyToken {
    Flag(bool),
    Word(String),
}

impl TryFrom<PolicyToken> for WarningPolicy {
    type Error = String;

    fn try_from(token: PolicyToken) -> std::result::Result<Self, Self::Error> {
        match token {
            PolicyToken::Flag(true) => Ok(WarningPolicy::Report),
            PolicyToken::Flag(false) => Ok(WarningPolicy::Ignore),
            PolicyToken::Word(word) => word.parse(),
        }
    }
}

impl FromStr for WarningPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "report" => Ok(WarningPolicy::Report),
            "ignore" => Ok(WarningPolicy::Ignore),
            "fail" => Ok(WarningPolicy::Fail),
            other => Err(format!(
                "unknown warnings policy '{}', expected one of: true, ignore, fail",
                other
            )),
        }
    }
}

impl fmt::Display for WarningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningPolicy::Report => write!(f, "true"),
            WarningPolicy::Ignore => write!(f, "ignore"),
            WarningPolicy::Fail => write!(f, "fail"),
        }
    }
}

impl TryFrom<PolicyToken> for RefsPolicy {
    type Error = String;

    fn try_from(token: PolicyToken) -> std::result::Result<Self, Self::Error> {
        match token {
            PolicyToken::Flag(true) => Ok(RefsPolicy::Strict),
            PolicyToken::Flag(false) => Err("refs policy cannot be false".to_string()),
            PolicyToken::Word(word) => word.parse(),
        }
    }
}

impl FromStr for RefsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(RefsPolicy::Strict),
            "ignore" => Ok(RefsPolicy::Ignore),
            "fail" => Ok(RefsPolicy::Fail),
            other => Err(format!(
                "unknown refs policy '{}', expected one of: true, ignore, fail",
                other
            )),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_import_schemas() -> Vec<String> {
    vec![
        "common-schema.json".to_string(),
        "geometry-schema.json".to_string(),
    ]
}

fn default_warning_checks() -> Vec<ConventionCheck> {
    ConventionCheck::ALL.to_vec()
}

fn default_ignore_folders() -> Vec<String> {
    vec!["harvest".to_string(), "auxiliary".to_string()]
}

fn default_doc_folders() -> Vec<String> {
    vec!["doc".to_string()]
}

fn default_external_schema_folders() -> Vec<String> {
    vec!["externalSchema".to_string()]
}

fn default_model_name_pattern() -> String {
    r"^[A-Z][A-Za-z0-9]*$".to_string()
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_missing_refs() -> RefsPolicy {
    RefsPolicy::Strict
}

fn default_extend_refs() -> RefsPolicy {
    RefsPolicy::Fail
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            path: None,
            recursive_scan: true,
            import_schemas: default_import_schemas(),
            warnings: WarningPolicy::Report,
            warning_checks: default_warning_checks(),
            validate_examples: true,
            load_model_common_schemas: true,
            import_external_schema_folders: true,
            resolve_remote_schemas: false,
            ignore_folders: default_ignore_folders(),
            doc_folders: default_doc_folders(),
            external_schema_folders: default_external_schema_folders(),
            model_name_pattern: default_model_name_pattern(),
            remote_timeout_secs: default_remote_timeout(),
        }
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            all_errors: true,
            missing_refs: default_missing_refs(),
            extend_refs: default_extend_refs(),
        }
    }
}

impl ValidatorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, optionally adding a required config file
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = ["config.json", ".dmv.json", "config/validator.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "datamodels", "datamodel-validator") {
            let user_config = dirs.config_dir().join("config.json");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DMV_DMV__PATH, DMV_AJV__ALLERRORS, ...
        builder = builder.add_source(
            Environment::with_prefix("DMV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("dmv.importschemas")
                .with_list_parse_key("dmv.ignorefolders"),
        );

        let config = builder
            .build()
            .map_err(|e| ValidatorError::Config(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| ValidatorError::Config(e.to_string()))
    }

    /// Set the root path to validate
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.validator.path = Some(path.into());
        self
    }

    /// Check the configuration before any model is processed.
    pub fn validate(&self) -> Result<()> {
        let root = self.root()?;
        let meta = std::fs::metadata(root).map_err(|e| {
            ValidatorError::Config(format!("invalid path {}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(ValidatorError::Config(format!(
                "the path passed must be a directory: {}",
                root.display()
            )));
        }

        self.model_name_regex()?;

        if self.validator.remote_timeout_secs == 0 {
            return Err(ValidatorError::Config(
                "remoteTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The root path (required)
    pub fn root(&self) -> Result<&Path> {
        self.validator
            .path
            .as_deref()
            .ok_or_else(|| ValidatorError::Config("missing required option dmv:path".to_string()))
    }

    /// Compile the model-name pattern
    pub fn model_name_regex(&self) -> Result<Regex> {
        Regex::new(&self.validator.model_name_pattern).map_err(|e| {
            ValidatorError::Config(format!(
                "invalid modelNamePattern '{}': {}",
                self.validator.model_name_pattern, e
            ))
        })
    }

    /// Folder names the tree walk never descends into
    pub fn ignored_folders(&self) -> BTreeSet<String> {
        let settings = &self.validator;
        settings
            .ignore_folders
            .iter()
            .chain(settings.doc_folders.iter())
            .chain(settings.external_schema_folders.iter())
            .cloned()
            .chain(ALWAYS_IGNORED.iter().map(|s| s.to_string()))
            .collect()
    }

    /// Errors abort the current model when not every error is collected
    pub fn fail_errors(&self) -> bool {
        !self.compiler.all_errors
    }
}
