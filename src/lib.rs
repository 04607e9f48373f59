//! Data Model Validator
//!
//! Validates repositories of data models: directory trees where every
//! model carries a JSON Schema, example payloads and documentation.
//!
//! ## Features
//!
//! - **Recursive Discovery**: every directory holding a `*-schema.json` is a model
//! - **Schema Compilation**: local, common and external schemas resolved before compiling
//! - **Remote References**: optional download of `$ref` targets over HTTP
//! - **Example Validation**: `example*.json` payloads checked against the compiled schema
//! - **Convention Checks**: documentation, readme, examples and model naming
//! - **Policies**: warnings reported, ignored or failing; fail-fast on errors
//!
//! ## Layout
//!
//! ```text
//! specs/
//! ├── common-schema.json
//! ├── WeatherObserved/
//! │   ├── WeatherObserved-schema.json
//! │   ├── example.json
//! │   ├── example-normalized.json
//! │   ├── README.md
//! │   ├── doc/
//! │   │   └── spec.md
//! │   └── externalSchema/
//! │       └── geo.json
//! └── harvest/          (ignored)
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod example;
pub mod files;
pub mod lint;
pub mod model;
pub mod refs;
pub mod registry;
pub mod remote;
pub mod report;
pub mod walker;

pub use compiler::{CompiledValidator, SchemaCompiler, Violation};
pub use config::{RefsPolicy, ValidatorConfig, WarningPolicy};
pub use error::{Result, ValidatorError};
pub use lint::{ConventionCheck, ConventionChecker};
pub use model::{ModelDirectory, ModelPipeline};
pub use registry::SchemaRegistry;
pub use remote::{HttpFetcher, OfflineFetcher, SchemaFetcher, StaticFetcher};
pub use report::{ExitStatus, OutputFormat, Report, Verdict};
pub use walker::{run, walk};
