//! Example payload validation

use std::path::Path;

use tracing::debug;

use crate::compiler::CompiledValidator;
use crate::error::ValidatorError;
use crate::files;
use crate::report::{Interrupt, ModelRecorder};

/// Example payloads sit directly in the model directory
pub const EXAMPLE_PATTERN: &str = "example*.json";

const VALIDATOR_UNAVAILABLE: &str = "Examples cannot be validated since the validation function cannot be computed. \
     Probably not all schemas can be resolved correctly (check schema errors)";

/// Validate every example of `model_dir` against `validator`.
///
/// Without a validator a single error is recorded and no example is read.
pub fn validate_all(
    model_dir: &Path,
    validator: Option<&CompiledValidator>,
    recorder: &mut ModelRecorder,
) -> Result<(), Interrupt> {
    let Some(validator) = validator else {
        return recorder.error(VALIDATOR_UNAVAILABLE, None);
    };

    for path in &files::matching_files(model_dir, EXAMPLE_PATTERN) {
        let name = files::file_name(path);
        let instance = files::read_json(path)?;

        match validator.validate(&instance) {
            Ok(()) => {
                debug!(example = %name, "example valid");
                recorder.success(format!("{} is valid", name));
            }
            Err(violations) => {
                let detail = serde_json::to_value(&violations).map_err(ValidatorError::from)?;
                let error = ValidatorError::Validation {
                    example: name,
                    violations: detail.to_string(),
                };
                recorder.error(error.to_string(), Some(detail))?;
            }
        }
    }
    Ok(())
}
