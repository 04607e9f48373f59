//! File resolution and JSON loading
//!
//! Inputs are either plain paths or glob patterns (`*-schema.json`,
//! `specs/**/example*.json`). Patterns expand against a working root;
//! plain paths pass through untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, ValidatorError};

/// Whether the input contains glob syntax
pub fn has_glob_magic(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Expand a list of paths and patterns into concrete paths.
///
/// Relative inputs are taken relative to `cwd`. Non-pattern inputs are
/// returned even when they do not exist; reading them reports the failure.
/// Pattern results keep enumeration order; a path reached by more than one
/// input is listed once.
pub fn resolve<I, S>(inputs: I, cwd: &Path) -> Vec<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut files = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if !has_glob_magic(input) {
            files = merge_unique(&files, &[cwd.join(input)]);
            continue;
        }

        // the working root is literal text, only the input carries glob syntax
        let pattern = if Path::new(input).is_absolute() {
            input.to_string()
        } else {
            Path::new(&glob::Pattern::escape(&cwd.to_string_lossy()))
                .join(input)
                .to_string_lossy()
                .to_string()
        };
        let mut expanded = Vec::new();
        match glob::glob(&pattern) {
            Ok(paths) => {
                for entry in paths {
                    match entry {
                        Ok(path) => expanded.push(path),
                        Err(e) => warn!(pattern = %pattern, error = %e, "unreadable glob match"),
                    }
                }
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "invalid glob pattern"),
        }
        files = merge_unique(&files, &expanded);
    }
    files
}

/// Files directly inside `dir` whose name matches a glob pattern, sorted
/// by name so reports are stable across platforms.
pub fn matching_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let Ok(matcher) = glob::Pattern::new(pattern) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| matcher.matches(n))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Order-preserving union: every entry of `first`, then the entries of
/// `second` not already present.
pub fn merge_unique(first: &[PathBuf], second: &[PathBuf]) -> Vec<PathBuf> {
    let mut result = first.to_vec();
    for item in second {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

/// Read and parse a JSON document.
///
/// Strict JSON is tried first, then YAML, which also accepts comments,
/// unquoted keys and other non-strict JSON assets. A failure here is an
/// environment problem and ends the whole run.
pub fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| ValidatorError::file_read(path, e))?;

    match serde_json::from_str::<Value>(&content) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            debug!(path = %path.display(), error = %json_err, "strict JSON parse failed, trying lenient parse");
            // a bare scalar means the text was not structured data at all
            match serde_yaml::from_str::<Value>(&content) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
                _ => Err(ValidatorError::file_read(path, json_err)),
            }
        }
    }
}

/// File name of a path as a displayable string
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_glob_magic() {
        assert!(has_glob_magic("*-schema.json"));
        assert!(has_glob_magic("example?.json"));
        assert!(has_glob_magic("[ab].json"));
        assert!(!has_glob_magic("common-schema.json"));
    }

    #[test]
    fn test_resolve_passes_plain_paths_through() {
        let dir = tempdir().unwrap();
        let files = resolve(["missing.json"], dir.path());
        assert_eq!(files, vec![dir.path().join("missing.json")]);
    }

    #[test]
    fn test_resolve_expands_patterns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a-schema.json"), "{}").unwrap();
        fs::write(dir.path().join("b-schema.json"), "{}").unwrap();
        fs::write(dir.path().join("example.json"), "{}").unwrap();

        let mut files = resolve(["*-schema.json"], dir.path());
        files.sort();
        assert_eq!(
            files,
            vec![dir.path().join("a-schema.json"), dir.path().join("b-schema.json")]
        );
    }

    #[test]
    fn test_resolve_lists_overlapping_inputs_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("common-schema.json"), "{}").unwrap();
        fs::write(dir.path().join("geometry-schema.json"), "{}").unwrap();

        let files = resolve(["common-schema.json", "*-schema.json"], dir.path());
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], dir.path().join("common-schema.json"));
        assert!(files.contains(&dir.path().join("geometry-schema.json")));
    }

    #[test]
    fn test_resolve_treats_working_root_literally() {
        let dir = tempdir().unwrap();
        let cwd = dir.path().join("models [v2]*");
        fs::create_dir(&cwd).unwrap();
        fs::write(cwd.join("common-schema.json"), "{}").unwrap();
        fs::write(cwd.join("geometry-schema.json"), "{}").unwrap();

        let mut files = resolve(["*-schema.json"], &cwd);
        files.sort();
        assert_eq!(
            files,
            vec![cwd.join("common-schema.json"), cwd.join("geometry-schema.json")]
        );
    }

    #[test]
    fn test_matching_files_is_sorted_and_flat() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("example2.json"), "{}").unwrap();
        fs::write(dir.path().join("example1.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/example3.json"), "{}").unwrap();

        let files = matching_files(dir.path(), "example*.json");
        assert_eq!(
            files,
            vec![dir.path().join("example1.json"), dir.path().join("example2.json")]
        );
    }

    #[test]
    fn test_merge_unique_keeps_order() {
        let a = vec![PathBuf::from("x"), PathBuf::from("y")];
        let b = vec![PathBuf::from("y"), PathBuf::from("z")];
        assert_eq!(
            merge_unique(&a, &b),
            vec![PathBuf::from("x"), PathBuf::from("y"), PathBuf::from("z")]
        );
    }

    #[test]
    fn test_read_json_strict_and_lenient() {
        let dir = tempdir().unwrap();
        let strict = dir.path().join("strict.json");
        fs::write(&strict, r#"{"type": "object"}"#).unwrap();
        assert_eq!(read_json(&strict).unwrap()["type"], "object");

        let lenient = dir.path().join("lenient.json");
        fs::write(&lenient, "# generated\n{type: object, required: [id]}\n").unwrap();
        let value = read_json(&lenient).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"][0], "id");
    }

    #[test]
    fn test_read_json_failure_is_file_read() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{\"type\": [unclosed").unwrap();

        let err = read_json(&broken).unwrap_err();
        assert!(matches!(err, ValidatorError::FileRead { .. }));

        let prose = dir.path().join("prose.json");
        fs::write(&prose, "just some words").unwrap();
        assert!(read_json(&prose).is_err());

        let missing = read_json(&dir.path().join("missing.json")).unwrap_err();
        assert!(missing.is_fatal());
    }
}
