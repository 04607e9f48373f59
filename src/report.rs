//! Report aggregation and error/warning policy
//!
//! Each model directory records into its own [`ModelRecorder`]; the tree
//! walk merges the per-model reports into one run [`Report`] in discovery
//! order. The recorder applies the policy at the moment an entry is added:
//! under `failErrors` / `failWarnings` it hands back [`Interrupt::AbortModel`]
//! so the model pipeline stops with `?` while the walk carries on.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{ValidatorConfig, WarningPolicy};
use crate::error::ValidatorError;

/// One report line, attributed to exactly one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub model: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Run verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Pass,
    Fail,
    FileRead,
    Config,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Pass => 0,
            ExitStatus::Fail => 1,
            ExitStatus::FileRead => 2,
            ExitStatus::Config => 255,
        }
    }

    /// Exit status for an error that stopped the run
    pub fn for_error(error: &ValidatorError) -> Self {
        match error {
            ValidatorError::Config(_) => ExitStatus::Config,
            ValidatorError::FileRead { .. } | ValidatorError::Io(_) => ExitStatus::FileRead,
            _ => ExitStatus::Fail,
        }
    }
}

impl From<Verdict> for ExitStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Pass => ExitStatus::Pass,
            Verdict::Fail => ExitStatus::Fail,
        }
    }
}

/// Error/warning policy derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub ignore_warnings: bool,
    pub fail_warnings: bool,
    pub fail_errors: bool,
}

impl Policy {
    pub fn from_config(config: &ValidatorConfig) -> Self {
        let warnings = config.validator.warnings;
        Self {
            ignore_warnings: warnings == WarningPolicy::Ignore,
            fail_warnings: warnings == WarningPolicy::Fail,
            fail_errors: config.fail_errors(),
        }
    }
}

/// Why a model pipeline stopped early
#[derive(Debug)]
pub enum Interrupt {
    /// The policy stops this model; the walk continues
    AbortModel,
    /// The whole run stops
    Fatal(ValidatorError),
}

impl From<ValidatorError> for Interrupt {
    fn from(error: ValidatorError) -> Self {
        Interrupt::Fatal(error)
    }
}

/// Errors, warnings and successes of a run (or of a single model)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub errors: Vec<Entry>,
    pub warnings: Vec<Entry>,
    pub successes: Vec<Entry>,
    /// A warning was escalated under the `fail` warning policy
    #[serde(skip)]
    pub escalated: bool,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append another report, keeping its entry order
    pub fn merge(&mut self, other: Report) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.successes.extend(other.successes);
        self.escalated |= other.escalated;
    }

    pub fn verdict(&self) -> Verdict {
        if !self.errors.is_empty() || self.escalated {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.verdict().into()
    }

    /// Entries of every category belonging to one model
    pub fn entries_for<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.successes.iter())
            .filter(move |e| e.model == model)
    }
}

/// Records entries for one model directory and applies the policy
#[derive(Debug)]
pub struct ModelRecorder {
    model: String,
    policy: Policy,
    report: Report,
}

impl ModelRecorder {
    pub fn new(model: impl Into<String>, policy: Policy) -> Self {
        Self {
            model: model.into(),
            policy,
            report: Report::default(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn entry(&self, message: impl Into<String>, detail: Option<Value>) -> Entry {
        Entry {
            model: self.model.clone(),
            message: message.into(),
            detail,
        }
    }

    /// Record an error; aborts the model under `failErrors`
    pub fn error(&mut self, message: impl Into<String>, detail: Option<Value>) -> Result<(), Interrupt> {
        let entry = self.entry(message, detail);
        self.report.errors.push(entry);
        if self.policy.fail_errors {
            debug!(model = %self.model, "aborting model on error");
            return Err(Interrupt::AbortModel);
        }
        Ok(())
    }

    /// Record a warning. Ignored under `ignore`; under `fail` it marks the
    /// run as failed and aborts the model.
    pub fn warning(&mut self, message: impl Into<String>) -> Result<(), Interrupt> {
        if self.policy.ignore_warnings {
            return Ok(());
        }
        let entry = self.entry(message, None);
        self.report.warnings.push(entry);
        if self.policy.fail_warnings {
            self.report.escalated = true;
            debug!(model = %self.model, "aborting model on warning");
            return Err(Interrupt::AbortModel);
        }
        Ok(())
    }

    pub fn success(&mut self, message: impl Into<String>) {
        let entry = self.entry(message, None);
        self.report.successes.push(entry);
    }

    pub fn finish(self) -> Report {
        self.report
    }
}

/// Output format of the rendered report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Print the report as text, one line per entry
pub fn render_human<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    for entry in &report.successes {
        writeln!(out, "✅ {} - {}", entry.model, entry.message)?;
    }
    for entry in &report.warnings {
        writeln!(out, "⚠️  {} - {}", entry.model, entry.message)?;
    }
    for entry in &report.errors {
        writeln!(out, "❌ {} - {}", entry.model, entry.message)?;
    }

    writeln!(out)?;
    let marker = match report.verdict() {
        Verdict::Pass => "✅",
        Verdict::Fail => "❌",
    };
    writeln!(
        out,
        "{} {} - errors={} warnings={} successes={}",
        marker,
        report.verdict(),
        report.errors.len(),
        report.warnings.len(),
        report.successes.len()
    )
}

/// The report as a JSON document
pub fn to_json(report: &Report) -> Value {
    json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "verdict": report.verdict(),
        "summary": {
            "errors": report.errors.len(),
            "warnings": report.warnings.len(),
            "successes": report.successes.len(),
        },
        "errors": report.errors,
        "warnings": report.warnings,
        "successes": report.successes,
    })
}

pub fn render_json<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    let text = serde_json::to_string_pretty(&to_json(report)).map_err(io::Error::other)?;
    writeln!(out, "{}", text)
}

pub fn render<W: Write>(report: &Report, format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Human => render_human(report, out),
        OutputFormat::Json => render_json(report, out),
    }
}
