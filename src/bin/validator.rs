//! Data Model Validator CLI
//!
//! Validates a tree of data models and prints the report.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use datamodel_validator::{
    report, walker, ExitStatus, HttpFetcher, OfflineFetcher, OutputFormat, SchemaFetcher,
    ValidatorConfig, ValidatorError, WarningPolicy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datamodel-validator")]
#[command(about = "Validate data model schemas, examples and conventions")]
struct Cli {
    /// Root folder to validate
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Warning policy: true (report), ignore or fail
    #[arg(short, long)]
    warnings: Option<String>,

    /// Common schemas, comma separated (files or glob patterns)
    #[arg(short, long, value_delimiter = ',')]
    import_schemas: Option<Vec<String>>,

    /// Additional configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Only validate the root folder
    #[arg(long)]
    no_recursive: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List the model directories and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let status = match run(cli) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitStatus::for_error(&e)
        }
    };
    std::process::exit(status.code());
}

fn load_config(cli: &Cli) -> Result<ValidatorConfig, ValidatorError> {
    let mut config = ValidatorConfig::load_from(cli.config.as_deref())?;

    if let Some(path) = &cli.path {
        config = config.with_path(path);
    }
    if let Some(warnings) = &cli.warnings {
        config.validator.warnings = warnings
            .parse::<WarningPolicy>()
            .map_err(ValidatorError::Config)?;
    }
    if let Some(schemas) = &cli.import_schemas {
        config.validator.import_schemas = schemas.clone();
    }
    if cli.no_recursive {
        config.validator.recursive_scan = false;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<ExitStatus, ValidatorError> {
    let config = load_config(&cli)?;
    config.validate()?;
    let cwd = std::env::current_dir()?;

    if cli.list {
        for path in walker::model_paths(&config)? {
            println!("{}", path.display());
        }
        return Ok(ExitStatus::Pass);
    }

    let fetcher: Box<dyn SchemaFetcher> = if config.validator.resolve_remote_schemas {
        let timeout = Duration::from_secs(config.validator.remote_timeout_secs);
        Box::new(HttpFetcher::new(timeout).map_err(|e| ValidatorError::Config(e.to_string()))?)
    } else {
        Box::new(OfflineFetcher)
    };

    let result = walker::run(&config, &cwd, fetcher.as_ref())?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let stdout = std::io::stdout();
    report::render(&result, format, &mut stdout.lock())?;

    Ok(result.exit_status())
}
