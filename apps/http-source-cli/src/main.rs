mod definition;
mod logging;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use definition::{Definition, Overrides};
use http_source::provider::{
    HttpProvider, ResourceState, ResponseState, data_source, ephemeral, resource,
};
use http_source::{Diagnostics, Outcome};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// HTTP source - evaluate one HTTP request definition
#[derive(Parser)]
#[command(name = "http-source-cli")]
#[command(about = "Evaluate an HTTP request definition and print the outcome as JSON")]
#[command(version)]
struct Cli {
    /// Path to the YAML request definition
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// URL override (takes precedence over file and environment)
    #[arg(long, global = true)]
    url: Option<String>,

    /// HTTP method override
    #[arg(short = 'X', long, global = true)]
    method: Option<String>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Pretty-print the JSON outcome
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Data source read
    Read,
    /// Ephemeral resource open
    Open,
    /// Resource create (sends the request when `when = apply`)
    Apply,
    /// Resource delete (sends the request when `when = destroy`)
    Destroy,
    /// Validate the definition without sending anything
    Check,
}

/// Printed outcome and whether it carries an error.
struct Report {
    json: serde_json::Value,
    failed: bool,
}

impl Report {
    fn from_outcome<T: Serialize>(outcome: &Outcome<T>) -> Result<Self> {
        Ok(Self {
            json: serde_json::to_value(outcome)?,
            failed: outcome.has_error(),
        })
    }
}

/// What `check` reports for a valid definition.
#[derive(Debug, Serialize)]
struct CheckSummary {
    url: String,
    method: String,
    headers: Vec<String>,
    timeout_ms: Option<u64>,
    max_retries: usize,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json)?;

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        bail!("definition file does not exist: {}", path.display());
    }

    let overrides = Overrides {
        url: cli.url.clone(),
        method: cli.method.clone(),
    };
    let definition = definition::load(cli.config.as_deref(), &overrides)?;

    let report = evaluate(cli.command, &definition).await?;
    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&report.json)?);
    } else {
        println!("{}", report.json);
    }

    Ok(if report.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn evaluate(command: Commands, definition: &Definition) -> Result<Report> {
    tracing::info!(?command, url = %definition.request.url, "Evaluating request definition");

    let provider = match HttpProvider::configure(&definition.provider) {
        Ok(provider) => provider.with_client_config(definition.client.clone()),
        Err(err) => {
            tracing::error!(error = %err, "Invalid provider configuration");
            let outcome: Outcome<()> = Outcome::failed(Diagnostics::from(&err));
            return Report::from_outcome(&outcome);
        }
    };

    match command {
        Commands::Read => Report::from_outcome(&data_source::read(&provider, &definition.request).await),
        Commands::Open => Report::from_outcome(&ephemeral::open(&provider, &definition.request).await),
        Commands::Apply => {
            Report::from_outcome(&resource::create(&provider, &definition.resource()).await)
        }
        Commands::Destroy => {
            let prior = ResourceState {
                config: definition.resource(),
                outputs: None,
            };
            let outcome = Outcome::<ResponseState> {
                state: None,
                diagnostics: resource::delete(&provider, &prior).await,
            };
            Report::from_outcome(&outcome)
        }
        Commands::Check => Report::from_outcome(&check(&provider, definition)),
    }
}

fn check(provider: &HttpProvider, definition: &Definition) -> Outcome<CheckSummary> {
    match provider.prepare(&definition.request) {
        Ok(spec) => {
            let summary = CheckSummary {
                url: spec.url().to_owned(),
                method: spec.method().to_string(),
                headers: spec.headers().keys().map(ToString::to_string).collect(),
                timeout_ms: spec
                    .timeout()
                    .and_then(|t| u64::try_from(t.as_millis()).ok()),
                max_retries: spec.retry().max_retries,
            };
            Outcome::ok(summary, Diagnostics::new())
        }
        Err(err) => Outcome::failed(Diagnostics::from(&err)),
    }
}
