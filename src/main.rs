//! Binary entry point for the external provider plugin.

use std::io::{self, Write};
use std::process;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use garm_provider_aws::{
    AwsCli, AwsProvider, Config, ConfigError, ExecutionEnvironment, ExecutionError,
    ProviderCommand, VERSION, execution,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("error getting environment: {0}")]
    Environment(#[from] ExecutionError),
    #[error("error loading config: {0}")]
    Config(#[from] ConfigError),
}

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr; stdout is reserved for the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run().await {
        Ok(output) => {
            if !output.is_empty() {
                writeln!(io::stdout(), "{output}").ok();
            }
        }
        Err(err) => {
            writeln!(io::stderr(), "{err}").ok();
            process::exit(1);
        }
    }
}

async fn run() -> Result<String, CliError> {
    let environment = ExecutionEnvironment::from_env()?;

    // The version verb answers immediately, before any config or cloud work.
    if environment.command == ProviderCommand::GetVersion {
        return Ok(String::from(VERSION));
    }

    let config = Config::load(&environment.config_file)?;
    let cli = AwsCli::new(config).await;
    let provider = AwsProvider::new(cli, environment.controller_id.clone());

    Ok(execution::dispatch(&provider, environment).await?)
}
