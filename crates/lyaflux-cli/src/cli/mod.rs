mod commands;
mod helpers;

use clap::Parser;
use lyaflux_core::domain::FluxError;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    install_tracing();
    let args: Vec<String> = std::env::args().collect();

    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let domain_error = error.as_flux_error();
            eprintln!("{}", domain_error.diagnostic_line());
            domain_error.exit_code()
        }
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "lyaflux",
    version,
    about = "Lyman-alpha flux derivative tables and interpolation"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Fit derivative tables and write them as flat text
    Fit(commands::FitArgs),
    /// Print the interpolated response at one redshift
    Query(commands::QueryArgs),
    /// Print the correction table between two run directories
    Compare(commands::CompareArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Fit(args) => commands::run_fit_command(args),
        CliCommand::Query(args) => commands::run_query_command(args),
        CliCommand::Compare(args) => commands::run_compare_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(FluxError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<FluxError> for CliError {
    fn from(error: FluxError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_flux_error(&self) -> FluxError {
        match self {
            Self::Usage(message) => FluxError::arity("INPUT.CLI_USAGE", message.trim_end()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => FluxError::io("IO.CLI", format!("{error:#}")),
        }
    }
}
