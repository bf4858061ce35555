use super::CliError;
use super::helpers::*;
use anyhow::Context;
use lyaflux_core::domain::{FluxError, ParamValue, RedshiftOrder};
use lyaflux_core::modules::interp::save_flat_table;
use lyaflux_core::modules::{correction_table, SimulationRun};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Copy, clap::ValueEnum)]
pub(super) enum OrderArg {
    Ascending,
    Descending,
}

impl From<OrderArg> for RedshiftOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Ascending => RedshiftOrder::Ascending,
            OrderArg::Descending => RedshiftOrder::Descending,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Run configuration (source and parameter sets)
    #[arg(long)]
    config: PathBuf,

    /// Directory receiving one table per parameter set
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Only export this parameter set (0-based)
    #[arg(long)]
    group: Option<usize>,

    /// Column order of the exported redshifts
    #[arg(long, value_enum, default_value = "ascending")]
    order: OrderArg,
}

#[derive(clap::Args)]
pub(super) struct QueryArgs {
    /// Run configuration (source and parameter sets)
    #[arg(long)]
    config: PathBuf,

    /// Redshift to evaluate at
    #[arg(long)]
    redshift: f64,

    /// Parameter value per set, scalar or comma-separated series.
    ///
    /// Series are given in ascending redshift order, one value per
    /// configured redshift. Knot configuration files list them in
    /// simulation order instead.
    #[arg(
        long = "param",
        required = true,
        allow_hyphen_values = true,
        value_parser = parse_param_value
    )]
    params: Vec<ParamValue>,

    /// Print a JSON object instead of `k response` rows
    #[arg(long)]
    json: bool,

    /// Secondary parameter value per set, same form and order as --param
    #[arg(
        long = "secondary",
        allow_hyphen_values = true,
        value_parser = parse_param_value
    )]
    secondary: Vec<ParamValue>,
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// Run configuration providing the source
    #[arg(long)]
    config: PathBuf,

    /// Reference run directory
    #[arg(long)]
    one: String,

    /// Compared run directory
    #[arg(long)]
    two: String,

    /// Box size of the reference run (defaults to the configured box)
    #[arg(long)]
    box_one: Option<f64>,

    /// Box size of the compared run (defaults to the configured box)
    #[arg(long)]
    box_two: Option<f64>,
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    redshift: f64,
    kbins: &'a [f64],
    response: Vec<f64>,
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    debug!(config = %args.config.display(), group = ?args.group, "running fit");
    let run = load_run(&args.config)?;
    let interpolator = run.interpolator()?;
    let groups: Vec<usize> = match args.group {
        Some(group) if group >= interpolator.groups().len() => {
            return Err(CliError::Compute(FluxError::not_found(
                "LOOKUP.CLI_GROUP",
                format!(
                    "parameter set {group} does not exist; {} configured",
                    interpolator.groups().len()
                ),
            )));
        }
        Some(group) => vec![group],
        None => (0..interpolator.groups().len()).collect(),
    };

    ensure_output_dir(&args.output_dir)?;
    for group in groups {
        let path = args.output_dir.join(format!("group-{group}.txt"));
        save_flat_table(&path, &interpolator.group_table(group)?, args.order.into())?;
        info!(group, path = %path.display(), "exported derivative table");
        println!("Wrote {}", path.display());
    }
    Ok(0)
}

pub(super) fn run_query_command(args: QueryArgs) -> Result<i32, CliError> {
    debug!(
        config = %args.config.display(),
        redshift = args.redshift,
        params = args.params.len(),
        "running query"
    );
    let run = load_run(&args.config)?;
    let interpolator = run.interpolator()?;
    let secondary = (!args.secondary.is_empty()).then_some(args.secondary.as_slice());
    let response = interpolator.query(&args.params, args.redshift, secondary)?;

    if args.json {
        let output = QueryOutput {
            redshift: args.redshift,
            kbins: interpolator.kbins(),
            response,
        };
        let rendered =
            serde_json::to_string_pretty(&output).context("failed to render query output")?;
        println!("{rendered}");
        return Ok(0);
    }
    for (k, value) in interpolator.kbins().iter().zip(response) {
        println!("{}", format_row([*k, value]));
    }
    Ok(0)
}

pub(super) fn run_compare_command(args: CompareArgs) -> Result<i32, CliError> {
    debug!(one = %args.one, two = %args.two, "running compare");
    let run = load_run(&args.config)?;
    let configured_box = run.source.config().box_size;
    let one = SimulationRun::new(&args.one, args.box_one.unwrap_or(configured_box));
    let two = SimulationRun::new(&args.two, args.box_two.unwrap_or(configured_box));

    let table = correction_table(run.source.as_ref(), one, two)?;
    for (row, redshift) in table.redshifts.iter().enumerate() {
        let values = (0..table.values.ncols()).map(|col| table.values[(row, col)]);
        println!("{}", format_row(std::iter::once(*redshift).chain(values)));
    }
    Ok(0)
}
