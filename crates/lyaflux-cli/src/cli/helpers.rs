use super::CliError;
use anyhow::Context;
use lyaflux_core::common::{load_run_config, SourceConfig};
use lyaflux_core::domain::{FluxError, ParamValue};
use lyaflux_core::modules::{build_source, FluxInterpolator, ParameterSet, PowerSpectrumSource};
use lyaflux_core::modules::interp::format_significant;
use std::fs;
use std::path::{Path, PathBuf};

/// A run configuration with its source built and knots validated.
pub(super) struct LoadedRun {
    pub(super) source: Box<dyn PowerSpectrumSource>,
    pub(super) knots: Vec<ParameterSet>,
}

impl LoadedRun {
    pub(super) fn interpolator(&self) -> Result<FluxInterpolator, CliError> {
        if self.knots.is_empty() {
            return Err(CliError::Compute(FluxError::data_shape(
                "SHAPE.CLI_KNOTS",
                "configuration does not define any parameter sets",
            )));
        }
        Ok(FluxInterpolator::build(self.source.as_ref(), &self.knots)?)
    }
}

/// Load `config_path` and build its source.
///
/// A relative `baseDir` is taken relative to the configuration file. The
/// first knot's fiducial run supplies the flux k-bins when none are given.
pub(super) fn load_run(config_path: &Path) -> Result<LoadedRun, CliError> {
    let run = load_run_config(config_path).map_err(FluxError::from)?;
    let mut source_config = run.source.resolve()?;
    source_config.base_dir = resolve_base_dir(config_path, &source_config);

    let knots = run
        .knots
        .iter()
        .map(ParameterSet::from_config)
        .collect::<Result<Vec<_>, _>>()?;
    let reference = knots
        .first()
        .map(|knot| (knot.fiducial_run(), knot.fiducial_box()));
    let source = build_source(source_config, reference)?;
    Ok(LoadedRun { source, knots })
}

fn resolve_base_dir(config_path: &Path, config: &SourceConfig) -> PathBuf {
    if config.base_dir.is_absolute() {
        return config.base_dir.clone();
    }
    config_path
        .parent()
        .map(|parent| parent.join(&config.base_dir))
        .unwrap_or_else(|| config.base_dir.clone())
}

pub(super) fn ensure_output_dir(path: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create output directory '{}'", path.display()))
}

/// Parse a parameter given as `0.94` or as a comma-separated series.
pub(super) fn parse_param_value(token: &str) -> Result<ParamValue, String> {
    let values = token
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid parameter value '{part}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [single] if !token.contains(',') => Ok(ParamValue::Scalar(*single)),
        _ => Ok(ParamValue::PerRedshift(values)),
    }
}

pub(super) fn format_row(values: impl IntoIterator<Item = f64>) -> String {
    values
        .into_iter()
        .map(format_significant)
        .collect::<Vec<_>>()
        .join(" ")
}
