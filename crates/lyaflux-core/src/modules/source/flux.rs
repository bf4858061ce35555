use super::{
    data_column, fourier_scale, fourier_wavenumbers, read_numeric_table, PowerSpectrum,
    PowerSpectrumSource,
};
use crate::common::constants::mean_flux;
use crate::common::SourceConfig;
use crate::domain::{FluxError, FluxResult};
use crate::numerics::{locate_equal, LOCATE_EPSILON};
use std::path::Path;
use tracing::debug;

/// Raw flux power mode numbers are bin edges; the centre sits half a mode in.
const FLUX_MODE_OFFSET: f64 = 0.5;

/// Lyman-alpha flux power spectra.
#[derive(Debug, Clone)]
pub struct FluxPowerSource {
    config: SourceConfig,
    kbins: Vec<f64>,
}

impl FluxPowerSource {
    pub fn with_kbins(config: SourceConfig, kbins: Vec<f64>) -> FluxResult<Self> {
        if kbins.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.SOURCE_KBINS",
                "flux power source needs at least one k-bin",
            ));
        }
        Ok(Self { config, kbins })
    }

    /// Take the k-bins from the first snapshot of `run`, keeping `k <= kmax`.
    pub fn from_reference_run(config: SourceConfig, run: &str, box_size: f64) -> FluxResult<Self> {
        let snapshot = config.snapshots.first().cloned().ok_or_else(|| {
            FluxError::data_shape("SHAPE.SNAPSHOT_TABLE", "snapshot table must not be empty")
        })?;
        let probe = Self {
            config,
            kbins: Vec::new(),
        };
        let spectrum = probe.load(&probe.run_file(run, &snapshot), box_size)?;
        let kmax = probe.config.kmax;
        let kbins: Vec<f64> = spectrum.k.into_iter().filter(|k| *k <= kmax).collect();
        debug!(run, snapshot = %snapshot, count = kbins.len(), kmax, "k-bins from reference run");
        Self::with_kbins(probe.config, kbins)
    }

    /// Observed SDSS flux power at `redshift` from rows of `(z, k, P, ...)`.
    ///
    /// Converts `k` from s/km to h/Mpc and rescales `P` by the mean flux
    /// squared.
    pub fn observed_flux_power(
        &self,
        rows: &[Vec<f64>],
        redshift: f64,
    ) -> FluxResult<PowerSpectrum> {
        let redshift_column: Vec<f64> = rows
            .iter()
            .map(|row| row.first().copied().unwrap_or(f64::NAN))
            .collect();
        let selected = locate_equal(&redshift_column, redshift, LOCATE_EPSILON);
        if selected.is_empty() {
            return Err(FluxError::not_found(
                "LOOKUP.OBSERVED_REDSHIFT",
                format!("no observed flux power at redshift {redshift}"),
            ));
        }
        if let Some(&short) = selected.iter().find(|index| rows[**index].len() < 3) {
            return Err(FluxError::data_shape(
                "SHAPE.OBSERVED_TABLE",
                format!(
                    "observed flux power row {} has {} columns, expected at least 3",
                    short + 1,
                    rows[short].len()
                ),
            ));
        }

        let fbar = mean_flux(redshift);
        let scale = self.hubble(redshift) / (1.0 + redshift);
        let k = selected.iter().map(|index| rows[*index][1] * scale).collect();
        let power = selected
            .iter()
            .map(|index| rows[*index][2] * fbar * fbar / scale)
            .collect();
        Ok(PowerSpectrum::new(k, power))
    }

    pub fn load_observed_flux_power(
        &self,
        path: &Path,
        redshift: f64,
    ) -> FluxResult<PowerSpectrum> {
        let rows = read_numeric_table(path, 3)?;
        self.observed_flux_power(&rows, redshift)
    }
}

impl PowerSpectrumSource for FluxPowerSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn load(&self, path: &Path, box_size: f64) -> FluxResult<PowerSpectrum> {
        let scale = fourier_scale(self.config.hubble, box_size)?;
        let rows = read_numeric_table(path, 2)?;
        let spectrum = PowerSpectrum::new(
            fourier_wavenumbers(&rows, FLUX_MODE_OFFSET, scale),
            data_column(&rows, 1, scale),
        );
        if spectrum.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.SPECTRUM",
                format!("'{}' has no rows after the header", path.display()),
            ));
        }
        Ok(spectrum)
    }

    fn kbins(&self) -> &[f64] {
        &self.kbins
    }
}
