mod flux;
mod matter;
mod parser;
mod pdf;

pub use flux::FluxPowerSource;
pub use matter::MatterPowerSource;
pub use parser::{parse_numeric_table, read_numeric_table, TableParseError};
pub use pdf::FluxPdfSource;

use crate::common::{SourceConfig, SourceKind};
use crate::domain::{FluxError, FluxResult};
use crate::numerics::locate_first;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One loaded spectrum: wavenumbers (or flux bins) and their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerSpectrum {
    pub k: Vec<f64>,
    pub power: Vec<f64>,
}

impl PowerSpectrum {
    pub fn new(k: Vec<f64>, power: Vec<f64>) -> Self {
        Self { k, power }
    }

    pub fn len(&self) -> usize {
        self.k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.k.is_empty()
    }

    /// Elementwise `self / reference` on a shared grid.
    pub fn ratio_to(&self, reference: &PowerSpectrum) -> FluxResult<Vec<f64>> {
        if self.len() != reference.len() {
            return Err(FluxError::data_shape(
                "SHAPE.SPECTRUM_LENGTH",
                format!(
                    "cannot divide spectra of {} and {} rows",
                    self.len(),
                    reference.len()
                ),
            ));
        }
        Ok(self
            .power
            .iter()
            .zip(&reference.power)
            .map(|(value, base)| value / base)
            .collect())
    }
}

/// Loader and snapshot catalogue for one kind of simulation output.
pub trait PowerSpectrumSource {
    fn config(&self) -> &SourceConfig;

    /// Load `(k, P)` from `path`, applying the Fourier convention for `box_size`.
    fn load(&self, path: &Path, box_size: f64) -> FluxResult<PowerSpectrum>;

    /// Grid the derivative tables are expressed on.
    fn kbins(&self) -> &[f64];

    /// `false` when outputs share fixed bins and are compared bin by bin.
    fn rebins_ratios(&self) -> bool {
        true
    }

    fn kind(&self) -> SourceKind {
        self.config().kind
    }

    fn snapshots(&self) -> &[String] {
        &self.config().snapshots
    }

    /// Configured redshifts, in simulation order.
    fn redshifts(&self) -> &[f64] {
        &self.config().redshifts
    }

    fn redshift_for_snapshot(&self, name: &str) -> FluxResult<f64> {
        let config = self.config();
        config
            .snapshots
            .iter()
            .position(|snapshot| snapshot == name)
            .map(|index| config.redshifts[index])
            .ok_or_else(|| {
                FluxError::not_found("LOOKUP.SNAPSHOT", format!("{name} does not exist!"))
            })
    }

    fn redshift_index(&self, redshift: f64) -> FluxResult<usize> {
        locate_first(self.redshifts(), redshift).ok_or_else(|| {
            FluxError::not_found(
                "LOOKUP.REDSHIFT",
                format!("no snapshot at redshift {redshift}"),
            )
        })
    }

    fn snapshot_for_redshift(&self, redshift: f64) -> FluxResult<&str> {
        let index = self.redshift_index(redshift)?;
        Ok(self.config().snapshots[index].as_str())
    }

    /// Hubble rate `H(z)` in km/s/Mpc.
    fn hubble(&self, redshift: f64) -> f64 {
        let config = self.config();
        100.0
            * config.hubble
            * (config.omega_m * (1.0 + redshift).powi(3) + (1.0 - config.omega_m)).sqrt()
    }

    /// SDSS k-bins converted from s/km to h/Mpc at `redshift`.
    fn sdss_kbins(&self, redshift: f64) -> Vec<f64> {
        let factor = self.hubble(redshift) / (1.0 + redshift);
        self.config()
            .sdss_kbins
            .iter()
            .map(|k| k * factor)
            .collect()
    }

    fn run_file(&self, run: &str, snapshot: &str) -> PathBuf {
        self.config().run_file(run, snapshot)
    }

    /// Load one run's output at a configured redshift.
    fn load_run(&self, run: &str, redshift: f64, box_size: f64) -> FluxResult<PowerSpectrum> {
        let snapshot = self.snapshot_for_redshift(redshift)?;
        let path = self.run_file(run, snapshot);
        debug!(run, snapshot, path = %path.display(), "loading spectrum");
        self.load(&path, box_size)
    }
}

/// Build the source selected by `config.kind`.
///
/// A flux-power source without explicit k-bins takes them from
/// `reference_run` (run directory and box size).
pub fn build_source(
    config: SourceConfig,
    reference_run: Option<(&str, f64)>,
) -> FluxResult<Box<dyn PowerSpectrumSource>> {
    config.validate()?;
    let source: Box<dyn PowerSpectrumSource> = match config.kind {
        SourceKind::FluxPower => match (config.kbins.clone(), reference_run) {
            (Some(kbins), _) => Box::new(FluxPowerSource::with_kbins(config, kbins)?),
            (None, Some((run, box_size))) => {
                Box::new(FluxPowerSource::from_reference_run(config, run, box_size)?)
            }
            (None, None) => {
                return Err(FluxError::data_shape(
                    "SHAPE.SOURCE_KBINS",
                    "flux power source needs explicit kbins or a reference run",
                ));
            }
        },
        SourceKind::MatterPower => Box::new(MatterPowerSource::new(config)?),
        SourceKind::FluxPdf => Box::new(FluxPdfSource::new(config)?),
    };
    Ok(source)
}

/// `H0 / box`, the unit conversion between grid modes and h/Mpc.
pub(crate) fn fourier_scale(hubble: f64, box_size: f64) -> FluxResult<f64> {
    if !(box_size > 0.0) {
        return Err(FluxError::data_shape(
            "SHAPE.BOX_SIZE",
            format!("box size must be positive, got {box_size}"),
        ));
    }
    Ok(hubble / box_size)
}

/// Drop the metadata row and convert raw mode numbers to wavenumbers.
pub(crate) fn fourier_wavenumbers(rows: &[Vec<f64>], offset: f64, scale: f64) -> Vec<f64> {
    rows.iter()
        .skip(1)
        .map(|row| (row[0] - offset) * scale * 2.0 * PI)
        .collect()
}

pub(crate) fn data_column(rows: &[Vec<f64>], column: usize, divisor: f64) -> Vec<f64> {
    rows.iter().skip(1).map(|row| row[column] / divisor).collect()
}


#[cfg(test)]
mod tests {
    use super::{build_source, PowerSpectrumSource};
    use crate::common::{SourceConfig, SourceKind};
    use crate::domain::FluxErrorCategory;

    fn flux_source() -> Box<dyn PowerSpectrumSource> {
        let mut config = SourceConfig::defaults(SourceKind::FluxPower);
        config.kbins = Some(vec![0.1, 0.2]);
        build_source(config, None).expect("source should build")
    }

    #[test]
    fn snapshot_redshift_lookup_is_a_bijection() {
        let source = flux_source();
        for (snapshot, redshift) in source.snapshots().iter().zip(source.redshifts()) {
            assert_eq!(source.snapshot_for_redshift(*redshift).unwrap(), snapshot.as_str());
            assert_eq!(source.redshift_for_snapshot(snapshot).unwrap(), *redshift);
        }
        assert_eq!(source.snapshot_for_redshift(3.0 + 1e-9).unwrap(), "snapshot_006");
    }

    #[test]
    fn unknown_snapshot_and_redshift_are_not_found() {
        let source = flux_source();
        let error = source.redshift_for_snapshot("snapshot_099").unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::NotFound);
        assert!(error.message().contains("snapshot_099"));
        let error = source.snapshot_for_redshift(5.0).unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::NotFound);
        assert!(error.message().contains('5'));
    }

    #[test]
    fn hubble_and_sdss_kbins_follow_flat_lcdm() {
        let source = flux_source();
        let expected = 100.0 * 0.71 * (0.266 * 27.0 + 0.734_f64).sqrt();
        assert!((source.hubble(2.0) - expected).abs() < 1e-10);

        let sdss = source.sdss_kbins(2.0);
        assert_eq!(sdss.len(), 12);
        assert!((sdss[0] - 0.00141 * expected / 3.0).abs() < 1e-12);
    }

    #[test]
    fn flux_source_without_kbins_or_reference_is_rejected() {
        let config = SourceConfig::defaults(SourceKind::FluxPower);
        let error = build_source(config, None)
            .err()
            .expect("source cannot pick kbins");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }
}
