use super::{
    data_column, fourier_scale, fourier_wavenumbers, read_numeric_table, PowerSpectrum,
    PowerSpectrumSource,
};
use crate::common::constants::{unit_bin_centres, DEFAULT_BIN_COUNT};
use crate::common::SourceConfig;
use crate::domain::{FluxError, FluxResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Total matter power from a baryon spectrum and its dark-matter companion.
#[derive(Debug, Clone)]
pub struct MatterPowerSource {
    config: SourceConfig,
    kbins: Vec<f64>,
}

impl MatterPowerSource {
    pub fn new(config: SourceConfig) -> FluxResult<Self> {
        if !(config.omega_b >= 0.0 && config.omega_b <= config.omega_m) {
            return Err(FluxError::data_shape(
                "SHAPE.COSMOLOGY",
                format!(
                    "omega_b must lie in [0, omega_m={}], got {}",
                    config.omega_m, config.omega_b
                ),
            ));
        }
        let kbins = config
            .kbins
            .clone()
            .unwrap_or_else(|| unit_bin_centres(DEFAULT_BIN_COUNT));
        Ok(Self { config, kbins })
    }

    /// Path of the dark-matter file paired with the baryon file at `path`.
    pub fn companion_path(&self, path: &Path) -> FluxResult<PathBuf> {
        let substitution = &self.config.companion;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.contains(substitution.from.as_str()))
            .ok_or_else(|| {
                FluxError::data_shape(
                    "SHAPE.COMPANION",
                    format!(
                        "cannot derive companion of '{}': file name lacks '{}'",
                        path.display(),
                        substitution.from
                    ),
                )
            })?;
        Ok(path.with_file_name(file_name.replace(substitution.from.as_str(), &substitution.to)))
    }
}

impl PowerSpectrumSource for MatterPowerSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn load(&self, path: &Path, box_size: f64) -> FluxResult<PowerSpectrum> {
        let scale = fourier_scale(self.config.hubble, box_size)?;
        let volume = scale.powi(3);

        let baryon_rows = read_numeric_table(path, 2)?;
        let companion = self.companion_path(path)?;
        debug!(path = %companion.display(), "loading dark-matter companion");
        let dark_rows = read_numeric_table(&companion, 2)?;
        if baryon_rows.len() != dark_rows.len() {
            return Err(FluxError::data_shape(
                "SHAPE.COMPANION",
                format!(
                    "'{}' has {} rows but its companion '{}' has {}",
                    path.display(),
                    baryon_rows.len(),
                    companion.display(),
                    dark_rows.len()
                ),
            ));
        }

        let k = fourier_wavenumbers(&baryon_rows, 0.0, scale);
        if k.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.SPECTRUM",
                format!("'{}' has no rows after the header", path.display()),
            ));
        }
        let omega_m = self.config.omega_m;
        let omega_b = self.config.omega_b;
        let power = data_column(&baryon_rows, 1, volume)
            .into_iter()
            .zip(data_column(&dark_rows, 1, volume))
            .map(|(baryon, dark)| (baryon * omega_b + dark * (omega_m - omega_b)) / omega_m)
            .collect();
        Ok(PowerSpectrum::new(k, power))
    }

    fn kbins(&self) -> &[f64] {
        &self.kbins
    }
}

#[cfg(test)]
mod tests {
    use super::MatterPowerSource;
    use crate::common::{SourceConfig, SourceKind};
    use crate::domain::FluxErrorCategory;
    use crate::modules::source::test_support::write_table;
    use crate::modules::source::PowerSpectrumSource;
    use std::f64::consts::PI;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn companion_substitution_touches_only_the_file_name() {
        let source = MatterPowerSource::new(SourceConfig::defaults(SourceKind::MatterPower)).unwrap();
        let companion = source
            .companion_path(Path::new("runs/by-run/matter-power/PK-by-snapshot_003.0"))
            .unwrap();
        assert_eq!(
            companion,
            Path::new("runs/by-run/matter-power/PK-DM-snapshot_003.0")
        );

        let error = source
            .companion_path(Path::new("runs/PK-gas-snapshot_003.0"))
            .expect_err("no substring to substitute");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }

    #[test]
    fn combines_baryon_and_dark_matter_weighted_by_density() {
        let temp = TempDir::new().expect("tempdir should be created");
        let scale: f64 = 0.71 / 60.0;
        let volume = scale.powi(3);
        let baryon = temp.path().join("PK-by-snapshot_000.0");
        let dark = temp.path().join("PK-DM-snapshot_000.0");
        write_table(&baryon, &[(0.0, 0.0), (1.0, 2.0 * volume), (2.0, 2.0 * volume)]);
        write_table(&dark, &[(0.0, 0.0), (1.0, volume), (2.0, volume)]);

        let source = MatterPowerSource::new(SourceConfig::defaults(SourceKind::MatterPower)).unwrap();
        let spectrum = source.load(&baryon, 60.0).expect("pair should load");

        let expected = (2.0 * 0.0449 + (0.266 - 0.0449)) / 0.266;
        assert_eq!(spectrum.len(), 2);
        assert!((spectrum.k[0] - scale * 2.0 * PI).abs() < 1e-15);
        assert!(spectrum.power.iter().all(|p| (p - expected).abs() < 1e-10));
    }

    #[test]
    fn unit_scaled_input_gives_unit_power() {
        let temp = TempDir::new().expect("tempdir should be created");
        let volume = (0.71_f64 / 30.0).powi(3);
        let baryon = temp.path().join("PK-by-snapshot_001.0");
        write_table(&baryon, &[(0.0, 5.0), (1.0, volume), (3.0, volume)]);
        write_table(
            &temp.path().join("PK-DM-snapshot_001.0"),
            &[(0.0, 5.0), (1.0, volume), (3.0, volume)],
        );

        let source = MatterPowerSource::new(SourceConfig::defaults(SourceKind::MatterPower)).unwrap();
        let spectrum = source.load(&baryon, 30.0).unwrap();
        assert!(spectrum.power.iter().all(|p| (p - 1.0).abs() < 1e-10));
    }

    #[test]
    fn missing_companion_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let baryon = temp.path().join("PK-by-snapshot_000.0");
        write_table(&baryon, &[(0.0, 0.0), (1.0, 1.0)]);
        let source = MatterPowerSource::new(SourceConfig::defaults(SourceKind::MatterPower)).unwrap();
        let error = source.load(&baryon, 60.0).expect_err("companion is missing");
        assert_eq!(error.category(), FluxErrorCategory::Io);
        assert!(error.message().contains("PK-DM-snapshot_000.0"));
    }
}
