use super::{read_numeric_table, PowerSpectrum, PowerSpectrumSource};
use crate::common::constants::{unit_bin_centres, PDF_BIN_COUNT};
use crate::common::SourceConfig;
use crate::domain::FluxResult;
use std::path::Path;

/// Flux probability density. Columns are flux bin and density, with no
/// header row and no Fourier rescaling.
#[derive(Debug, Clone)]
pub struct FluxPdfSource {
    config: SourceConfig,
    kbins: Vec<f64>,
}

impl FluxPdfSource {
    pub fn new(config: SourceConfig) -> FluxResult<Self> {
        let kbins = config
            .kbins
            .clone()
            .unwrap_or_else(|| unit_bin_centres(PDF_BIN_COUNT));
        Ok(Self { config, kbins })
    }
}

impl PowerSpectrumSource for FluxPdfSource {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn load(&self, path: &Path, _box_size: f64) -> FluxResult<PowerSpectrum> {
        let rows = read_numeric_table(path, 2)?;
        let (k, power) = rows.iter().map(|row| (row[0], row[1])).unzip();
        Ok(PowerSpectrum::new(k, power))
    }

    fn kbins(&self) -> &[f64] {
        &self.kbins
    }

    fn rebins_ratios(&self) -> bool {
        false
    }
}
