//! JSON configuration for power-spectrum sources and parameter sets.
//!
//! Every field of a source configuration is optional on disk; missing values
//! are filled from the defaults of the selected [`SourceKind`].

use super::constants::{
    unit_bin_centres, DEFAULT_BIN_COUNT, DEFAULT_BOX_SIZE, DEFAULT_HUBBLE, DEFAULT_KMAX,
    DEFAULT_OMEGA_B, DEFAULT_OMEGA_M, DEFAULT_PDF_BOX_SIZE, PDF_BIN_COUNT, PDF_REDSHIFTS,
    PDF_SNAPSHOTS, SDSS_KBINS, STANDARD_REDSHIFTS, STANDARD_SNAPSHOTS,
};
use crate::domain::{FluxError, FluxResult, ParamValue};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    FluxPower,
    MatterPower,
    FluxPdf,
}

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FluxPower => "flux-power",
            Self::MatterPower => "matter-power",
            Self::FluxPdf => "flux-pdf",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// File-name substitution giving the dark-matter companion of a baryon file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanionSubstitution {
    pub from: String,
    pub to: String,
}

impl Default for CompanionSubstitution {
    fn default() -> Self {
        Self {
            from: "by".to_string(),
            to: "DM".to_string(),
        }
    }
}

/// Fully resolved source configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub snapshots: Vec<String>,
    pub redshifts: Vec<f64>,
    pub sdss_kbins: Vec<f64>,
    pub omega_m: f64,
    pub omega_b: f64,
    pub hubble: f64,
    pub box_size: f64,
    pub base_dir: PathBuf,
    pub run_suffix: String,
    pub file_prefix: String,
    pub extension: String,
    pub kbins: Option<Vec<f64>>,
    pub kmax: f64,
    pub companion: CompanionSubstitution,
}

impl SourceConfig {
    pub fn defaults(kind: SourceKind) -> Self {
        let (snapshots, redshifts): (Vec<String>, Vec<f64>) = match kind {
            SourceKind::FluxPdf => (
                PDF_SNAPSHOTS.iter().map(|name| name.to_string()).collect(),
                PDF_REDSHIFTS.to_vec(),
            ),
            SourceKind::FluxPower | SourceKind::MatterPower => (
                STANDARD_SNAPSHOTS.iter().map(|name| name.to_string()).collect(),
                STANDARD_REDSHIFTS.to_vec(),
            ),
        };
        let sdss_kbins = match kind {
            SourceKind::FluxPdf => (0..PDF_BIN_COUNT).map(|bin| bin as f64).collect(),
            SourceKind::FluxPower | SourceKind::MatterPower => SDSS_KBINS.to_vec(),
        };
        let (run_suffix, file_prefix, extension) = match kind {
            SourceKind::FluxPower => ("flux-power/", "", "_flux_power.txt"),
            SourceKind::MatterPower => ("matter-power/", "PK-by-", ".0"),
            SourceKind::FluxPdf => ("flux-pdf/", "", "_flux_pdf.txt"),
        };
        let kbins = match kind {
            SourceKind::FluxPower => None,
            SourceKind::MatterPower => Some(unit_bin_centres(DEFAULT_BIN_COUNT)),
            SourceKind::FluxPdf => Some(unit_bin_centres(PDF_BIN_COUNT)),
        };

        Self {
            kind,
            snapshots,
            redshifts,
            sdss_kbins,
            omega_m: DEFAULT_OMEGA_M,
            omega_b: DEFAULT_OMEGA_B,
            hubble: DEFAULT_HUBBLE,
            box_size: match kind {
                SourceKind::FluxPdf => DEFAULT_PDF_BOX_SIZE,
                SourceKind::FluxPower | SourceKind::MatterPower => DEFAULT_BOX_SIZE,
            },
            base_dir: PathBuf::from("."),
            run_suffix: run_suffix.to_string(),
            file_prefix: file_prefix.to_string(),
            extension: extension.to_string(),
            kbins,
            kmax: DEFAULT_KMAX,
            companion: CompanionSubstitution::default(),
        }
    }

    pub fn validate(&self) -> FluxResult<()> {
        if self.snapshots.len() != self.redshifts.len() {
            return Err(FluxError::data_shape(
                "SHAPE.SNAPSHOT_TABLE",
                format!(
                    "there are {} snapshots, but {} redshifts given",
                    self.snapshots.len(),
                    self.redshifts.len()
                ),
            ));
        }
        if self.snapshots.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.SNAPSHOT_TABLE",
                "snapshot table must not be empty",
            ));
        }
        if !(self.box_size > 0.0) || !(self.hubble > 0.0) {
            return Err(FluxError::data_shape(
                "SHAPE.COSMOLOGY",
                format!(
                    "box size and hubble parameter must be positive, got box={} h={}",
                    self.box_size, self.hubble
                ),
            ));
        }
        if !(self.omega_m > 0.0) {
            return Err(FluxError::data_shape(
                "SHAPE.COSMOLOGY",
                format!("omega_m must be positive, got {}", self.omega_m),
            ));
        }
        Ok(())
    }

    /// Path of one run's output for one snapshot.
    pub fn run_file(&self, run: &str, snapshot: &str) -> PathBuf {
        self.base_dir.join(run).join(format!(
            "{}{}{}{}",
            self.run_suffix, self.file_prefix, snapshot, self.extension
        ))
    }
}

/// On-disk form of [`SourceConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfigFile {
    pub kind: SourceKind,
    #[serde(default)]
    pub snapshots: Option<Vec<String>>,
    #[serde(default)]
    pub redshifts: Option<Vec<f64>>,
    #[serde(default)]
    pub sdss_kbins: Option<Vec<f64>>,
    #[serde(default)]
    pub omega_m: Option<f64>,
    #[serde(default)]
    pub omega_b: Option<f64>,
    #[serde(default)]
    pub hubble: Option<f64>,
    #[serde(default)]
    pub box_size: Option<f64>,
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub run_suffix: Option<String>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub kbins: Option<Vec<f64>>,
    #[serde(default)]
    pub kmax: Option<f64>,
    #[serde(default)]
    pub companion: Option<CompanionSubstitution>,
}

impl SourceConfigFile {
    pub fn resolve(self) -> FluxResult<SourceConfig> {
        let defaults = SourceConfig::defaults(self.kind);
        let config = SourceConfig {
            kind: self.kind,
            snapshots: self.snapshots.unwrap_or(defaults.snapshots),
            redshifts: self.redshifts.unwrap_or(defaults.redshifts),
            sdss_kbins: self.sdss_kbins.unwrap_or(defaults.sdss_kbins),
            omega_m: self.omega_m.unwrap_or(defaults.omega_m),
            omega_b: self.omega_b.unwrap_or(defaults.omega_b),
            hubble: self.hubble.unwrap_or(defaults.hubble),
            box_size: self.box_size.unwrap_or(defaults.box_size),
            base_dir: self.base_dir.unwrap_or(defaults.base_dir),
            run_suffix: self.run_suffix.unwrap_or(defaults.run_suffix),
            file_prefix: self.file_prefix.unwrap_or(defaults.file_prefix),
            extension: self.extension.unwrap_or(defaults.extension),
            kbins: self.kbins.or(defaults.kbins),
            kmax: self.kmax.unwrap_or(defaults.kmax),
            companion: self.companion.unwrap_or(defaults.companion),
        };
        config.validate()?;
        Ok(config)
    }
}

/// On-disk form of a parameter set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnotConfig {
    pub names: Vec<String>,
    pub values: Vec<ParamValue>,
    pub fiducial: ParamValue,
    #[serde(default)]
    pub secondary_values: Option<Vec<ParamValue>>,
    #[serde(default)]
    pub secondary_fiducial: Option<ParamValue>,
    pub fiducial_run: String,
    pub fiducial_box: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    pub source: SourceConfigFile,
    #[serde(default)]
    pub knots: Vec<KnotConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ConfigError> for FluxError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Read { .. } => FluxError::io("IO.CONFIG_READ", error.to_string()),
            ConfigError::Parse { .. } => {
                FluxError::data_shape("SHAPE.CONFIG_PARSE", error.to_string())
            }
        }
    }
}

pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{load_run_config, ConfigError, SourceConfig, SourceConfigFile, SourceKind};
    use crate::domain::{FluxErrorCategory, ParamValue};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn kind_defaults_match_standard_layouts() {
        let flux = SourceConfig::defaults(SourceKind::FluxPower);
        assert_eq!(flux.snapshots.len(), 12);
        assert_eq!(flux.extension, "_flux_power.txt");
        assert!(flux.kbins.is_none());

        let matter = SourceConfig::defaults(SourceKind::MatterPower);
        assert_eq!(matter.file_prefix, "PK-by-");
        assert_eq!(matter.kbins.as_ref().map(Vec::len), Some(20));

        let pdf = SourceConfig::defaults(SourceKind::FluxPdf);
        assert_eq!(pdf.redshifts, vec![3.0, 2.8, 2.6, 2.4, 2.2, 2.0]);
        assert_eq!(pdf.box_size, 48.0);
    }

    #[test]
    fn run_file_joins_run_suffix_prefix_and_extension() {
        let mut config = SourceConfig::defaults(SourceKind::MatterPower);
        config.base_dir = "runs".into();
        assert_eq!(
            config.run_file("A0.54/", "snapshot_003"),
            Path::new("runs/A0.54/matter-power/PK-by-snapshot_003.0")
        );
    }

    #[test]
    fn mismatched_snapshot_table_is_rejected() {
        let file: SourceConfigFile = serde_json::from_str(
            r#"{ "kind": "flux-power", "snapshots": ["snapshot_000"], "redshifts": [4.2, 4.0] }"#,
        )
        .unwrap();
        let error = file.resolve().expect_err("table lengths differ");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
        assert!(error.message().contains("1 snapshots"));
    }

    #[test]
    fn run_config_loads_knots_with_scalar_and_series_values() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("run.json");
        fs::write(
            &path,
            r#"
            {
              "source": { "kind": "flux-power", "boxSize": 30.0, "kbins": [0.5, 1.0] },
              "knots": [
                {
                  "names": ["A0.84/", "A1.04/"],
                  "values": [0.84, 1.04],
                  "fiducial": 0.94,
                  "fiducialRun": "best-fit/",
                  "fiducialBox": 60.0
                },
                {
                  "names": ["G1/", "G2/"],
                  "values": [[1.1, 1.2], [1.3, 1.4]],
                  "fiducial": [1.2, 1.3],
                  "fiducialRun": "bf2/",
                  "fiducialBox": 60.0
                }
              ]
            }
            "#,
        )
        .unwrap();

        let config = load_run_config(&path).expect("config should load");
        assert_eq!(config.knots.len(), 2);
        assert_eq!(config.knots[0].fiducial, ParamValue::Scalar(0.94));
        assert_eq!(
            config.knots[1].values[1],
            ParamValue::PerRedshift(vec![1.3, 1.4])
        );
        let source = config.source.resolve().unwrap();
        assert_eq!(source.box_size, 30.0);
        assert_eq!(source.kbins, Some(vec![0.5, 1.0]));
    }

    #[test]
    fn missing_config_reports_path() {
        let error = load_run_config("does/not/exist.json").expect_err("file is missing");
        assert!(matches!(error, ConfigError::Read { .. }));
        assert!(error.to_string().contains("does/not/exist.json"));
    }
}
