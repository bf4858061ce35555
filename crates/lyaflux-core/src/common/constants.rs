//! Standard simulation layout and observational constants.

/// Snapshot names of the standard 12-output power-spectrum runs.
pub const STANDARD_SNAPSHOTS: [&str; 12] = [
    "snapshot_000",
    "snapshot_001",
    "snapshot_002",
    "snapshot_003",
    "snapshot_004",
    "snapshot_005",
    "snapshot_006",
    "snapshot_007",
    "snapshot_008",
    "snapshot_009",
    "snapshot_010",
    "snapshot_011",
];

/// Redshifts of [`STANDARD_SNAPSHOTS`], in simulation (decreasing) order.
pub const STANDARD_REDSHIFTS: [f64; 12] = [4.2, 4.0, 3.8, 3.6, 3.4, 3.2, 3.0, 2.8, 2.6, 2.4, 2.2, 2.0];

/// Flux PDF outputs only exist for the low-redshift half of the runs.
pub const PDF_SNAPSHOTS: [&str; 6] = [
    "snapshot_006",
    "snapshot_007",
    "snapshot_008",
    "snapshot_009",
    "snapshot_010",
    "snapshot_011",
];

pub const PDF_REDSHIFTS: [f64; 6] = [3.0, 2.8, 2.6, 2.4, 2.2, 2.0];

/// Redshifts of the published flux PDF tables.
pub const PDF_TABLE_REDSHIFTS: [f64; 3] = [2.07, 2.52, 2.94];

/// SDSS flux power k-bins, in s/km.
pub const SDSS_KBINS: [f64; 12] = [
    0.00141, 0.00178, 0.00224, 0.00282, 0.00355, 0.00447, 0.00562, 0.00708, 0.00891, 0.01122,
    0.01413, 0.01778,
];

pub const DEFAULT_OMEGA_M: f64 = 0.266;
pub const DEFAULT_OMEGA_B: f64 = 0.0449;
pub const DEFAULT_HUBBLE: f64 = 0.71;
pub const DEFAULT_BOX_SIZE: f64 = 60.0;
pub const DEFAULT_PDF_BOX_SIZE: f64 = 48.0;

/// Flux power k-bins stop here (h/Mpc) when taken from a reference run.
pub const DEFAULT_KMAX: f64 = 4.0;

/// Matter power fallback bins.
pub const DEFAULT_BIN_COUNT: usize = 20;

/// Flux PDF outputs carry this many rows, one per flux bin.
pub const PDF_BIN_COUNT: usize = 21;

/// Effective optical depth `tau = A (1+z)^S`.
pub const MEAN_FLUX_TAU_AMPLITUDE: f64 = 0.0023;
pub const MEAN_FLUX_TAU_SLOPE: f64 = 3.65;

/// Velocity separation of the SiIII line from Lyman-alpha, km/s.
pub const SI_III_SEPARATION: f64 = 2271.0;

pub fn effective_optical_depth(redshift: f64) -> f64 {
    MEAN_FLUX_TAU_AMPLITUDE * (1.0 + redshift).powf(MEAN_FLUX_TAU_SLOPE)
}

pub fn mean_flux(redshift: f64) -> f64 {
    (-effective_optical_depth(redshift)).exp()
}

/// Bin centres `0.5, 1.5, ...` used by sources without a native k grid.
pub fn unit_bin_centres(count: usize) -> Vec<f64> {
    (0..count).map(|index| index as f64 + 0.5).collect()
}
