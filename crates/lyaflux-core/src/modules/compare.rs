//! Direct comparisons between simulation runs on the SDSS k-bins.

use super::source::{PowerSpectrum, PowerSpectrumSource};
use crate::common::constants::{mean_flux, SI_III_SEPARATION};
use crate::domain::{FluxError, FluxResult};
use crate::numerics::{rebin, smooth_rebin, DEFAULT_SMOOTHING_WINDOW};
use faer::Mat;
use std::f64::consts::PI;
use tracing::{debug, info};

/// A run directory and the box size its outputs were produced with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRun<'a> {
    pub name: &'a str,
    pub box_size: f64,
}

impl<'a> SimulationRun<'a> {
    pub fn new(name: &'a str, box_size: f64) -> Self {
        Self { name, box_size }
    }
}

/// Rows of values on the SDSS k-bins, one row per redshift (ascending).
#[derive(Debug, Clone)]
pub struct ComparisonTable {
    pub redshifts: Vec<f64>,
    pub values: Mat<f64>,
}

impl ComparisonTable {
    fn from_rows(mut rows: Vec<(f64, Vec<f64>)>) -> FluxResult<Self> {
        rows.sort_by(|left, right| left.0.total_cmp(&right.0));
        let width = rows.first().map_or(0, |(_, row)| row.len());
        if let Some((redshift, row)) = rows.iter().find(|(_, row)| row.len() != width) {
            return Err(FluxError::data_shape(
                "SHAPE.COMPARISON_TABLE",
                format!(
                    "row at z={redshift} has {} bins, expected {width}",
                    row.len()
                ),
            ));
        }
        let values = Mat::from_fn(rows.len(), width, |row, col| rows[row].1[col]);
        Ok(Self {
            redshifts: rows.iter().map(|(redshift, _)| *redshift).collect(),
            values,
        })
    }

    /// Values with bins as rows and redshifts as columns.
    pub fn transposed(&self) -> Mat<f64> {
        Mat::from_fn(self.values.ncols(), self.values.nrows(), |row, col| {
            self.values[(col, row)]
        })
    }
}

/// Power of `two` over power of `one` at `redshift`, on the SDSS k-bins.
///
/// Both spectra are rebinned onto the part of `one`'s grid covered by
/// `two`; SDSS bins at or below the first common wavenumber are set to 1.
pub fn compare_two(
    source: &dyn PowerSpectrumSource,
    one: SimulationRun<'_>,
    two: SimulationRun<'_>,
    redshift: f64,
) -> FluxResult<Vec<f64>> {
    let (common_k, relative) = relative_power(source, one, two, redshift)?;
    let sdss = source.sdss_kbins(redshift);
    let first = sdss.partition_point(|k| *k <= common_k[0]);
    let mut ratio = vec![1.0; sdss.len()];
    if first < sdss.len() {
        let rebinned = rebin(&relative, &common_k, &sdss[first..])?;
        ratio[first..].copy_from_slice(&rebinned);
    }
    Ok(ratio)
}

/// [`compare_two`] at every configured redshift but the last.
pub fn correction_table(
    source: &dyn PowerSpectrumSource,
    one: SimulationRun<'_>,
    two: SimulationRun<'_>,
) -> FluxResult<ComparisonTable> {
    let redshifts = source.redshifts();
    info!(one = one.name, two = two.name, "building correction table");
    let rows = redshifts[..redshifts.len().saturating_sub(1)]
        .iter()
        .map(|redshift| Ok((*redshift, compare_two(source, one, two, *redshift)?)))
        .collect::<FluxResult<Vec<_>>>()?;
    ComparisonTable::from_rows(rows)
}

/// Smoothed ratio `two / one` on the SDSS k-bins at every configured redshift.
pub fn difference_table(
    source: &dyn PowerSpectrumSource,
    one: SimulationRun<'_>,
    two: SimulationRun<'_>,
) -> FluxResult<ComparisonTable> {
    info!(one = one.name, two = two.name, "building difference table");
    let rows = source
        .redshifts()
        .iter()
        .map(|redshift| {
            let (common_k, relative) = relative_power(source, one, two, *redshift)?;
            let smoothed = smooth_rebin(
                &relative,
                &common_k,
                &source.sdss_kbins(*redshift),
                DEFAULT_SMOOTHING_WINDOW,
            )?;
            Ok((*redshift, smoothed))
        })
        .collect::<FluxResult<Vec<_>>>()?;
    ComparisonTable::from_rows(rows)
}

/// Flux power of `run` on the SDSS k-bins in velocity units, for every
/// configured redshift but the last, with the interval-averaged SiIII
/// cross-correlation correction for amplitude `si_amplitude`.
pub fn flat_power_table(
    source: &dyn PowerSpectrumSource,
    run: &str,
    si_amplitude: f64,
) -> FluxResult<ComparisonTable> {
    let redshifts = source.redshifts();
    let box_size = source.config().box_size;
    let rows = redshifts[..redshifts.len().saturating_sub(1)]
        .iter()
        .map(|redshift| {
            let spectrum = source.load_run(run, *redshift, box_size)?;
            let velocity_scale = source.hubble(*redshift) / (1.0 + redshift);
            let correction =
                si_iii_correction(&source.config().sdss_kbins, *redshift, si_amplitude);
            let power = rebin(&spectrum.power, &spectrum.k, &source.sdss_kbins(*redshift))?;
            let row = power
                .iter()
                .zip(correction)
                .map(|(value, factor)| value * velocity_scale * factor)
                .collect();
            Ok((*redshift, row))
        })
        .collect::<FluxResult<Vec<_>>>()?;
    ComparisonTable::from_rows(rows)
}

/// `1 + a^2 + 2a <cos(2271 k)>` averaged over each bin's interval in
/// log-midpoints, with `a = amplitude / (1 - Fbar(z))`.
pub fn si_iii_correction(sdss_kbins: &[f64], redshift: f64, amplitude: f64) -> Vec<f64> {
    let count = sdss_kbins.len();
    if count == 0 {
        return Vec::new();
    }
    let a = amplitude / (1.0 - mean_flux(redshift));
    let mut mids = vec![0.0; count + 1];
    for index in 0..count - 1 {
        mids[index + 1] = ((sdss_kbins[index + 1].ln() + sdss_kbins[index].ln()) / 2.0).exp();
    }
    mids[count] = 2.0 * PI / SI_III_SEPARATION + mids[count - 1];

    let base = 1.0 + a * a;
    let mut correction = Vec::with_capacity(count);
    // the first interval would reach k = 0
    correction.push(base + 2.0 * a * (SI_III_SEPARATION * sdss_kbins[0]).cos());
    for index in 1..count {
        let (low, high) = (mids[index], mids[index + 1]);
        let mean_cos = ((SI_III_SEPARATION * high).sin() - (SI_III_SEPARATION * low).sin())
            / (high - low)
            / SI_III_SEPARATION;
        correction.push(base + 2.0 * a * mean_cos);
    }
    correction
}

/// `two / one` on the part of `one`'s grid that `two` also covers.
fn relative_power(
    source: &dyn PowerSpectrumSource,
    one: SimulationRun<'_>,
    two: SimulationRun<'_>,
    redshift: f64,
) -> FluxResult<(Vec<f64>, Vec<f64>)> {
    let first = source.load_run(one.name, redshift, one.box_size)?;
    let second = source.load_run(two.name, redshift, two.box_size)?;
    let common_k = overlap(&first, &second);
    if common_k.is_empty() {
        return Err(FluxError::range(
            "RANGE.OVERLAP",
            format!(
                "{} and {} share no wavenumbers at z={redshift}",
                one.name, two.name
            ),
        ));
    }
    debug!(redshift, bins = common_k.len(), "comparing runs");
    let numerator = rebin(&second.power, &second.k, &common_k)?;
    let denominator = rebin(&first.power, &first.k, &common_k)?;
    let relative = numerator
        .iter()
        .zip(denominator)
        .map(|(top, bottom)| top / bottom)
        .collect();
    Ok((common_k, relative))
}

fn overlap(first: &PowerSpectrum, second: &PowerSpectrum) -> Vec<f64> {
    let (Some(lower), Some(upper)) = (second.k.first(), second.k.last()) else {
        return Vec::new();
    };
    first
        .k
        .iter()
        .copied()
        .filter(|k| k <= upper && k >= lower)
        .collect()
}
