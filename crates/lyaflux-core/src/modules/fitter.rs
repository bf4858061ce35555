//! Per-bin quadratic response fits of power ratios against parameter offsets.

use super::knot::{ParameterOffsets, ParameterSet};
use super::source::{PowerSpectrum, PowerSpectrumSource};
use crate::domain::{FluxError, FluxResult, RedshiftOrder};
use crate::numerics::{locate_first, rebin_clamped, solve_least_squares, LeastSquaresSolution};
use faer::Mat;
use tracing::{debug, info, warn};

/// A quadratic and a linear term need at least this many runs.
pub const MIN_FIT_RUNS: usize = 2;

/// Runs needed before the secondary parameter enters the fit.
pub const MIN_SECONDARY_RUNS: usize = 3;

/// Fit of one k-bin: `response = a dp^2 + b dp (+ c dq^2 + d dq)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinFit {
    pub a: f64,
    pub b: f64,
    /// `(c, d)` when the secondary parameter was fitted.
    pub secondary: Option<(f64, f64)>,
    pub report: LeastSquaresSolution,
}

/// Least-squares fit of one bin's responses (ratios already shifted by -1).
pub fn fit_single_bin(
    responses: &[f64],
    param_offsets: &[f64],
    secondary_offsets: Option<&[f64]>,
) -> FluxResult<BinFit> {
    if param_offsets.len() != responses.len() {
        return Err(FluxError::arity(
            "FIT.ARITY",
            format!(
                "{} parameter values, but {} P_F values",
                param_offsets.len(),
                responses.len()
            ),
        ));
    }
    if param_offsets.len() < MIN_FIT_RUNS {
        return Err(FluxError::underdetermined(
            "FIT.TOO_FEW_RUNS",
            format!(
                "{} pvals given. Need at least {MIN_FIT_RUNS}.",
                param_offsets.len()
            ),
        ));
    }
    if let Some(secondary) = secondary_offsets
        && secondary.len() != param_offsets.len()
    {
        return Err(FluxError::arity(
            "FIT.ARITY",
            format!(
                "{} secondary parameter values, but {} P_F values",
                secondary.len(),
                responses.len()
            ),
        ));
    }

    let secondary = secondary_offsets.filter(|values| values.len() >= MIN_SECONDARY_RUNS);
    let columns = if secondary.is_some() { 4 } else { 2 };
    let design = Mat::from_fn(responses.len(), columns, |row, col| {
        let dp = param_offsets[row];
        match (col, secondary) {
            (0, _) => dp * dp,
            (1, _) => dp,
            (2, Some(dq)) => dq[row] * dq[row],
            (_, Some(dq)) => dq[row],
            (_, None) => 0.0,
        }
    });

    let report = solve_least_squares(&design, responses)?;
    let coefficients = &report.coefficients;
    Ok(BinFit {
        a: coefficients[0],
        b: coefficients[1],
        secondary: secondary.map(|_| (coefficients[2], coefficients[3])),
        report,
    })
}

/// Response coefficients of one parameter group at one redshift.
///
/// `c` and `d` are present only for groups with a secondary parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCoefficients {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub c: Option<Vec<f64>>,
    pub d: Option<Vec<f64>>,
}

impl ResponseCoefficients {
    pub fn zeros(bins: usize, secondary: bool) -> Self {
        Self {
            a: vec![0.0; bins],
            b: vec![0.0; bins],
            c: secondary.then(|| vec![0.0; bins]),
            d: secondary.then(|| vec![0.0; bins]),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.a.len()
    }

    pub fn has_secondary(&self) -> bool {
        self.c.is_some() && self.d.is_some()
    }

    pub fn slot_count(&self) -> usize {
        if self.has_secondary() { 4 } else { 2 }
    }

    /// Slots in table order: `a`, `b`, then `c`, `d` when present.
    pub fn slots(&self) -> Vec<&[f64]> {
        let mut slots = vec![self.a.as_slice(), self.b.as_slice()];
        if let (Some(c), Some(d)) = (&self.c, &self.d) {
            slots.push(c);
            slots.push(d);
        }
        slots
    }

    /// Flat vector of length `2 * bins` or `4 * bins`, slot-major.
    pub fn to_flat(&self) -> Vec<f64> {
        self.slots().concat()
    }

    pub fn from_flat(flat: &[f64], bins: usize) -> FluxResult<Self> {
        if bins == 0 || (flat.len() != 2 * bins && flat.len() != 4 * bins) {
            return Err(FluxError::data_shape(
                "SHAPE.DERIVATIVE_TABLE",
                format!(
                    "derivative column has {} rows, expected {} or {} for {bins} bins",
                    flat.len(),
                    2 * bins,
                    4 * bins
                ),
            ));
        }
        let mut chunks = flat.chunks(bins).map(<[f64]>::to_vec);
        let mut next = || chunks.next().unwrap_or_default();
        let a = next();
        let b = next();
        let secondary = flat.len() == 4 * bins;
        Ok(Self {
            a,
            b,
            c: secondary.then(&mut next),
            d: secondary.then(&mut next),
        })
    }

    /// `a dp^2 + b dp`, plus `c dq^2 + d dq` when both the slots and `dq` exist.
    pub fn evaluate(&self, dp: f64, dq: Option<f64>) -> Vec<f64> {
        let mut curve: Vec<f64> = self
            .a
            .iter()
            .zip(&self.b)
            .map(|(a, b)| a * dp * dp + b * dp)
            .collect();
        if let (Some(c), Some(d), Some(dq)) = (&self.c, &self.d, dq) {
            for ((value, c), d) in curve.iter_mut().zip(c).zip(d) {
                *value += c * dq * dq + d * dq;
            }
        }
        curve
    }

    /// Coefficients of the same quadratic expanded about `p0 + shift`.
    pub fn recentered(&self, shift: f64, secondary_shift: f64) -> Self {
        let shifted = |quadratic: &[f64], linear: &[f64], dv: f64| -> Vec<f64> {
            quadratic
                .iter()
                .zip(linear)
                .map(|(a, b)| b + 2.0 * a * dv)
                .collect()
        };
        Self {
            a: self.a.clone(),
            b: shifted(&self.a, &self.b, shift),
            c: self.c.clone(),
            d: match (&self.c, &self.d) {
                (Some(c), Some(d)) => Some(shifted(c, d, secondary_shift)),
                _ => self.d.clone(),
            },
        }
    }

    /// Apply `map` to every slot, keeping the slot layout.
    pub fn try_map_slots(
        &self,
        mut map: impl FnMut(&[f64]) -> FluxResult<Vec<f64>>,
    ) -> FluxResult<Self> {
        Ok(Self {
            a: map(&self.a)?,
            b: map(&self.b)?,
            c: self.c.as_deref().map(&mut map).transpose()?,
            d: self.d.as_deref().map(&mut map).transpose()?,
        })
    }
}

/// Coefficient columns of one parameter group, each paired with its redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeTable {
    pub redshifts: Vec<f64>,
    pub coefficients: Vec<ResponseCoefficients>,
}

impl DerivativeTable {
    pub fn len(&self) -> usize {
        self.redshifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redshifts.is_empty()
    }

    /// Indices that put the redshift axis in `order`.
    pub fn permutation(&self, order: RedshiftOrder) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by(|left, right| {
            let ascending = self.redshifts[*left].total_cmp(&self.redshifts[*right]);
            match order {
                RedshiftOrder::Ascending => ascending,
                RedshiftOrder::Descending => ascending.reverse(),
            }
        });
        indices
    }

    pub fn sorted(&self, order: RedshiftOrder) -> Self {
        let indices = self.permutation(order);
        Self {
            redshifts: indices.iter().map(|index| self.redshifts[*index]).collect(),
            coefficients: indices
                .iter()
                .map(|index| self.coefficients[*index].clone())
                .collect(),
        }
    }

    /// `[slots * bins, redshifts]` matrix, one flat column per redshift.
    pub fn to_matrix(&self) -> FluxResult<Mat<f64>> {
        coefficient_matrix(&self.coefficients)
    }
}

pub fn coefficient_matrix(columns: &[ResponseCoefficients]) -> FluxResult<Mat<f64>> {
    let flat: Vec<Vec<f64>> = columns.iter().map(ResponseCoefficients::to_flat).collect();
    let rows = flat.first().map_or(0, Vec::len);
    if let Some((index, column)) = flat.iter().enumerate().find(|(_, column)| column.len() != rows) {
        return Err(FluxError::data_shape(
            "SHAPE.DERIVATIVE_TABLE",
            format!(
                "redshift column {index} has {} rows, expected {rows}",
                column.len()
            ),
        ));
    }
    Ok(Mat::from_fn(rows, flat.len(), |row, col| flat[col][row]))
}

/// Fit every target bin of `knot` at one configured redshift.
pub fn fit_redshift(
    source: &dyn PowerSpectrumSource,
    knot: &ParameterSet,
    redshift: f64,
    target_kbins: &[f64],
) -> FluxResult<ResponseCoefficients> {
    let redshift_index = source.redshift_index(redshift)?;
    let offsets = knot.offsets_at(redshift_index)?;
    let fiducial = source.load_run(knot.fiducial_run(), redshift, knot.fiducial_box())?;
    let runs = knot
        .names()
        .iter()
        .map(|name| source.load_run(name, redshift, knot.fiducial_box()))
        .collect::<FluxResult<Vec<_>>>()?;

    debug!(redshift, runs = runs.len(), "fitting redshift");
    let ratios = ratios_on_grid(source, &fiducial, &runs, target_kbins, redshift)?;
    fit_ratio_table(&ratios, &offsets, target_kbins.len())
}

/// Fit `knot` at every redshift configured on `source`.
pub fn fit_all_redshifts(
    source: &dyn PowerSpectrumSource,
    knot: &ParameterSet,
    target_kbins: &[f64],
) -> FluxResult<DerivativeTable> {
    info!(
        fiducial = knot.fiducial_run(),
        runs = knot.len(),
        redshifts = source.redshifts().len(),
        bins = target_kbins.len(),
        "fitting parameter set"
    );
    let coefficients = source
        .redshifts()
        .iter()
        .map(|redshift| fit_redshift(source, knot, *redshift, target_kbins))
        .collect::<FluxResult<Vec<_>>>()?;
    Ok(DerivativeTable {
        redshifts: source.redshifts().to_vec(),
        coefficients,
    })
}

/// Fit at a redshift between snapshots by blending the two bracketing
/// snapshots linearly in redshift before taking ratios.
pub fn fit_blended_redshift(
    source: &dyn PowerSpectrumSource,
    knot: &ParameterSet,
    redshift: f64,
    target_kbins: &[f64],
) -> FluxResult<ResponseCoefficients> {
    let blend = Blend::bracketing(source.redshifts(), redshift)?;
    let box_size = knot.fiducial_box();
    let load_blended = |run: &str| -> FluxResult<PowerSpectrum> {
        let lower = source.load_run(run, source.redshifts()[blend.lower], box_size)?;
        let upper = source.load_run(run, source.redshifts()[blend.upper], box_size)?;
        blend.mix_spectra(&lower, &upper)
    };

    let fiducial = load_blended(knot.fiducial_run())?;
    let runs = knot
        .names()
        .iter()
        .map(|name| load_blended(name))
        .collect::<FluxResult<Vec<_>>>()?;
    let offsets = blend.mix_offsets(&knot.offsets_at(blend.lower)?, &knot.offsets_at(blend.upper)?);

    debug!(redshift, lower = blend.lower, upper = blend.upper, "fitting blended redshift");
    let ratios = ratios_on_grid(source, &fiducial, &runs, target_kbins, redshift)?;
    fit_ratio_table(&ratios, &offsets, target_kbins.len())
}

/// Blended fits on the source's own bins, one flat column per redshift.
///
/// Columns use the same slot order as [`coefficient_matrix`]: every
/// quadratic coefficient first, then every linear one.
pub fn pdf_tables(
    source: &dyn PowerSpectrumSource,
    knot: &ParameterSet,
    redshifts: &[f64],
) -> FluxResult<Mat<f64>> {
    info!(fiducial = knot.fiducial_run(), redshifts = redshifts.len(), "building blended tables");
    let columns = redshifts
        .iter()
        .map(|redshift| fit_blended_redshift(source, knot, *redshift, source.kbins()))
        .collect::<FluxResult<Vec<_>>>()?;
    coefficient_matrix(&columns)
}

/// Ratio of each run to the fiducial, expressed on `target_kbins`.
fn ratios_on_grid(
    source: &dyn PowerSpectrumSource,
    fiducial: &PowerSpectrum,
    runs: &[PowerSpectrum],
    target_kbins: &[f64],
    redshift: f64,
) -> FluxResult<Vec<Vec<f64>>> {
    runs.iter()
        .map(|run| {
            let ratio = run.ratio_to(fiducial)?;
            if !source.rebins_ratios() {
                if ratio.len() != target_kbins.len() {
                    return Err(FluxError::data_shape(
                        "SHAPE.SPECTRUM_LENGTH",
                        format!(
                            "{} bins loaded but {} target bins requested",
                            ratio.len(),
                            target_kbins.len()
                        ),
                    ));
                }
                return Ok(ratio);
            }
            let (rebinned, clamped) = rebin_clamped(&ratio, &fiducial.k, target_kbins)?;
            if clamped > 0 {
                warn!(
                    redshift,
                    clamped,
                    lowest_source_k = fiducial.k[0],
                    "target bins below the simulated range take the first in-range value"
                );
            }
            Ok(rebinned)
        })
        .collect()
}

/// Fit every column of a `runs x bins` ratio table.
fn fit_ratio_table(
    ratios: &[Vec<f64>],
    offsets: &ParameterOffsets,
    bins: usize,
) -> FluxResult<ResponseCoefficients> {
    let mut coefficients = ResponseCoefficients::zeros(bins, offsets.secondary.is_some());
    for bin in 0..bins {
        let responses: Vec<f64> = ratios.iter().map(|ratio| ratio[bin] - 1.0).collect();
        let fit = fit_single_bin(&responses, &offsets.primary, offsets.secondary.as_deref())?;
        coefficients.a[bin] = fit.a;
        coefficients.b[bin] = fit.b;
        if let (Some((c, d)), Some(c_slot), Some(d_slot)) =
            (fit.secondary, coefficients.c.as_mut(), coefficients.d.as_mut())
        {
            c_slot[bin] = c;
            d_slot[bin] = d;
        }
    }
    Ok(coefficients)
}

/// Linear weights of the two configured redshifts around a target redshift.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Blend {
    lower: usize,
    upper: usize,
    lower_weight: f64,
    upper_weight: f64,
}

impl Blend {
    fn bracketing(redshifts: &[f64], redshift: f64) -> FluxResult<Self> {
        if let Some(index) = locate_first(redshifts, redshift) {
            return Ok(Self {
                lower: index,
                upper: index,
                lower_weight: 1.0,
                upper_weight: 0.0,
            });
        }
        let below = nearest(redshifts, |candidate| candidate < redshift, f64::max);
        let above = nearest(redshifts, |candidate| candidate > redshift, f64::min);
        let (Some(lower), Some(upper)) = (below, above) else {
            return Err(FluxError::range(
                "RANGE.REDSHIFT",
                format!("redshift {redshift} is outside the snapshot table"),
            ));
        };
        let span = redshifts[upper] - redshifts[lower];
        Ok(Self {
            lower,
            upper,
            lower_weight: (redshifts[upper] - redshift) / span,
            upper_weight: (redshift - redshifts[lower]) / span,
        })
    }

    fn mix(&self, lower: f64, upper: f64) -> f64 {
        self.lower_weight * lower + self.upper_weight * upper
    }

    fn mix_spectra(&self, lower: &PowerSpectrum, upper: &PowerSpectrum) -> FluxResult<PowerSpectrum> {
        if lower.len() != upper.len() {
            return Err(FluxError::data_shape(
                "SHAPE.SPECTRUM_LENGTH",
                format!(
                    "cannot blend snapshots with {} and {} rows",
                    lower.len(),
                    upper.len()
                ),
            ));
        }
        let power = lower
            .power
            .iter()
            .zip(&upper.power)
            .map(|(low, high)| self.mix(*low, *high))
            .collect();
        Ok(PowerSpectrum::new(lower.k.clone(), power))
    }

    fn mix_offsets(&self, lower: &ParameterOffsets, upper: &ParameterOffsets) -> ParameterOffsets {
        let mix_all = |low: &[f64], high: &[f64]| -> Vec<f64> {
            low.iter().zip(high).map(|(l, h)| self.mix(*l, *h)).collect()
        };
        ParameterOffsets {
            primary: mix_all(&lower.primary, &upper.primary),
            secondary: match (&lower.secondary, &upper.secondary) {
                (Some(low), Some(high)) => Some(mix_all(low, high)),
                _ => None,
            },
        }
    }
}

fn nearest(
    redshifts: &[f64],
    keep: impl Fn(f64) -> bool,
    pick: fn(f64, f64) -> f64,
) -> Option<usize> {
    let best = redshifts
        .iter()
        .copied()
        .filter(|candidate| keep(*candidate))
        .reduce(pick)?;
    redshifts.iter().position(|candidate| *candidate == best)
}
