use super::spline::CubicSpline;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tolerance used when matching redshifts and parameter values.
pub const LOCATE_EPSILON: f64 = 1.0e-7;

/// Smoothing length applied before rebinning noisy ratios. Windows of 9-13
/// samples keep the curve shape; 7 still leaves visible noise.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 11;

/// Kaiser shape parameter used by [`smooth_rebin`].
pub const DEFAULT_KAISER_BETA: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RebinError {
    #[error("rebin requires a non-empty source grid")]
    Empty,
    #[error("rebin input length mismatch: grid={grid}, values={values}")]
    LengthMismatch { grid: usize, values: usize },
    #[error("source grid must be strictly increasing, index {index} has {current} after {previous}")]
    NonIncreasing {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("log-space rebin needs positive wavenumbers, index {index} got {value}")]
    NonPositive { index: usize, value: f64 },
    #[error("target wavenumber {value} is beyond the interpolation range [{lower}, {upper}]")]
    OutOfRange { value: f64, lower: f64, upper: f64 },
    #[error("input vector of length {len} is smaller than the smoothing window {window}")]
    WindowTooLarge { window: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Flat,
    Hanning,
    Hamming,
    Bartlett,
    Blackman,
    Kaiser { beta: f64 },
}

impl WindowKind {
    /// Window weights of length `len`, not normalised.
    pub fn weights(self, len: usize) -> Vec<f64> {
        if len == 1 {
            return vec![1.0];
        }
        let span = (len - 1) as f64;
        (0..len)
            .map(|index| {
                let n = index as f64;
                match self {
                    Self::Flat => 1.0,
                    Self::Hanning => 0.5 - 0.5 * (2.0 * PI * n / span).cos(),
                    Self::Hamming => 0.54 - 0.46 * (2.0 * PI * n / span).cos(),
                    Self::Bartlett => (2.0 / span) * (span / 2.0 - (n - span / 2.0).abs()),
                    Self::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * n / span).cos()
                            + 0.08 * (4.0 * PI * n / span).cos()
                    }
                    Self::Kaiser { beta } => {
                        let ratio = 2.0 * n / span - 1.0;
                        bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / bessel_i0(beta)
                    }
                }
            })
            .collect()
    }
}

/// Resample `values` from `source_k` onto `target_k` with a spline in `ln k`.
///
/// Every target wavenumber must lie inside `[source_k[0], source_k[last]]`.
pub fn rebin(values: &[f64], source_k: &[f64], target_k: &[f64]) -> Result<Vec<f64>, RebinError> {
    if source_k.is_empty() {
        return Err(RebinError::Empty);
    }
    if source_k.len() != values.len() {
        return Err(RebinError::LengthMismatch {
            grid: source_k.len(),
            values: values.len(),
        });
    }

    let lower = source_k[0];
    let upper = source_k[source_k.len() - 1];
    if let Some(value) = target_k
        .iter()
        .copied()
        .find(|value| !(*value >= lower && *value <= upper))
    {
        return Err(RebinError::OutOfRange {
            value,
            lower,
            upper,
        });
    }

    let log_source = log_grid(source_k)?;
    let spline = CubicSpline::new(&log_source, values)?;
    Ok(target_k.iter().map(|k| spline.evaluate(k.ln())).collect())
}

/// [`rebin`] that clamps target bins below `source_k[0]` to the first
/// in-range rebinned value instead of extrapolating.
///
/// Returns the rebinned values and the number of clamped bins. Targets above
/// the source range are still an error.
pub fn rebin_clamped(
    values: &[f64],
    source_k: &[f64],
    target_k: &[f64],
) -> Result<(Vec<f64>, usize), RebinError> {
    let lower = *source_k.first().ok_or(RebinError::Empty)?;
    let first = target_k.partition_point(|k| *k < lower);
    if first == target_k.len() {
        return Err(RebinError::OutOfRange {
            value: target_k.last().copied().unwrap_or(f64::NAN),
            lower,
            upper: source_k[source_k.len() - 1],
        });
    }

    let in_range = rebin(values, source_k, &target_k[first..])?;
    let mut clamped = vec![in_range[0]; first];
    clamped.extend(in_range);
    Ok((clamped, first))
}

/// Moving-window smoothing with mirrored ends.
///
/// The signal is reflected over `window_len - 1` samples at both ends and
/// convolved with the normalised window; the centred part of the valid
/// convolution is returned so the output keeps the input length.
pub fn smooth(values: &[f64], window_len: usize, window: WindowKind) -> Result<Vec<f64>, RebinError> {
    if values.len() < window_len {
        return Err(RebinError::WindowTooLarge {
            window: window_len,
            len: values.len(),
        });
    }
    if window_len < 3 {
        return Ok(values.to_vec());
    }

    let len = values.len();
    let mut padded = Vec::with_capacity(len + 2 * (window_len - 1));
    padded.extend((1..window_len).rev().map(|index| values[index]));
    padded.extend_from_slice(values);
    padded.extend((2..=window_len).map(|offset| values[len - offset]));

    let weights = window.weights(window_len);
    let total: f64 = weights.iter().sum();
    let kernel: Vec<f64> = weights.iter().map(|weight| weight / total).collect();

    let centre = (window_len - 1) / 2;
    let smoothed = (centre..centre + len)
        .map(|start| {
            kernel
                .iter()
                .enumerate()
                .map(|(tap, weight)| weight * padded[start + window_len - 1 - tap])
                .sum()
        })
        .collect();
    Ok(smoothed)
}

/// Kaiser-smooth `values` and, when `target_k` is non-empty, rebin onto it.
pub fn smooth_rebin(
    values: &[f64],
    source_k: &[f64],
    target_k: &[f64],
    window_len: usize,
) -> Result<Vec<f64>, RebinError> {
    let smoothed = smooth(
        values,
        window_len,
        WindowKind::Kaiser {
            beta: DEFAULT_KAISER_BETA,
        },
    )?;
    if target_k.is_empty() {
        return Ok(smoothed);
    }
    rebin(&smoothed, source_k, target_k)
}

/// Indices `i` with `|array[i] - value| < eps`, ascending.
pub fn locate_equal(array: &[f64], value: f64, eps: f64) -> Vec<usize> {
    array
        .iter()
        .enumerate()
        .filter(|(_, candidate)| **candidate > value - eps && **candidate < value + eps)
        .map(|(index, _)| index)
        .collect()
}

/// First index matching `value` within [`LOCATE_EPSILON`].
pub fn locate_first(array: &[f64], value: f64) -> Option<usize> {
    locate_equal(array, value, LOCATE_EPSILON).first().copied()
}

fn log_grid(grid: &[f64]) -> Result<Vec<f64>, RebinError> {
    grid.iter()
        .copied()
        .enumerate()
        .map(|(index, value)| {
            if value > 0.0 {
                Ok(value.ln())
            } else {
                Err(RebinError::NonPositive { index, value })
            }
        })
        .collect()
}

fn bessel_i0(x: f64) -> f64 {
    let quarter_square = 0.25 * x * x;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut order = 1.0;
    while term > 1.0e-17 * sum {
        term *= quarter_square / (order * order);
        sum += term;
        order += 1.0;
    }
    sum
}
