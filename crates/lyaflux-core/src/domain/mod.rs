pub mod errors;

pub use errors::{FluxError, FluxErrorCategory, FluxResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A parameter value that is either constant or tracks the snapshot redshifts.
///
/// `PerRedshift` entries are aligned with the redshift list of whatever owns
/// the value: a source's configured (simulation) order for parameter sets,
/// ascending order inside a [`crate::modules::FluxInterpolator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    PerRedshift(Vec<f64>),
}

impl ParamValue {
    pub const fn is_per_redshift(&self) -> bool {
        matches!(self, Self::PerRedshift(_))
    }

    /// Value at the redshift with index `redshift_index`.
    pub fn resolve(&self, redshift_index: usize) -> FluxResult<f64> {
        match self {
            Self::Scalar(value) => Ok(*value),
            Self::PerRedshift(values) => values.get(redshift_index).copied().ok_or_else(|| {
                FluxError::data_shape(
                    "SHAPE.PARAM_REDSHIFT",
                    format!(
                        "per-redshift parameter has {} entries, redshift index {} requested",
                        values.len(),
                        redshift_index
                    ),
                )
            }),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::PerRedshift(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same value with its redshift axis permuted: entry `i` of the result is
    /// entry `order[i]` of `self`. Scalars are unchanged.
    pub fn reordered(&self, order: &[usize]) -> FluxResult<Self> {
        match self {
            Self::Scalar(value) => Ok(Self::Scalar(*value)),
            Self::PerRedshift(_) => order
                .iter()
                .map(|index| self.resolve(*index))
                .collect::<FluxResult<Vec<_>>>()
                .map(Self::PerRedshift),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        Self::PerRedshift(values)
    }
}

impl From<&[f64]> for ParamValue {
    fn from(values: &[f64]) -> Self {
        Self::PerRedshift(values.to_vec())
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::PerRedshift(values) => write!(f, "{values:?}"),
        }
    }
}

/// Column order for redshift axes in exported tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedshiftOrder {
    #[default]
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::{FluxErrorCategory, ParamValue};

    #[test]
    fn scalar_resolves_at_any_redshift() {
        let value = ParamValue::from(0.94);
        assert_eq!(value.resolve(0).unwrap(), 0.94);
        assert_eq!(value.resolve(11).unwrap(), 0.94);
    }

    #[test]
    fn per_redshift_resolution_is_bounds_checked() {
        let value = ParamValue::from(vec![1.5, 1.6]);
        assert_eq!(value.resolve(1).unwrap(), 1.6);
        let error = value.resolve(2).expect_err("index 2 is out of range");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }

    #[test]
    fn untagged_json_accepts_numbers_and_arrays() {
        let scalar: ParamValue = serde_json::from_str("0.93").unwrap();
        let series: ParamValue = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(scalar, ParamValue::Scalar(0.93));
        assert_eq!(
            series.reordered(&[1, 0]).unwrap(),
            ParamValue::PerRedshift(vec![2.0, 1.0])
        );
        assert!(series.reordered(&[2]).is_err());
    }
}
