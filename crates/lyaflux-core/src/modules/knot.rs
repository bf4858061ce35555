//! Families of simulation runs varying one or two parameters around a fiducial run.

use crate::common::KnotConfig;
use crate::domain::{FluxError, FluxResult, ParamValue};
use crate::numerics::locate_first;

/// Second independently varied parameter of a [`ParameterSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryParameter {
    pub values: Vec<ParamValue>,
    pub fiducial: ParamValue,
}

/// Parameter offsets of every run at one redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterOffsets {
    pub primary: Vec<f64>,
    pub secondary: Option<Vec<f64>>,
}

/// Immutable description of a knot: runs, their parameter values, and the
/// fiducial run they are compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    names: Vec<String>,
    values: Vec<ParamValue>,
    fiducial: ParamValue,
    secondary: Option<SecondaryParameter>,
    fiducial_run: String,
    fiducial_box: f64,
}

impl ParameterSet {
    pub fn new(
        names: Vec<String>,
        values: Vec<ParamValue>,
        fiducial: impl Into<ParamValue>,
        fiducial_run: impl Into<String>,
        fiducial_box: f64,
    ) -> FluxResult<Self> {
        let set = Self {
            names,
            values,
            fiducial: fiducial.into(),
            secondary: None,
            fiducial_run: fiducial_run.into(),
            fiducial_box,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn with_secondary(
        mut self,
        values: Vec<ParamValue>,
        fiducial: impl Into<ParamValue>,
    ) -> FluxResult<Self> {
        self.secondary = Some(SecondaryParameter {
            values,
            fiducial: fiducial.into(),
        });
        self.validate()?;
        Ok(self)
    }

    pub fn from_config(config: &KnotConfig) -> FluxResult<Self> {
        let set = Self::new(
            config.names.clone(),
            config.values.clone(),
            config.fiducial.clone(),
            config.fiducial_run.clone(),
            config.fiducial_box,
        )?;
        match (&config.secondary_values, &config.secondary_fiducial) {
            (None, None) => Ok(set),
            (Some(values), Some(fiducial)) => set.with_secondary(values.clone(), fiducial.clone()),
            _ => Err(FluxError::data_shape(
                "SHAPE.KNOT_SECONDARY",
                format!(
                    "knot with fiducial run {} needs both secondary values and a secondary fiducial",
                    config.fiducial_run
                ),
            )),
        }
    }

    fn validate(&self) -> FluxResult<()> {
        if self.names.len() != self.values.len() {
            return Err(FluxError::data_shape(
                "SHAPE.KNOT_VALUES",
                format!(
                    "{} pvals given, but {} sims.",
                    self.values.len(),
                    self.names.len()
                ),
            ));
        }
        if self.names.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.KNOT_VALUES",
                "a parameter set needs at least one run",
            ));
        }
        if !(self.fiducial_box > 0.0) {
            return Err(FluxError::data_shape(
                "SHAPE.BOX_SIZE",
                format!(
                    "fiducial box size must be positive, got {}",
                    self.fiducial_box
                ),
            ));
        }
        check_shapes("primary", &self.values, &self.fiducial)?;

        if let Some(secondary) = &self.secondary {
            if secondary.values.len() != self.names.len() {
                return Err(FluxError::data_shape(
                    "SHAPE.KNOT_SECONDARY",
                    format!(
                        "{} secondary values given, but {} sims.",
                        secondary.values.len(),
                        self.names.len()
                    ),
                ));
            }
            check_shapes("secondary", &secondary.values, &secondary.fiducial)?;
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn fiducial(&self) -> &ParamValue {
        &self.fiducial
    }

    pub fn secondary(&self) -> Option<&SecondaryParameter> {
        self.secondary.as_ref()
    }

    pub fn fiducial_run(&self) -> &str {
        &self.fiducial_run
    }

    pub fn fiducial_box(&self) -> f64 {
        self.fiducial_box
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn param_for_run(&self, name: &str) -> FluxResult<&ParamValue> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| &self.values[index])
            .ok_or_else(|| FluxError::not_found("LOOKUP.KNOT_RUN", format!("{name} does not exist!")))
    }

    /// Run whose parameter equals `value` at `redshift_index`.
    pub fn run_for_param(&self, value: f64, redshift_index: usize) -> FluxResult<&str> {
        let resolved = self
            .values
            .iter()
            .map(|param| param.resolve(redshift_index))
            .collect::<FluxResult<Vec<_>>>()?;
        locate_first(&resolved, value)
            .map(|index| self.names[index].as_str())
            .ok_or_else(|| {
                FluxError::not_found("LOOKUP.KNOT_PARAM", format!("No snapshot with p={value}"))
            })
    }

    /// `value - fiducial` for every run at `redshift_index`.
    pub fn offsets_at(&self, redshift_index: usize) -> FluxResult<ParameterOffsets> {
        let primary = offsets(&self.values, &self.fiducial, redshift_index)?;
        let secondary = self
            .secondary
            .as_ref()
            .map(|secondary| offsets(&secondary.values, &secondary.fiducial, redshift_index))
            .transpose()?;
        Ok(ParameterOffsets { primary, secondary })
    }
}

fn offsets(values: &[ParamValue], fiducial: &ParamValue, redshift_index: usize) -> FluxResult<Vec<f64>> {
    let centre = fiducial.resolve(redshift_index)?;
    values
        .iter()
        .map(|value| Ok(value.resolve(redshift_index)? - centre))
        .collect()
}

fn check_shapes(label: &str, values: &[ParamValue], fiducial: &ParamValue) -> FluxResult<()> {
    let expected = fiducial.is_per_redshift().then(|| fiducial.len());
    for (index, value) in values.iter().enumerate() {
        let actual = value.is_per_redshift().then(|| value.len());
        if actual != expected {
            return Err(FluxError::data_shape(
                "SHAPE.KNOT_REDSHIFT",
                format!(
                    "{label} value {index} is {value} but the fiducial is {fiducial}; \
                     both must be scalars or per-redshift series of equal length"
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ParameterSet;
    use crate::common::KnotConfig;
    use crate::domain::{FluxErrorCategory, ParamValue};

    fn amplitude_knot() -> ParameterSet {
        ParameterSet::new(
            vec!["A0.84/".into(), "A1.04/".into(), "A1.14/".into()],
            vec![0.84.into(), 1.04.into(), 1.14.into()],
            0.94,
            "best-fit/",
            60.0,
        )
        .expect("knot should build")
    }

    #[test]
    fn run_count_must_match_value_count() {
        let error = ParameterSet::new(
            vec!["A0.84/".into(), "A1.04/".into()],
            vec![0.84.into()],
            0.94,
            "best-fit/",
            60.0,
        )
        .expect_err("counts differ");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
        assert_eq!(error.message(), "1 pvals given, but 2 sims.");
    }

    #[test]
    fn lookups_work_in_both_directions() {
        let knot = amplitude_knot();
        assert_eq!(knot.param_for_run("A1.04/").unwrap(), &ParamValue::Scalar(1.04));
        assert_eq!(knot.run_for_param(1.14 + 1e-9, 3).unwrap(), "A1.14/");

        let error = knot.param_for_run("A9.99/").unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::NotFound);
        assert!(error.message().contains("A9.99/"));
        assert_eq!(
            knot.run_for_param(0.5, 0).unwrap_err().category(),
            FluxErrorCategory::NotFound
        );
    }

    #[test]
    fn offsets_resolve_per_redshift_values() {
        let knot = ParameterSet::new(
            vec!["G1/".into(), "G2/".into()],
            vec![vec![1.0, 2.0].into(), vec![3.0, 5.0].into()],
            vec![2.0, 3.0],
            "bf2/",
            60.0,
        )
        .unwrap()
        .with_secondary(vec![10.0.into(), 30.0.into()], 20.0)
        .unwrap();

        let offsets = knot.offsets_at(1).unwrap();
        assert_eq!(offsets.primary, vec![-1.0, 2.0]);
        assert_eq!(offsets.secondary, Some(vec![-10.0, 10.0]));
        assert_eq!(
            knot.offsets_at(2).unwrap_err().category(),
            FluxErrorCategory::DataShape
        );
    }

    #[test]
    fn mixed_scalar_and_series_values_are_rejected() {
        let error = ParameterSet::new(
            vec!["G1/".into(), "G2/".into()],
            vec![1.0.into(), vec![3.0, 5.0].into()],
            vec![2.0, 3.0],
            "bf2/",
            60.0,
        )
        .expect_err("first value is scalar");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }

    #[test]
    fn config_with_half_a_secondary_parameter_is_rejected() {
        let config = KnotConfig {
            names: vec!["G1/".into(), "G2/".into()],
            values: vec![1.0.into(), 2.0.into()],
            fiducial: 1.5.into(),
            secondary_values: Some(vec![1.0.into(), 2.0.into()]),
            secondary_fiducial: None,
            fiducial_run: "bf2/".into(),
            fiducial_box: 60.0,
        };
        let error = ParameterSet::from_config(&config).expect_err("fiducial missing");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }
}
