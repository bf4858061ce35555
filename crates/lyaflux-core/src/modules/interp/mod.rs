//! Fitted response tables and the interpolated power spectra they produce.

mod export;

pub use export::{format_significant, render_flat_table, save_flat_table};

use super::fitter::{fit_all_redshifts, DerivativeTable, ResponseCoefficients};
use super::knot::ParameterSet;
use super::source::{parse_numeric_table, read_numeric_table, PowerSpectrumSource};
use crate::domain::{FluxError, FluxResult, ParamValue, RedshiftOrder};
use crate::numerics::{locate_first, rebin, rebin_clamped};
use std::path::Path;
use tracing::{debug, info};

/// Derivatives of one parameter group.
///
/// `coefficients` and any per-redshift fiducial are aligned with the owning
/// interpolator's ascending redshifts.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDerivatives {
    pub fiducial: ParamValue,
    pub secondary_fiducial: Option<ParamValue>,
    pub coefficients: Vec<ResponseCoefficients>,
}

impl GroupDerivatives {
    pub fn has_secondary(&self) -> bool {
        self.coefficients
            .first()
            .is_some_and(ResponseCoefficients::has_secondary)
    }
}

/// Sum of per-group quadratic expansions around their fiducial runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxInterpolator {
    groups: Vec<GroupDerivatives>,
    redshifts: Vec<f64>,
    kbins: Vec<f64>,
}

impl FluxInterpolator {
    /// Fit every parameter set against `source` on the source's k-bins.
    ///
    /// Any failed load or fit aborts the whole build.
    pub fn build(source: &dyn PowerSpectrumSource, knots: &[ParameterSet]) -> FluxResult<Self> {
        if knots.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.INTERPOLATOR_GROUPS",
                "an interpolator needs at least one parameter set",
            ));
        }
        let kbins = source.kbins().to_vec();
        info!(
            kind = %source.kind(),
            groups = knots.len(),
            bins = kbins.len(),
            "building flux interpolator"
        );

        let mut redshifts = Vec::new();
        let mut groups = Vec::with_capacity(knots.len());
        for knot in knots {
            let table = fit_all_redshifts(source, knot, &kbins)?;
            let order = table.permutation(RedshiftOrder::Ascending);
            let table = table.sorted(RedshiftOrder::Ascending);
            groups.push(GroupDerivatives {
                fiducial: knot.fiducial().reordered(&order)?,
                secondary_fiducial: knot
                    .secondary()
                    .map(|secondary| secondary.fiducial.reordered(&order))
                    .transpose()?,
                coefficients: table.coefficients,
            });
            redshifts = table.redshifts;
        }
        Self::from_parts(groups, redshifts, kbins)
    }

    /// Assemble an interpolator from already fitted groups.
    ///
    /// `redshifts` must be ascending and every group must carry one
    /// coefficient record per redshift, each with one value per k-bin.
    pub fn from_parts(
        groups: Vec<GroupDerivatives>,
        redshifts: Vec<f64>,
        kbins: Vec<f64>,
    ) -> FluxResult<Self> {
        if groups.is_empty() {
            return Err(FluxError::data_shape(
                "SHAPE.INTERPOLATOR_GROUPS",
                "an interpolator needs at least one parameter group",
            ));
        }
        if !redshifts.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(FluxError::data_shape(
                "SHAPE.INTERPOLATOR_REDSHIFTS",
                format!("interpolator redshifts must be ascending, got {redshifts:?}"),
            ));
        }
        for (index, group) in groups.iter().enumerate() {
            if group.coefficients.len() != redshifts.len() {
                return Err(FluxError::data_shape(
                    "SHAPE.INTERPOLATOR_REDSHIFTS",
                    format!(
                        "group {index} has {} redshift columns, expected {}",
                        group.coefficients.len(),
                        redshifts.len()
                    ),
                ));
            }
            if let Some(column) = group
                .coefficients
                .iter()
                .find(|column| column.bin_count() != kbins.len())
            {
                return Err(FluxError::data_shape(
                    "SHAPE.INTERPOLATOR_KBINS",
                    format!(
                        "group {index} has {} k-bins, expected {}",
                        column.bin_count(),
                        kbins.len()
                    ),
                ));
            }
        }
        Ok(Self {
            groups,
            redshifts,
            kbins,
        })
    }

    /// Single-group interpolator from a flat text table.
    ///
    /// Rows are `a` then `b` (then `c`, `d`) blocks over `kbins`; columns follow
    /// the ascending `redshifts`.
    pub fn from_flat_table(
        text: &str,
        label: &Path,
        kbins: Vec<f64>,
        redshifts: Vec<f64>,
        fiducial: ParamValue,
    ) -> FluxResult<Self> {
        let rows = parse_numeric_table(text, label, redshifts.len())?;
        Self::from_flat_rows(&rows, label, kbins, redshifts, fiducial)
    }

    pub fn load_flat_table(
        path: &Path,
        kbins: Vec<f64>,
        redshifts: Vec<f64>,
        fiducial: ParamValue,
    ) -> FluxResult<Self> {
        let rows = read_numeric_table(path, redshifts.len())?;
        Self::from_flat_rows(&rows, path, kbins, redshifts, fiducial)
    }

    fn from_flat_rows(
        rows: &[Vec<f64>],
        label: &Path,
        kbins: Vec<f64>,
        redshifts: Vec<f64>,
        fiducial: ParamValue,
    ) -> FluxResult<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != redshifts.len())
        {
            return Err(FluxError::data_shape(
                "SHAPE.DERIVATIVE_TABLE",
                format!(
                    "'{}' row {} has {} columns, expected one per redshift ({})",
                    label.display(),
                    index + 1,
                    row.len(),
                    redshifts.len()
                ),
            ));
        }
        let coefficients = (0..redshifts.len())
            .map(|column| {
                let flat: Vec<f64> = rows.iter().map(|row| row[column]).collect();
                ResponseCoefficients::from_flat(&flat, kbins.len())
            })
            .collect::<FluxResult<Vec<_>>>()?;
        debug!(path = %label.display(), redshifts = redshifts.len(), "loaded flat derivative table");

        let group = GroupDerivatives {
            fiducial,
            secondary_fiducial: None,
            coefficients,
        };
        Self::from_parts(vec![group], redshifts, kbins)
    }

    pub fn groups(&self) -> &[GroupDerivatives] {
        &self.groups
    }

    /// Redshift axis, ascending.
    pub fn redshifts(&self) -> &[f64] {
        &self.redshifts
    }

    pub fn kbins(&self) -> &[f64] {
        &self.kbins
    }

    pub fn redshift_index(&self, redshift: f64) -> FluxResult<usize> {
        locate_first(&self.redshifts, redshift).ok_or_else(|| {
            FluxError::not_found(
                "LOOKUP.REDSHIFT",
                format!("no derivatives tabulated at redshift {redshift}"),
            )
        })
    }

    fn group(&self, index: usize) -> FluxResult<&GroupDerivatives> {
        self.groups.get(index).ok_or_else(|| {
            FluxError::not_found(
                "LOOKUP.GROUP",
                format!(
                    "parameter group {index} does not exist, {} configured",
                    self.groups.len()
                ),
            )
        })
    }

    /// Response of one group at `redshift`. Per-redshift values are resolved
    /// on the ascending redshift axis.
    pub fn query_single_group(
        &self,
        group_index: usize,
        redshift: f64,
        param: &ParamValue,
        secondary: Option<&ParamValue>,
    ) -> FluxResult<Vec<f64>> {
        let group = self.group(group_index)?;
        let index = self.redshift_index(redshift)?;
        let dp = param.resolve(index)? - group.fiducial.resolve(index)?;

        let coefficients = &group.coefficients[index];
        let dq = if coefficients.has_secondary() {
            let (Some(value), Some(centre)) = (secondary, &group.secondary_fiducial) else {
                return Err(FluxError::arity(
                    "QUERY.SECONDARY",
                    format!(
                        "parameter group {group_index} varies a secondary parameter; \
                         a secondary value and fiducial are required"
                    ),
                ));
            };
            Some(value.resolve(index)? - centre.resolve(index)?)
        } else {
            None
        };
        Ok(coefficients.evaluate(dp, dq))
    }

    /// Summed response of every group, pairing `params[i]` with group `i`.
    pub fn query(
        &self,
        params: &[ParamValue],
        redshift: f64,
        secondary: Option<&[ParamValue]>,
    ) -> FluxResult<Vec<f64>> {
        if params.len() != self.groups.len() {
            return Err(FluxError::arity(
                "QUERY.ARITY",
                format!(
                    "{} parameter values given for {} groups",
                    params.len(),
                    self.groups.len()
                ),
            ));
        }
        if let Some(secondary) = secondary
            && secondary.len() != self.groups.len()
        {
            return Err(FluxError::arity(
                "QUERY.ARITY",
                format!(
                    "{} secondary values given for {} groups",
                    secondary.len(),
                    self.groups.len()
                ),
            ));
        }

        let mut curve = vec![0.0; self.kbins.len()];
        for (group_index, param) in params.iter().enumerate() {
            let partial = self.query_single_group(
                group_index,
                redshift,
                param,
                secondary.map(|values| &values[group_index]),
            )?;
            for (total, value) in curve.iter_mut().zip(partial) {
                *total += value;
            }
        }
        Ok(curve)
    }

    /// One group's coefficients as a table over the ascending redshifts.
    pub fn group_table(&self, group_index: usize) -> FluxResult<DerivativeTable> {
        Ok(DerivativeTable {
            redshifts: self.redshifts.clone(),
            coefficients: self.group(group_index)?.coefficients.clone(),
        })
    }

    /// Copy with one group re-expanded about `fiducial + shift`.
    ///
    /// The quadratic slots are unchanged and the linear slots become
    /// `b + 2 a shift` (and `d + 2 c secondary_shift`).
    pub fn recentered(
        &self,
        group_index: usize,
        shift: &ParamValue,
        secondary_shift: Option<&ParamValue>,
    ) -> FluxResult<Self> {
        let group = self.group(group_index)?;
        let coefficients = group
            .coefficients
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let secondary = secondary_shift
                    .map(|value| value.resolve(index))
                    .transpose()?
                    .unwrap_or(0.0);
                Ok(column.recentered(shift.resolve(index)?, secondary))
            })
            .collect::<FluxResult<Vec<_>>>()?;

        let fiducial = shift_param(&group.fiducial, shift, self.redshifts.len())?;
        let secondary_fiducial = match (&group.secondary_fiducial, secondary_shift) {
            (Some(centre), Some(delta)) => Some(shift_param(centre, delta, self.redshifts.len())?),
            (centre, _) => centre.clone(),
        };

        let mut moved = self.clone();
        moved.groups[group_index] = GroupDerivatives {
            fiducial,
            secondary_fiducial,
            coefficients,
        };
        Ok(moved)
    }

    /// One group's coefficients rebinned onto the SDSS k-bins of every
    /// redshift at or above `min_redshift`.
    pub fn sdss_tables(
        &self,
        group_index: usize,
        source: &dyn PowerSpectrumSource,
        min_redshift: f64,
    ) -> FluxResult<DerivativeTable> {
        let group = self.group(group_index)?;
        let mut table = DerivativeTable {
            redshifts: Vec::new(),
            coefficients: Vec::new(),
        };
        for (redshift, column) in self.redshifts.iter().zip(&group.coefficients) {
            if *redshift < min_redshift {
                continue;
            }
            let sdss = source.sdss_kbins(*redshift);
            let rebinned =
                column.try_map_slots(|slot| Ok(rebin(slot, &self.kbins, &sdss)?))?;
            table.redshifts.push(*redshift);
            table.coefficients.push(rebinned);
        }
        if table.is_empty() {
            return Err(FluxError::range(
                "RANGE.REDSHIFT",
                format!("no tabulated redshift at or above {min_redshift}"),
            ));
        }
        Ok(table)
    }

    /// Ratio of a held-out run to the interpolated prediction at `redshift`.
    ///
    /// The run's power relative to `fiducial_run` is rebinned onto the
    /// interpolator's k-bins (low bins clamped) and divided by
    /// `1 + query(params, redshift, secondary)`.
    #[allow(clippy::too_many_arguments)]
    pub fn interpolation_error(
        &self,
        source: &dyn PowerSpectrumSource,
        test_run: &str,
        fiducial_run: &str,
        box_size: f64,
        params: &[ParamValue],
        redshift: f64,
        secondary: Option<&[ParamValue]>,
    ) -> FluxResult<Vec<f64>> {
        let test = source.load_run(test_run, redshift, box_size)?;
        let fiducial = source.load_run(fiducial_run, redshift, box_size)?;
        let ratio = test.ratio_to(&fiducial)?;
        let measured = if source.rebins_ratios() {
            rebin_clamped(&ratio, &fiducial.k, &self.kbins)?.0
        } else {
            ratio
        };
        let predicted = self.query(params, redshift, secondary)?;
        if measured.len() != predicted.len() {
            return Err(FluxError::data_shape(
                "SHAPE.SPECTRUM_LENGTH",
                format!(
                    "{} measured bins against {} interpolated bins",
                    measured.len(),
                    predicted.len()
                ),
            ));
        }
        Ok(measured
            .iter()
            .zip(predicted)
            .map(|(value, response)| value / (1.0 + response))
            .collect())
    }
}

fn shift_param(centre: &ParamValue, shift: &ParamValue, redshifts: usize) -> FluxResult<ParamValue> {
    if !centre.is_per_redshift() && !shift.is_per_redshift() {
        return Ok(ParamValue::Scalar(centre.resolve(0)? + shift.resolve(0)?));
    }
    (0..redshifts)
        .map(|index| Ok(centre.resolve(index)? + shift.resolve(index)?))
        .collect::<FluxResult<Vec<_>>>()
        .map(ParamValue::PerRedshift)
}

#[cfg(test)]
mod tests {
    use super::{FluxInterpolator, GroupDerivatives};
    use crate::common::{SourceConfig, SourceKind};
    use crate::domain::{FluxErrorCategory, ParamValue};
    use crate::modules::fitter::ResponseCoefficients;
    use crate::modules::source::build_source;
    use std::path::Path;

    fn column(a: f64, b: f64, bins: usize) -> ResponseCoefficients {
        ResponseCoefficients {
            a: vec![a; bins],
            b: vec![b; bins],
            c: None,
            d: None,
        }
    }

    fn two_group_interpolator() -> FluxInterpolator {
        let amplitude = GroupDerivatives {
            fiducial: 0.94.into(),
            secondary_fiducial: None,
            coefficients: vec![column(0.1, 1.0, 3), column(0.2, 2.0, 3)],
        };
        let thermal = GroupDerivatives {
            fiducial: vec![1.5, 1.6].into(),
            secondary_fiducial: Some(20.0.into()),
            coefficients: vec![
                ResponseCoefficients {
                    c: Some(vec![0.01; 3]),
                    d: Some(vec![0.05; 3]),
                    ..column(-0.3, 0.4, 3)
                },
                ResponseCoefficients {
                    c: Some(vec![0.02; 3]),
                    d: Some(vec![0.06; 3]),
                    ..column(-0.5, 0.7, 3)
                },
            ],
        };
        FluxInterpolator::from_parts(
            vec![amplitude, thermal],
            vec![2.0, 2.2],
            vec![0.1, 0.2, 0.4],
        )
        .expect("interpolator should assemble")
    }

    #[test]
    fn single_group_uses_redshift_specific_fiducials() {
        let interp = two_group_interpolator();
        let curve = interp
            .query_single_group(1, 2.2, &vec![1.0, 1.8].into(), Some(&22.0.into()))
            .unwrap();
        let dp: f64 = 1.8 - 1.6;
        let expected = -0.5 * dp * dp + 0.7 * dp + 0.02 * 4.0 + 0.06 * 2.0;
        assert!(curve.iter().all(|value| (value - expected).abs() < 1e-12));
    }

    #[test]
    fn query_is_the_sum_of_group_responses() {
        let interp = two_group_interpolator();
        let params = [ParamValue::from(1.04), ParamValue::from(vec![1.4, 1.7])];
        let secondary = [ParamValue::from(0.0), ParamValue::from(19.0)];

        let total = interp.query(&params, 2.0, Some(&secondary[..])).unwrap();
        let first = interp.query_single_group(0, 2.0, &params[0], None).unwrap();
        let second = interp
            .query_single_group(1, 2.0, &params[1], Some(&secondary[1]))
            .unwrap();
        for ((sum, one), two) in total.iter().zip(first).zip(second) {
            assert!((sum - (one + two)).abs() < 1e-15);
        }
    }

    #[test]
    fn query_errors_name_the_problem() {
        let interp = two_group_interpolator();
        let error = interp
            .query_single_group(0, 3.0, &0.94.into(), None)
            .unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::NotFound);

        let error = interp.query(&[ParamValue::from(1.0)], 2.0, None).unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::Arity);

        let error = interp
            .query_single_group(1, 2.0, &vec![1.0, 1.0].into(), None)
            .unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::Arity);
    }

    #[test]
    fn assembling_without_groups_is_rejected() {
        let error = FluxInterpolator::from_parts(Vec::new(), vec![2.0, 2.2], vec![0.1, 0.2])
            .expect_err("no groups to sum");
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
        assert!(error.message().contains("parameter group"));
    }

    #[test]
    fn recentring_shifts_linear_slot_and_fiducial() {
        let interp = two_group_interpolator();
        let moved = interp.recentered(0, &0.1.into(), None).unwrap();
        let group = &moved.groups()[0];
        assert!((group.coefficients[1].b[0] - (2.0 + 2.0 * 0.2 * 0.1)).abs() < 1e-15);
        assert_eq!(group.coefficients[1].a, vec![0.2; 3]);
        match &group.fiducial {
            ParamValue::Scalar(value) => assert!((value - 1.04).abs() < 1e-15),
            other => panic!("expected scalar fiducial, got {other}"),
        }
        assert_eq!(moved.groups()[1], interp.groups()[1]);
    }

    #[test]
    fn flat_table_import_reads_slot_major_rows() {
        let text = "0.1 0.2\n0.1 0.2\n1 2\n1 2\n";
        let interp = FluxInterpolator::from_flat_table(
            text,
            Path::new("table.txt"),
            vec![0.01, 0.02],
            vec![2.2, 2.4],
            ParamValue::from(0.94),
        )
        .unwrap();
        assert_eq!(interp.groups()[0].coefficients[1].a, vec![0.2, 0.2]);
        assert_eq!(interp.groups()[0].coefficients[0].b, vec![1.0, 1.0]);

        let error = FluxInterpolator::from_flat_table(
            "0.1 0.2\n1 2\n1 2\n",
            Path::new("table.txt"),
            vec![0.01, 0.02],
            vec![2.2, 2.4],
            ParamValue::from(0.94),
        )
        .unwrap_err();
        assert_eq!(error.category(), FluxErrorCategory::DataShape);
    }

    #[test]
    fn sdss_tables_rebin_each_slot() {
        let mut config = SourceConfig::defaults(SourceKind::FluxPower);
        config.kbins = Some(vec![0.01, 10.0]);
        let source = build_source(config, None).unwrap();

        let kbins = vec![0.05, 0.1, 0.5, 1.0, 5.0];
        let group = GroupDerivatives {
            fiducial: 1.0.into(),
            secondary_fiducial: None,
            coefficients: vec![column(0.5, -1.0, 5), column(0.25, 3.0, 5)],
        };
        let interp = FluxInterpolator::from_parts(vec![group], vec![2.0, 2.2], kbins).unwrap();
        let table = interp.sdss_tables(0, source.as_ref(), 2.2).unwrap();
        assert_eq!(table.redshifts, vec![2.2]);
        assert_eq!(table.coefficients[0].bin_count(), 12);
        assert!(table.coefficients[0].b.iter().all(|b| (b - 3.0).abs() < 1e-12));
    }
}
