use super::rebin::RebinError;

/// Interpolating cubic spline with not-a-knot end conditions.
///
/// Stored in Hermite form (knot values plus knot slopes). With fewer than four
/// knots the degree drops: three knots give the interpolating parabola, two a
/// straight line and one a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    slopes: Vec<f64>,
}

impl CubicSpline {
    pub fn new(knots: &[f64], values: &[f64]) -> Result<Self, RebinError> {
        validate_knots(knots, values)?;

        let slopes = match knots.len() {
            1 => vec![0.0],
            2 => {
                let slope = (values[1] - values[0]) / (knots[1] - knots[0]);
                vec![slope, slope]
            }
            3 => parabola_slopes(knots, values),
            _ => not_a_knot_slopes(knots, values),
        };

        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            slopes,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Evaluate at `x`. Points outside the knot range use the end polynomial.
    pub fn evaluate(&self, x: f64) -> f64 {
        let count = self.knots.len();
        if count == 1 {
            return self.values[0];
        }

        let upper = self.knots.partition_point(|knot| *knot <= x);
        let lower = upper.saturating_sub(1).min(count - 2);

        let h = self.knots[lower + 1] - self.knots[lower];
        let t = x - self.knots[lower];
        let secant = (self.values[lower + 1] - self.values[lower]) / h;
        let s0 = self.slopes[lower];
        let s1 = self.slopes[lower + 1];
        let c2 = (3.0 * secant - 2.0 * s0 - s1) / h;
        let c3 = (s0 + s1 - 2.0 * secant) / (h * h);

        self.values[lower] + t * (s0 + t * (c2 + t * c3))
    }

    pub fn evaluate_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|x| self.evaluate(*x)).collect()
    }
}

fn validate_knots(knots: &[f64], values: &[f64]) -> Result<(), RebinError> {
    if knots.is_empty() {
        return Err(RebinError::Empty);
    }
    if knots.len() != values.len() {
        return Err(RebinError::LengthMismatch {
            grid: knots.len(),
            values: values.len(),
        });
    }
    for (index, pair) in knots.windows(2).enumerate() {
        if !(pair[1] > pair[0]) {
            return Err(RebinError::NonIncreasing {
                index: index + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(())
}

fn parabola_slopes(knots: &[f64], values: &[f64]) -> Vec<f64> {
    let h0 = knots[1] - knots[0];
    let h1 = knots[2] - knots[1];
    let d0 = (values[1] - values[0]) / h0;
    let d1 = (values[2] - values[1]) / h1;
    let curvature = (d1 - d0) / (knots[2] - knots[0]);

    vec![
        d0 - curvature * h0,
        d0 + curvature * h0,
        d0 + curvature * (h0 + 2.0 * h1),
    ]
}

fn not_a_knot_slopes(knots: &[f64], values: &[f64]) -> Vec<f64> {
    let n = knots.len();
    let h: Vec<f64> = knots.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let secant: Vec<f64> = (0..n - 1)
        .map(|index| (values[index + 1] - values[index]) / h[index])
        .collect();

    let mut sub = vec![0.0; n];
    let mut diag = vec![0.0; n];
    let mut sup = vec![0.0; n];
    let mut rhs = vec![0.0; n];

    let span = knots[2] - knots[0];
    diag[0] = h[1];
    sup[0] = span;
    rhs[0] = ((h[0] + 2.0 * span) * h[1] * secant[0] + h[0] * h[0] * secant[1]) / span;

    for row in 1..n - 1 {
        sub[row] = h[row];
        diag[row] = 2.0 * (h[row - 1] + h[row]);
        sup[row] = h[row - 1];
        rhs[row] = 3.0 * (h[row] * secant[row - 1] + h[row - 1] * secant[row]);
    }

    let span = knots[n - 1] - knots[n - 3];
    sub[n - 1] = span;
    diag[n - 1] = h[n - 3];
    rhs[n - 1] = (h[n - 2] * h[n - 2] * secant[n - 3]
        + (2.0 * span + h[n - 2]) * h[n - 3] * secant[n - 2])
        / span;

    solve_tridiagonal(&sub, &diag, &sup, &rhs)
}

fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut upper = vec![0.0; n];
    let mut forward = vec![0.0; n];

    upper[0] = sup[0] / diag[0];
    forward[0] = rhs[0] / diag[0];
    for row in 1..n {
        let pivot = diag[row] - sub[row] * upper[row - 1];
        upper[row] = sup[row] / pivot;
        forward[row] = (rhs[row] - sub[row] * forward[row - 1]) / pivot;
    }

    let mut solution = vec![0.0; n];
    solution[n - 1] = forward[n - 1];
    for row in (0..n - 1).rev() {
        solution[row] = forward[row] - upper[row] * solution[row + 1];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::CubicSpline;
    use crate::numerics::RebinError;

    #[test]
    fn reproduces_cubic_polynomials_exactly() {
        let knots = [0.0, 0.4, 1.1, 1.5, 2.3, 3.0];
        let cubic = |x: f64| 2.0 - x + 0.5 * x * x - 0.25 * x * x * x;
        let values: Vec<f64> = knots.iter().map(|x| cubic(*x)).collect();
        let spline = CubicSpline::new(&knots, &values).expect("spline should build");

        for x in [0.1, 0.7, 1.3, 2.0, 2.9] {
            assert!(
                (spline.evaluate(x) - cubic(x)).abs() < 1e-12,
                "x={x}: got {} expected {}",
                spline.evaluate(x),
                cubic(x)
            );
        }
    }

    #[test]
    fn passes_through_every_knot() {
        let knots = [1.0, 2.0, 3.5, 4.0, 6.0, 7.5, 9.0];
        let values = [0.3, -1.2, 0.8, 2.5, 2.4, -0.1, 1.0];
        let spline = CubicSpline::new(&knots, &values).expect("spline should build");
        for (x, y) in knots.iter().zip(values) {
            assert!((spline.evaluate(*x) - y).abs() < 1e-12);
        }
    }

    #[test]
    fn short_inputs_fall_back_to_lower_degree() {
        let constant = CubicSpline::new(&[2.0], &[5.0]).unwrap();
        assert_eq!(constant.evaluate(10.0), 5.0);

        let line = CubicSpline::new(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert!((line.evaluate(0.5) - 2.0).abs() < 1e-14);

        let parabola = CubicSpline::new(&[0.0, 1.0, 3.0], &[0.0, 1.0, 9.0]).unwrap();
        assert!((parabola.evaluate(2.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_unsorted_knots() {
        let error = CubicSpline::new(&[0.0, 1.0, 1.0], &[0.0, 1.0, 2.0])
            .expect_err("duplicate knot should fail");
        assert!(matches!(error, RebinError::NonIncreasing { index: 2, .. }));
    }
}
