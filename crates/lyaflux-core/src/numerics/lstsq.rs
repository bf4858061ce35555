use faer::Mat;

const ORTHOGONALITY_EPSILON: f64 = 1.0e-15;
const MAX_JACOBI_SWEEPS: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeastSquaresError {
    #[error("least-squares system must be non-empty, got {rows}x{cols}")]
    EmptySystem { rows: usize, cols: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
    #[error("design matrix entry ({row}, {col}) is not finite: {value}")]
    NonFiniteDesign { row: usize, col: usize, value: f64 },
    #[error("right-hand side entry {index} is not finite: {value}")]
    NonFiniteRhs { index: usize, value: f64 },
    #[error("Jacobi SVD did not converge after {sweeps} sweeps")]
    NoConvergence { sweeps: usize },
}

/// Minimum-norm least-squares solution and what the solver knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresSolution {
    pub coefficients: Vec<f64>,
    pub residual_sum_of_squares: f64,
    pub rank: usize,
    /// Singular values of the design matrix, descending.
    pub singular_values: Vec<f64>,
}

/// Solve `min ||design * x - rhs||_2` through a one-sided Jacobi SVD.
///
/// Singular values below `eps * max(rows, cols) * sigma_max` are treated as
/// zero, which yields the minimum-norm solution for rank-deficient or
/// underdetermined systems.
pub fn solve_least_squares(
    design: &Mat<f64>,
    rhs: &[f64],
) -> Result<LeastSquaresSolution, LeastSquaresError> {
    let rows = design.nrows();
    let cols = design.ncols();
    validate_system(design, rhs)?;

    let mut work = design.clone();
    let mut basis = Mat::<f64>::identity(cols, cols);
    orthogonalize_columns(&mut work, &mut basis)?;

    let column_norms: Vec<f64> = (0..cols)
        .map(|col| column_dot(&work, col, col).sqrt())
        .collect();
    let sigma_max = column_norms.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = f64::EPSILON * rows.max(cols) as f64 * sigma_max;

    let mut coefficients = vec![0.0; cols];
    let mut rank = 0;
    for (col, sigma) in column_norms.iter().copied().enumerate() {
        if sigma <= cutoff || sigma == 0.0 {
            continue;
        }
        rank += 1;
        let projection: f64 = (0..rows).map(|row| work[(row, col)] * rhs[row]).sum();
        let weight = projection / (sigma * sigma);
        for (index, coefficient) in coefficients.iter_mut().enumerate() {
            *coefficient += weight * basis[(index, col)];
        }
    }

    let residual_sum_of_squares = (0..rows)
        .map(|row| {
            let fitted: f64 = (0..cols)
                .map(|col| design[(row, col)] * coefficients[col])
                .sum();
            let residual = fitted - rhs[row];
            residual * residual
        })
        .sum();

    let mut singular_values = column_norms;
    singular_values.sort_by(|lhs, rhs| rhs.total_cmp(lhs));

    Ok(LeastSquaresSolution {
        coefficients,
        residual_sum_of_squares,
        rank,
        singular_values,
    })
}

fn validate_system(design: &Mat<f64>, rhs: &[f64]) -> Result<(), LeastSquaresError> {
    let rows = design.nrows();
    let cols = design.ncols();
    if rows == 0 || cols == 0 {
        return Err(LeastSquaresError::EmptySystem { rows, cols });
    }
    if rhs.len() != rows {
        return Err(LeastSquaresError::RhsLengthMismatch {
            expected: rows,
            actual: rhs.len(),
        });
    }
    for row in 0..rows {
        for col in 0..cols {
            let value = design[(row, col)];
            if !value.is_finite() {
                return Err(LeastSquaresError::NonFiniteDesign { row, col, value });
            }
        }
    }
    if let Some((index, value)) = rhs
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(LeastSquaresError::NonFiniteRhs { index, value });
    }
    Ok(())
}

fn orthogonalize_columns(
    work: &mut Mat<f64>,
    basis: &mut Mat<f64>,
) -> Result<(), LeastSquaresError> {
    let cols = work.ncols();
    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut rotated = false;
        for p in 0..cols {
            for q in (p + 1)..cols {
                let alpha = column_dot(work, p, p);
                let beta = column_dot(work, q, q);
                let gamma = column_dot(work, p, q);
                if gamma.abs() <= ORTHOGONALITY_EPSILON * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let sign = if zeta >= 0.0 { 1.0 } else { -1.0 };
                let tangent = sign / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let cosine = 1.0 / (1.0 + tangent * tangent).sqrt();
                let sine = cosine * tangent;
                rotate_columns(work, p, q, cosine, sine);
                rotate_columns(basis, p, q, cosine, sine);
            }
        }
        if !rotated {
            return Ok(());
        }
    }
    Err(LeastSquaresError::NoConvergence {
        sweeps: MAX_JACOBI_SWEEPS,
    })
}

fn column_dot(matrix: &Mat<f64>, lhs: usize, rhs: usize) -> f64 {
    (0..matrix.nrows())
        .map(|row| matrix[(row, lhs)] * matrix[(row, rhs)])
        .sum()
}

fn rotate_columns(matrix: &mut Mat<f64>, p: usize, q: usize, cosine: f64, sine: f64) {
    for row in 0..matrix.nrows() {
        let left = matrix[(row, p)];
        let right = matrix[(row, q)];
        matrix[(row, p)] = cosine * left - sine * right;
        matrix[(row, q)] = sine * left + cosine * right;
    }
}
