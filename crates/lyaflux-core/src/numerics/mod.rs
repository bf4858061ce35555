pub mod lstsq;
pub mod rebin;
pub mod spline;

pub use lstsq::{solve_least_squares, LeastSquaresError, LeastSquaresSolution};
pub use rebin::{
    locate_equal, locate_first, rebin, rebin_clamped, smooth, smooth_rebin, RebinError,
    WindowKind, DEFAULT_KAISER_BETA, DEFAULT_SMOOTHING_WINDOW, LOCATE_EPSILON,
};
pub use spline::CubicSpline;

use crate::domain::FluxError;

impl From<RebinError> for FluxError {
    fn from(error: RebinError) -> Self {
        match error {
            RebinError::OutOfRange { .. } => FluxError::range("RANGE.REBIN", error.to_string()),
            RebinError::WindowTooLarge { .. } => {
                FluxError::data_shape("SHAPE.SMOOTH_WINDOW", error.to_string())
            }
            RebinError::Empty
            | RebinError::LengthMismatch { .. }
            | RebinError::NonIncreasing { .. }
            | RebinError::NonPositive { .. } => {
                FluxError::data_shape("SHAPE.REBIN_GRID", error.to_string())
            }
        }
    }
}

impl From<LeastSquaresError> for FluxError {
    fn from(error: LeastSquaresError) -> Self {
        match error {
            LeastSquaresError::EmptySystem { .. } => {
                FluxError::underdetermined("FIT.EMPTY_SYSTEM", error.to_string())
            }
            LeastSquaresError::RhsLengthMismatch { .. } => {
                FluxError::arity("FIT.RHS_LENGTH", error.to_string())
            }
            LeastSquaresError::NonFiniteDesign { .. }
            | LeastSquaresError::NonFiniteRhs { .. }
            | LeastSquaresError::NoConvergence { .. } => {
                FluxError::data_shape("FIT.SOLVER", error.to_string())
            }
        }
    }
}
