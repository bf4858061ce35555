//! Quadratic response fits of Lyman-alpha flux power, matter power and flux
//! PDF outputs to simulation parameters, and the interpolator built on them.

pub mod common;
pub mod domain;
pub mod modules;
pub mod numerics;

pub use domain::{FluxError, FluxErrorCategory, FluxResult, ParamValue, RedshiftOrder};
