pub mod compare;
pub mod fitter;
pub mod interp;
pub mod knot;
pub mod source;

pub use compare::{
    compare_two, correction_table, difference_table, flat_power_table, si_iii_correction,
    ComparisonTable, SimulationRun,
};
pub use fitter::{
    coefficient_matrix, fit_all_redshifts, fit_blended_redshift, fit_redshift, fit_single_bin,
    pdf_tables, BinFit, DerivativeTable, ResponseCoefficients,
};
pub use interp::{FluxInterpolator, GroupDerivatives};
pub use knot::{ParameterOffsets, ParameterSet, SecondaryParameter};
pub use source::{
    build_source, FluxPdfSource, FluxPowerSource, MatterPowerSource, PowerSpectrum,
    PowerSpectrumSource,
};
