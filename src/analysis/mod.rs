//! Derived data: per-regime statistics, averaged curves and the
//! instrument-specific preprocessing that feeds them.

pub mod aggregate;
pub mod diffraction;
pub mod resample;
pub mod smoothing;
pub mod tensile;
