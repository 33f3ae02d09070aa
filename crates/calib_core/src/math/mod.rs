//! Numerical building blocks.
//!
//! - [`diff`]: Finite-difference step policies and gradients of black-box
//!   evaluations
//!
//! Optimisers and calibration algorithms live in the `calib_optimiser` crate
//! and consume these gradients through the cost functions they assemble.

pub mod diff;
