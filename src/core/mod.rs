//! Numerical core: configuration, segmentation, constraint rows and the
//! direct, quadratic and conic formulations.

pub mod config;
pub mod constraints;
pub mod direct;
pub mod formulation;
pub mod method;
pub mod polynomial;
pub mod solver_interface;
pub mod splits;
