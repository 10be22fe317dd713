//! CPU baselines the engine is compared against.

pub mod rayon_scan;
pub mod sequential;
