//! Report output: tables, JSON and the progress spinner.

pub mod json;
pub mod progress;
pub mod table;
