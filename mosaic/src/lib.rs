//! Command-line front end for the mosaic crates.

pub mod cli;
pub mod config;
pub mod eval;
pub mod regions;
pub mod serve;
pub mod sources;
pub mod train;
