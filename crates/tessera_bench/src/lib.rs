//! Benchmark support for Tessera.

pub mod utils;
