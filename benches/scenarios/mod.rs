//! Real-world scenario benchmarks.
//!
//! Complete patches rendered through the engine, and the cost of
//! recompiling after a topology edit.

mod engine;

pub use engine::{bench_compile, bench_engine};
