//! Golden-file regression harness for the C++ Insights transformer.
//!
//! Each `*.cpp` test is transformed, compared with its `.expect` baseline and the
//! transformed text is compiled again to prove it is still valid C++.

pub mod baseline;
pub mod classify;
pub mod config;
pub mod diff;
pub mod directive;
pub mod discovery;
pub mod normalize;
pub mod report;
pub mod runner;
pub mod summary;
