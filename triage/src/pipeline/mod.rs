//! Pipeline driving: the per-task stage loop.

mod driver;

#[cfg(test)]
mod integration_tests;

pub use driver::PipelineDriver;
