// API handlers grouped by resource

pub mod artifacts;
pub mod common;
pub mod pipelines;
pub mod tasks;

pub use artifacts::*;
pub use pipelines::*;
pub use tasks::*;
