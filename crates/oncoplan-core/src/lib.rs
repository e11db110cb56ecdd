//! Configuration, case tables, prompts, and the oncology case pipelines.

pub mod analysis;
pub mod bootstrap;
pub mod cases;
pub mod config;
pub mod pacing;
pub mod pipeline;
pub mod prompts;
pub mod vault;
