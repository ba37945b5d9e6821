pub mod accumulator;
pub mod cli;
pub mod config;
pub mod descriptors;
pub mod generation;
pub mod pipeline;

pub use config::YarasmithConfig;
pub use pipeline::{ModelPipeline, Pipeline};
