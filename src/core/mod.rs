// Core modules: artifact cache, model contract, prompt/embedding/mask types, pipeline.
pub mod artifact;
pub mod embedding;
pub mod error;
pub mod image_io;
pub mod mask;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod transport;
