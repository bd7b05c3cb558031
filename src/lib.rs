pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod readers;
pub mod store;
pub mod utils;

pub use error::{PipelineError, Result};
