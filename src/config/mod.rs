//! Configuration schema and JSON file persistence

mod schema;
mod store;

pub use schema::{ChunkerConfig, DrainConfig, OutputConfig, VideoConfig};
pub use store::{load_config, save_config};
