pub mod block_cache;
pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fs;
pub mod live;
pub mod load;
pub mod tx;
pub mod writer;

pub use config::{Cli, Config};
pub use engine::Engine;
