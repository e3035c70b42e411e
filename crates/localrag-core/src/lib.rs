#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod markdown;
pub mod office;
pub mod parser;
pub mod tokens;
pub mod traits;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
pub use types::{Chunk, Citation, IndexEntry, SearchHit};
