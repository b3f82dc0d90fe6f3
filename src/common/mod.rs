mod config;
mod error;
pub mod logger;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;
