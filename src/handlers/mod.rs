pub mod config;
pub mod ingest;
pub mod logs;

pub use config::*;
pub use ingest::*;
pub use logs::*;
