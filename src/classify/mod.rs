pub mod engine;
pub mod labels;

pub use engine::*;
pub use labels::*;
