pub mod types;
pub mod patterns;
pub mod format;
pub mod parser;

pub use types::*;
pub use format::*;
pub use parser::*;
