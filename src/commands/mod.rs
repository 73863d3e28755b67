pub mod config;
pub mod scanner;

pub use config::*;
pub use scanner::*;
