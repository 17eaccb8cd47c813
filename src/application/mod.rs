pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

pub use app::*;
pub use cli::*;
pub use config::*;
pub use logging::*;
