pub mod application;
pub mod entities;
pub mod error;
pub mod infrastructure;
pub mod search;

pub use application::*;
pub use entities::*;
pub use error::{Error, Result};
pub use infrastructure::*;
pub use search::*;
