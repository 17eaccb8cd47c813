pub mod history;
pub mod matcher;
pub mod query;
pub mod session;
pub mod state;

pub use history::*;
pub use matcher::*;
pub use query::*;
pub use session::*;
pub use state::*;
