pub mod health;
pub mod register;
pub mod search;

pub use health::{health_handler, ready_handler};
pub use register::register_handler;
pub use search::search_handler;
