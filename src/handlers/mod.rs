// Handler modules
pub mod list;
pub mod set;
pub mod utils;

// Re-export all handler functions
pub use list::handle_list;
pub use set::{SetOptions, handle_set};
