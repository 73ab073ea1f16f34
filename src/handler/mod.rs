//! Request handler module
//!
//! Dispatch of incoming requests to API handlers and static directories.

pub mod backend;
pub mod router;
pub mod static_files;
pub mod upstream;

pub use router::{handle_request, Dispatcher};
