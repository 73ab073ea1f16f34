// Server module entry point
// Listener setup, connection handling, accept loop and signals

pub mod connection;
pub mod listener;
pub mod serve;
pub mod signal;

pub use listener::create_reusable_listener;
pub use signal::start_signal_handler;
