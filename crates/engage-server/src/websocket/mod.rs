//! WebSocket notification feed

pub mod handler;

pub use handler::ws_handler;
