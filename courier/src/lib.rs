//! The courier daemon: configuration, wiring, and the run loop.

pub mod control_handler;
pub mod controller;

pub use controller::Courier;
