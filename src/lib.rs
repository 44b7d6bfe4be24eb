pub mod anticheat;
pub mod api;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod session;
