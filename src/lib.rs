pub mod api;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod global;
pub mod session;
pub mod transport;
