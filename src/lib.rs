pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod remote;
pub mod server;
