pub mod deploy;
pub mod dispatch;
pub mod fleet_service;
pub mod monitor;
pub mod process;
pub mod stats;
pub mod types;
pub mod vpn;
