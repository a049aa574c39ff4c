pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod proposals;
pub mod server;
pub mod store;
pub mod types;
