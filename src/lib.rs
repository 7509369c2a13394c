pub mod config;
pub mod controller;
pub mod mock;
pub mod port;
