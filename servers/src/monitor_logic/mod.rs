pub mod config;
pub mod signals;
pub mod status;
