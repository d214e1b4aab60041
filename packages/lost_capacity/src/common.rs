//! Types and settings shared by every other module in the package

pub mod config;
pub mod error;
pub mod network_data;
