pub mod lease;
pub mod runner;
