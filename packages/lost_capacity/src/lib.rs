pub mod analysis;
pub mod batch;
pub mod common;
pub mod flooding;
pub mod loading;
