//! Determine where water stands in the network, and how much of each pipe's
//! capacity is lost because of it.

pub mod cross_section;
pub mod results;
pub mod water_level;
